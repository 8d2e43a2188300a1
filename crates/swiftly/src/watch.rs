// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Watch-mode plumbing.
//!
//! Two things keep incremental rebuilds honest about virtual files:
//!
//! - When a virtual file is rewritten during a watch session, any file watcher
//!   registered for its path receives a synthetic change event and the owning
//!   directory watcher forgets its cached time info.
//! - Before each incremental pass, [`sync_timestamps`] copies every virtual
//!   file's modification time into the bundler's file timestamp table, so
//!   invalidation treats rewritten virtual files as changed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use globset::GlobSet;
use tokio::sync::mpsc;

use crate::compiler::BundlerVersion;
use crate::store::VirtualFileStore;

/// Maximum number of watch wrapper layers unwrapped.
const MAX_WATCH_LAYERS: usize = 16;

/// An entry of the bundler's file timestamp table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileTimestamp {
    /// Bare modification time in milliseconds (legacy bundlers).
    Plain(u64),
    /// Safe time plus raw timestamp, both in milliseconds.
    Safe {
        /// Time after which the entry is known to be stable.
        safe_time: u64,
        /// Raw modification time.
        timestamp: u64,
    },
}

impl FileTimestamp {
    /// Raw modification time in milliseconds.
    pub fn millis(&self) -> u64 {
        match self {
            FileTimestamp::Plain(ms) => *ms,
            FileTimestamp::Safe { timestamp, .. } => *timestamp,
        }
    }
}

/// The bundler's file timestamp table.
pub type FileTimestamps = HashMap<PathBuf, FileTimestamp>;

/// Writes every virtual file's modification time into `timestamps`, in the
/// entry shape `version` expects.
pub fn sync_timestamps(
    store: &VirtualFileStore,
    version: BundlerVersion,
    timestamps: &mut FileTimestamps,
) {
    for file in store.snapshot() {
        let mtime = file.stats.mtime_ms();
        timestamps.insert(file.path, version.timestamp(mtime));
    }
}

/// A change reported by a file watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchChange {
    /// Changed file.
    pub path: PathBuf,
    /// New modification time in milliseconds.
    pub mtime_ms: u64,
    /// True if the change came from a virtual-module write.
    pub synthetic: bool,
}

/// Per-directory watcher state.
#[derive(Debug, Default)]
pub struct DirectoryWatcher {
    cached_time_info: Option<HashMap<PathBuf, u64>>,
}

impl DirectoryWatcher {
    /// Records a file's modification time in the cached time info.
    pub fn record(&mut self, path: &Path, mtime_ms: u64) {
        self.cached_time_info
            .get_or_insert_with(HashMap::new)
            .insert(path.to_path_buf(), mtime_ms);
    }

    /// Cached time info, if it has not been invalidated.
    pub fn cached_time_info(&self) -> Option<&HashMap<PathBuf, u64>> {
        self.cached_time_info.as_ref()
    }

    /// Forgets the cached time info.
    pub fn invalidate(&mut self) {
        self.cached_time_info = None;
    }
}

/// Watcher for one file path.
#[derive(Debug, Clone)]
pub struct FileWatcher {
    path: PathBuf,
    directory: Arc<Mutex<DirectoryWatcher>>,
    events: mpsc::UnboundedSender<WatchChange>,
}

impl FileWatcher {
    /// Creates a watcher delivering changes for `path` to `events`.
    pub fn new(
        path: impl Into<PathBuf>,
        directory: Arc<Mutex<DirectoryWatcher>>,
        events: mpsc::UnboundedSender<WatchChange>,
    ) -> Self {
        Self {
            path: path.into(),
            directory,
            events,
        }
    }

    /// Watched path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The directory watcher this file watcher belongs to.
    pub fn directory(&self) -> &Arc<Mutex<DirectoryWatcher>> {
        &self.directory
    }

    /// Invalidates the directory's time info and delivers a change.
    pub fn emit_change(&self, mtime_ms: u64, synthetic: bool) {
        self.directory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .invalidate();
        // The receiver is gone once the watch session ends.
        let _ = self.events.send(WatchChange {
            path: self.path.clone(),
            mtime_ms,
            synthetic,
        });
    }
}

/// Every active file watcher, keyed by path.
#[derive(Debug, Default)]
pub struct WatcherRegistry {
    file_watchers: HashMap<PathBuf, FileWatcher>,
}

impl WatcherRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a watcher, replacing any watcher for the same path.
    pub fn watch(&mut self, watcher: FileWatcher) {
        self.file_watchers.insert(watcher.path.clone(), watcher);
    }

    /// Removes the watcher for `path`.
    pub fn unwatch(&mut self, path: &Path) {
        self.file_watchers.remove(path);
    }

    /// The watcher for `path`, if any.
    pub fn get(&self, path: &Path) -> Option<&FileWatcher> {
        self.file_watchers.get(path)
    }

    /// Number of active watchers.
    pub fn len(&self) -> usize {
        self.file_watchers.len()
    }

    /// Returns true if nothing is watched.
    pub fn is_empty(&self) -> bool {
        self.file_watchers.is_empty()
    }
}

/// A layer of a bundler's watch filesystem.
pub trait WatchFileSystem: Send {
    /// Returns true if this layer wraps another one.
    fn is_wrapper(&self) -> bool {
        false
    }

    /// The wrapped layer, for wrappers.
    fn inner_mut(&mut self) -> Option<&mut dyn WatchFileSystem> {
        None
    }

    /// Active file watchers, for base layers.
    fn watchers_mut(&mut self) -> Option<&mut WatcherRegistry> {
        None
    }
}

/// Unwraps ignore wrappers and returns the base layer's watcher registry.
pub fn find_watchers(wfs: &mut dyn WatchFileSystem) -> Option<&mut WatcherRegistry> {
    fn descend(wfs: &mut dyn WatchFileSystem, depth: usize) -> Option<&mut WatcherRegistry> {
        if depth >= MAX_WATCH_LAYERS {
            return None;
        }
        if wfs.is_wrapper() {
            descend(wfs.inner_mut()?, depth + 1)
        } else {
            wfs.watchers_mut()
        }
    }
    descend(wfs, 0)
}

/// Base watch layer holding the registry.
#[derive(Debug, Default)]
pub struct RegistryWatchFileSystem {
    registry: WatcherRegistry,
}

impl RegistryWatchFileSystem {
    /// Creates a layer with no watchers.
    pub fn new() -> Self {
        Self::default()
    }
}

impl WatchFileSystem for RegistryWatchFileSystem {
    fn watchers_mut(&mut self) -> Option<&mut WatcherRegistry> {
        Some(&mut self.registry)
    }
}

/// Wrapper layer that refuses to watch paths matched by a glob set.
pub struct IgnoringWatchFileSystem {
    inner: Box<dyn WatchFileSystem>,
    ignored: GlobSet,
}

impl IgnoringWatchFileSystem {
    /// Wraps `inner`, ignoring paths matched by `ignored`.
    pub fn new(inner: Box<dyn WatchFileSystem>, ignored: GlobSet) -> Self {
        Self { inner, ignored }
    }

    /// Returns true if `path` is never watched.
    pub fn ignores(&self, path: &Path) -> bool {
        self.ignored.is_match(path)
    }
}

impl WatchFileSystem for IgnoringWatchFileSystem {
    fn is_wrapper(&self) -> bool {
        true
    }

    fn inner_mut(&mut self) -> Option<&mut dyn WatchFileSystem> {
        Some(self.inner.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::VirtualFile;
    use globset::GlobSetBuilder;

    #[test]
    fn test_sync_timestamps_shapes() {
        let store = VirtualFileStore::new();
        let file = VirtualFile::new("/app/routes.js", b"x".to_vec());
        let mtime = file.stats.mtime_ms();
        store.insert(file);

        let mut legacy = FileTimestamps::new();
        sync_timestamps(&store, BundlerVersion::Legacy, &mut legacy);
        assert_eq!(
            legacy.get(Path::new("/app/routes.js")),
            Some(&FileTimestamp::Plain(mtime))
        );

        let mut current = FileTimestamps::new();
        sync_timestamps(&store, BundlerVersion::Current, &mut current);
        assert_eq!(
            current.get(Path::new("/app/routes.js")),
            Some(&FileTimestamp::Safe {
                safe_time: mtime,
                timestamp: mtime
            })
        );
    }

    #[test]
    fn test_emit_change_invalidates_directory_info() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let directory = Arc::new(Mutex::new(DirectoryWatcher::default()));
        directory.lock().unwrap().record(Path::new("/app/a.js"), 1);

        let watcher = FileWatcher::new("/app/a.js", Arc::clone(&directory), tx);
        watcher.emit_change(42, true);

        assert!(directory.lock().unwrap().cached_time_info().is_none());
        let change = rx.try_recv().unwrap();
        assert_eq!(change.path, PathBuf::from("/app/a.js"));
        assert_eq!(change.mtime_ms, 42);
        assert!(change.synthetic);
    }

    #[test]
    fn test_find_watchers_unwraps_ignore_layers() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut base = RegistryWatchFileSystem::new();
        base.registry.watch(FileWatcher::new(
            "/app/a.js",
            Arc::new(Mutex::new(DirectoryWatcher::default())),
            tx,
        ));
        let mut wrapped = IgnoringWatchFileSystem::new(
            Box::new(base),
            GlobSetBuilder::new().build().unwrap(),
        );

        let registry = find_watchers(&mut wrapped).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get(Path::new("/app/a.js")).is_some());
    }
}
