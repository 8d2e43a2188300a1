// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Bundler input filesystem layers.
//!
//! A bundler reads sources through a stack of layers: wrappers that filter or
//! decorate requests, on top of a base layer that talks to the disk and caches
//! every stat, read and listing. Virtual files are injected straight into the
//! base layer's caches, so every layer above sees them as ordinary files.
//!
//! # Layers
//!
//! - [`CachedInputFileSystem`]: the base layer (disk + three caches)
//! - [`IgnoringFileSystem`]: a wrapper hiding paths matched by glob patterns
//!
//! Use [`find_base_layer`] to unwrap a stack down to its base.

use std::io;
use std::path::Path;
use std::sync::Arc;

use globset::GlobSet;

use crate::error::{Result, SwiftlyError};
use crate::propagate;
use crate::stats::FileStat;
use crate::storage::{Backend, CacheValue, FsStorage, StorageShape, StorageShim};
use crate::store::VirtualFileStore;

/// Maximum number of wrapper layers unwrapped before giving up.
pub const MAX_LAYER_DEPTH: usize = 16;

/// Cache key for a path.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Virtual-file capability installed on a base layer.
///
/// Holds a handle to the registry so the layer can restore every virtual file
/// after its caches are purged.
#[derive(Debug, Clone)]
pub struct Overlay {
    /// Registry of virtual files.
    pub store: VirtualFileStore,
    /// Shim for the layer's storage shape.
    pub shim: StorageShim,
}

/// Raw-write access to a base layer's caches.
pub struct RawAccess<'a> {
    /// The layer's caches.
    pub storage: FsStorage<'a>,
    /// Installed virtual-file capability, if any.
    pub overlay: &'a mut Option<Overlay>,
}

/// A layer of a bundler's input filesystem.
pub trait InputFileSystem: Send {
    /// Returns metadata for `path`.
    fn stat(&mut self, path: &Path) -> io::Result<FileStat>;

    /// Reads the whole file at `path`.
    fn read_file(&mut self, path: &Path) -> io::Result<Arc<[u8]>>;

    /// Lists the entry names of the directory at `path`.
    fn read_dir(&mut self, path: &Path) -> io::Result<Vec<String>>;

    /// Drops every cached result.
    fn purge(&mut self) -> Result<()>;

    /// Advances cache expiry by one level. Wrappers forward to the layer
    /// they wrap.
    fn tick(&mut self) -> Result<()> {
        match self.inner_mut() {
            Some(inner) => inner.tick(),
            None => Ok(()),
        }
    }

    /// Returns true if this layer wraps another one.
    fn is_wrapper(&self) -> bool {
        false
    }

    /// The wrapped layer, for wrappers.
    fn inner_mut(&mut self) -> Option<&mut dyn InputFileSystem> {
        None
    }

    /// Raw-write access to the layer's caches, for base layers that have them.
    fn raw_access(&mut self) -> Option<RawAccess<'_>> {
        None
    }
}

/// Unwraps wrapper layers until the base layer is reached.
///
/// Gives up with a configuration error after [`MAX_LAYER_DEPTH`] layers, or
/// when a wrapper does not expose the layer it wraps.
pub fn find_base_layer(fs: &mut dyn InputFileSystem) -> Result<&mut dyn InputFileSystem> {
    fn descend(fs: &mut dyn InputFileSystem, depth: usize) -> Result<&mut dyn InputFileSystem> {
        if depth >= MAX_LAYER_DEPTH {
            return Err(SwiftlyError::Configuration(format!(
                "no base filesystem layer found within {} wrapper layers",
                MAX_LAYER_DEPTH
            )));
        }
        if fs.is_wrapper() {
            match fs.inner_mut() {
                Some(inner) => descend(inner, depth + 1),
                None => Err(SwiftlyError::Configuration(
                    "filesystem wrapper does not expose its inner layer".to_string(),
                )),
            }
        } else {
            Ok(fs)
        }
    }
    descend(fs, 0)
}

/// Disk-backed base layer caching every stat, read and listing.
#[derive(Debug)]
pub struct CachedInputFileSystem {
    stat_backend: Backend,
    read_file_backend: Backend,
    read_dir_backend: Backend,
    overlay: Option<Overlay>,
}

impl CachedInputFileSystem {
    /// Creates a layer whose three caches use `shape`.
    pub fn new(shape: StorageShape) -> Self {
        Self {
            stat_backend: Backend::with_shape(shape),
            read_file_backend: Backend::with_shape(shape),
            read_dir_backend: Backend::with_shape(shape),
            overlay: None,
        }
    }

    /// The installed virtual-file capability, if any.
    pub fn overlay(&self) -> Option<&Overlay> {
        self.overlay.as_ref()
    }
}

impl InputFileSystem for CachedInputFileSystem {
    fn stat(&mut self, path: &Path) -> io::Result<FileStat> {
        let key = path_key(path);
        if let Some(CacheValue::Stat(stat)) = self.stat_backend.lookup(&key) {
            return Ok(stat.clone());
        }
        let stat = FileStat::from_metadata(&std::fs::metadata(path)?);
        self.stat_backend.store(&key, CacheValue::Stat(stat.clone()));
        Ok(stat)
    }

    fn read_file(&mut self, path: &Path) -> io::Result<Arc<[u8]>> {
        let key = path_key(path);
        if let Some(CacheValue::Content(content)) = self.read_file_backend.lookup(&key) {
            return Ok(Arc::clone(content));
        }
        let content: Arc<[u8]> = std::fs::read(path)?.into();
        self.read_file_backend
            .store(&key, CacheValue::Content(Arc::clone(&content)));
        Ok(content)
    }

    fn read_dir(&mut self, path: &Path) -> io::Result<Vec<String>> {
        let key = path_key(path);
        if let Some(CacheValue::Listing(names)) = self.read_dir_backend.lookup(&key) {
            return Ok(names.clone());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(path)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        self.read_dir_backend
            .store(&key, CacheValue::Listing(names.clone()));
        Ok(names)
    }

    fn purge(&mut self) -> Result<()> {
        self.stat_backend.purge();
        self.read_file_backend.purge();
        self.read_dir_backend.purge();

        if let Some(overlay) = self.overlay.clone() {
            let files = overlay.store.snapshot();
            tracing::debug!(count = files.len(), "restoring virtual files after purge");
            for file in &files {
                propagate::inject(self, &overlay.shim, file)?;
            }
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        self.stat_backend.tick();
        self.read_file_backend.tick();
        self.read_dir_backend.tick();

        let Some(overlay) = self.overlay.clone() else {
            return Ok(());
        };
        let files = overlay.store.snapshot();
        // A listing can survive while one further up expired, so every
        // ancestor listing is rebuilt before the files go back in.
        for file in &files {
            for dir in file.path.ancestors().skip(1) {
                self.read_dir_backend.remove(&path_key(dir));
            }
        }
        tracing::trace!(count = files.len(), "restoring virtual files after level rotation");
        for file in &files {
            propagate::inject(self, &overlay.shim, file)?;
        }
        Ok(())
    }

    fn raw_access(&mut self) -> Option<RawAccess<'_>> {
        Some(RawAccess {
            storage: FsStorage {
                stat: Some(&mut self.stat_backend),
                read_file: Some(&mut self.read_file_backend),
                read_dir: Some(&mut self.read_dir_backend),
            },
            overlay: &mut self.overlay,
        })
    }
}

/// Wrapper layer hiding every path matched by a glob set.
pub struct IgnoringFileSystem {
    inner: Box<dyn InputFileSystem>,
    ignored: GlobSet,
}

impl IgnoringFileSystem {
    /// Wraps `inner`, hiding paths matched by `ignored`.
    pub fn new(inner: Box<dyn InputFileSystem>, ignored: GlobSet) -> Self {
        Self { inner, ignored }
    }

    fn check(&self, path: &Path) -> io::Result<()> {
        if self.ignored.is_match(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is ignored", path.display()),
            ));
        }
        Ok(())
    }
}

impl InputFileSystem for IgnoringFileSystem {
    fn stat(&mut self, path: &Path) -> io::Result<FileStat> {
        self.check(path)?;
        self.inner.stat(path)
    }

    fn read_file(&mut self, path: &Path) -> io::Result<Arc<[u8]>> {
        self.check(path)?;
        self.inner.read_file(path)
    }

    fn read_dir(&mut self, path: &Path) -> io::Result<Vec<String>> {
        self.check(path)?;
        let names = self.inner.read_dir(path)?;
        Ok(names
            .into_iter()
            .filter(|name| !self.ignored.is_match(path.join(name)))
            .collect())
    }

    fn purge(&mut self) -> Result<()> {
        self.inner.purge()
    }

    fn is_wrapper(&self) -> bool {
        true
    }

    fn inner_mut(&mut self) -> Option<&mut dyn InputFileSystem> {
        Some(self.inner.as_mut())
    }
}
