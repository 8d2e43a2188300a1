// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Registry of every virtual file injected into a pipeline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::stats::FileStat;

/// A synthetic file that exists only in the bundler's caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFile {
    /// Absolute path.
    pub path: PathBuf,
    /// File contents.
    pub content: Arc<[u8]>,
    /// Synthetic metadata.
    pub stats: FileStat,
}

impl VirtualFile {
    /// Creates a virtual file with fresh synthetic stats.
    pub fn new(path: impl Into<PathBuf>, content: impl Into<Arc<[u8]>>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            stats: FileStat::virtual_file(content.len() as u64),
            content,
        }
    }
}

/// In-memory table of virtual files keyed by absolute path.
///
/// Cloning yields another handle to the same table. The pipeline owns the
/// store for its whole lifetime; the cached filesystem holds a handle so it
/// can restore virtual files after a purge.
#[derive(Debug, Clone, Default)]
pub struct VirtualFileStore {
    files: Arc<Mutex<BTreeMap<PathBuf, VirtualFile>>>,
}

impl VirtualFileStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> MutexGuard<'_, BTreeMap<PathBuf, VirtualFile>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a file, replacing any earlier version at the same path.
    ///
    /// Returns the replaced version.
    pub fn insert(&self, file: VirtualFile) -> Option<VirtualFile> {
        self.files().insert(file.path.clone(), file)
    }

    /// Looks up a file by absolute path.
    pub fn get(&self, path: &Path) -> Option<VirtualFile> {
        self.files().get(path).cloned()
    }

    /// Returns true if `path` is a registered virtual file.
    pub fn contains(&self, path: &Path) -> bool {
        self.files().contains_key(path)
    }

    /// Copies out every registered file, ordered by path.
    pub fn snapshot(&self) -> Vec<VirtualFile> {
        self.files().values().cloned().collect()
    }

    /// Number of registered files.
    pub fn len(&self) -> usize {
        self.files().len()
    }

    /// Returns true if no file has been registered.
    pub fn is_empty(&self) -> bool {
        self.files().is_empty()
    }

    /// Returns true if both handles point at the same table.
    pub fn same_store(&self, other: &VirtualFileStore) -> bool {
        Arc::ptr_eq(&self.files, &other.files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let store = VirtualFileStore::new();
        store.insert(VirtualFile::new("/app/routes.js", b"one".to_vec()));
        let replaced = store.insert(VirtualFile::new("/app/routes.js", b"two".to_vec()));

        assert_eq!(&*replaced.unwrap().content, b"one");
        assert_eq!(store.len(), 1);
        assert_eq!(&*store.get(Path::new("/app/routes.js")).unwrap().content, b"two");
    }

    #[test]
    fn test_clones_share_the_table() {
        let store = VirtualFileStore::new();
        let handle = store.clone();
        handle.insert(VirtualFile::new("/a.js", b"".to_vec()));

        assert!(store.contains(Path::new("/a.js")));
        assert!(store.same_store(&handle));
        assert!(!store.same_store(&VirtualFileStore::new()));
    }

    #[test]
    fn test_snapshot_is_ordered_by_path() {
        let store = VirtualFileStore::new();
        store.insert(VirtualFile::new("/b.js", b"".to_vec()));
        store.insert(VirtualFile::new("/a.js", b"".to_vec()));

        let paths: Vec<_> = store.snapshot().into_iter().map(|f| f.path).collect();
        assert_eq!(paths, vec![PathBuf::from("/a.js"), PathBuf::from("/b.js")]);
    }
}
