// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Backend storage shim.
//!
//! A bundler's cached filesystem keeps three caches: stat results, file
//! contents and directory listings. Depending on the bundler generation each
//! cache is either
//!
//! - a [`LeveledBackend`]: a keyed store whose entries are tagged with the
//!   expiry level they were written in, or
//! - a [`FlatBackend`]: a plain key-indexed map without levels.
//!
//! [`StorageShim`] detects the shape once, when the plugin attaches, and then
//! reads and writes entries without its callers knowing which shape is in use.
//! Storage that does not match the detected shape is a configuration error and
//! is never retried.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{Result, SwiftlyError};
use crate::stats::FileStat;

/// A cached result, as stored by any of the three caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    /// Result of a stat call.
    Stat(FileStat),
    /// Result of a file read.
    Content(Arc<[u8]>),
    /// Result of a directory listing (file names, not paths).
    Listing(Vec<String>),
}

/// An entry in a [`LeveledBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeveledEntry {
    /// The cached result.
    pub result: CacheValue,
    /// Level the entry was written in.
    pub level: usize,
}

/// Keyed cache with rotating expiry levels.
///
/// Writes land in the current level. [`LeveledBackend::tick`] advances to the
/// next level and expires whatever was written there one full rotation ago.
#[derive(Debug, Clone)]
pub struct LeveledBackend {
    data: HashMap<String, LeveledEntry>,
    levels: Vec<HashSet<String>>,
    current_level: usize,
}

impl LeveledBackend {
    /// Creates a backend with `level_count` levels (at least one).
    pub fn new(level_count: usize) -> Self {
        Self {
            data: HashMap::new(),
            levels: vec![HashSet::new(); level_count.max(1)],
            current_level: 0,
        }
    }

    /// Index of the level new writes go to.
    pub fn current_level(&self) -> usize {
        self.current_level
    }

    /// Looks up an entry.
    pub fn get(&self, key: &str) -> Option<&LeveledEntry> {
        self.data.get(key)
    }

    /// Stores `result` under `key` in the current level.
    pub fn insert(&mut self, key: &str, result: CacheValue) {
        if let Some(old) = self.data.get(key) {
            self.levels[old.level].remove(key);
        }
        self.levels[self.current_level].insert(key.to_string());
        self.data.insert(
            key.to_string(),
            LeveledEntry {
                result,
                level: self.current_level,
            },
        );
    }

    /// Drops a single entry.
    pub fn remove(&mut self, key: &str) {
        if let Some(old) = self.data.remove(key) {
            self.levels[old.level].remove(key);
        }
    }

    /// Advances to the next level, expiring the entries stored in it.
    pub fn tick(&mut self) {
        self.current_level = (self.current_level + 1) % self.levels.len();
        let expired = std::mem::take(&mut self.levels[self.current_level]);
        for key in expired {
            self.data.remove(&key);
        }
    }

    /// Drops every entry.
    pub fn purge(&mut self) {
        self.data.clear();
        for level in &mut self.levels {
            level.clear();
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Plain key-indexed cache.
#[derive(Debug, Clone, Default)]
pub struct FlatBackend {
    data: HashMap<String, CacheValue>,
}

impl FlatBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up an entry.
    pub fn get(&self, key: &str) -> Option<&CacheValue> {
        self.data.get(key)
    }

    /// Stores `result` under `key`.
    pub fn insert(&mut self, key: &str, result: CacheValue) {
        self.data.insert(key.to_string(), result);
    }

    /// Drops a single entry.
    pub fn remove(&mut self, key: &str) {
        self.data.remove(key);
    }

    /// Drops every entry.
    pub fn purge(&mut self) {
        self.data.clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One cache of a bundler filesystem, in whichever shape it uses.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Levelled keyed store.
    Leveled(LeveledBackend),
    /// Unstructured key-indexed map.
    Flat(FlatBackend),
}

impl Backend {
    /// Creates an empty backend of the given shape.
    pub fn with_shape(shape: StorageShape) -> Self {
        match shape {
            StorageShape::Indexed { levels } => Backend::Leveled(LeveledBackend::new(levels)),
            StorageShape::Flat => Backend::Flat(FlatBackend::new()),
        }
    }

    /// Shape of this backend.
    pub fn shape(&self) -> StorageShape {
        match self {
            Backend::Leveled(b) => StorageShape::Indexed {
                levels: b.levels.len(),
            },
            Backend::Flat(_) => StorageShape::Flat,
        }
    }

    /// Looks up a cached result regardless of shape.
    pub fn lookup(&self, key: &str) -> Option<&CacheValue> {
        match self {
            Backend::Leveled(b) => b.get(key).map(|e| &e.result),
            Backend::Flat(b) => b.get(key),
        }
    }

    /// Stores a result regardless of shape.
    pub fn store(&mut self, key: &str, result: CacheValue) {
        match self {
            Backend::Leveled(b) => b.insert(key, result),
            Backend::Flat(b) => b.insert(key, result),
        }
    }

    /// Drops a single entry.
    pub fn remove(&mut self, key: &str) {
        match self {
            Backend::Leveled(b) => b.remove(key),
            Backend::Flat(b) => b.remove(key),
        }
    }

    /// Drops every entry.
    pub fn purge(&mut self) {
        match self {
            Backend::Leveled(b) => b.purge(),
            Backend::Flat(b) => b.purge(),
        }
    }

    /// Advances expiry levels. No-op for flat storage.
    pub fn tick(&mut self) {
        if let Backend::Leveled(b) = self {
            b.tick();
        }
    }
}

/// The storage shape a bundler uses for all three caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageShape {
    /// Keyed store with `levels` expiry levels.
    Indexed {
        /// Number of expiry levels.
        levels: usize,
    },
    /// Plain key-indexed map.
    Flat,
}

impl StorageShape {
    fn same_kind(self, other: StorageShape) -> bool {
        matches!(
            (self, other),
            (StorageShape::Indexed { .. }, StorageShape::Indexed { .. })
                | (StorageShape::Flat, StorageShape::Flat)
        )
    }
}

/// Mutable access to the three caches of a base filesystem layer.
///
/// A cache a layer does not expose is `None`.
pub struct FsStorage<'a> {
    /// Stat cache.
    pub stat: Option<&'a mut Backend>,
    /// File content cache.
    pub read_file: Option<&'a mut Backend>,
    /// Directory listing cache.
    pub read_dir: Option<&'a mut Backend>,
}

/// Which cache of a filesystem layer to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageRole {
    /// Stat cache.
    Stat,
    /// File content cache.
    ReadFile,
    /// Directory listing cache.
    ReadDir,
}

impl StorageRole {
    fn as_str(self) -> &'static str {
        match self {
            StorageRole::Stat => "stat",
            StorageRole::ReadFile => "readFile",
            StorageRole::ReadDir => "readdir",
        }
    }
}

impl<'a> FsStorage<'a> {
    /// Returns the requested cache, or a configuration error if the layer
    /// does not expose it.
    pub fn backend(&mut self, role: StorageRole) -> Result<&mut Backend> {
        let backend = match role {
            StorageRole::Stat => self.stat.as_deref_mut(),
            StorageRole::ReadFile => self.read_file.as_deref_mut(),
            StorageRole::ReadDir => self.read_dir.as_deref_mut(),
        };
        backend.ok_or_else(|| {
            SwiftlyError::Configuration(format!(
                "couldn't find a {} storage in the bundler's filesystem; the bundler version is not supported",
                role.as_str()
            ))
        })
    }
}

/// Shape-aware reader/writer for bundler cache entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageShim {
    shape: StorageShape,
}

impl StorageShim {
    /// Creates a shim for an already known shape.
    pub fn new(shape: StorageShape) -> Self {
        Self { shape }
    }

    /// Detects the shape of a layer's caches.
    ///
    /// All three caches must be present and share one shape.
    pub fn detect(storage: &mut FsStorage<'_>) -> Result<Self> {
        let stat = storage.backend(StorageRole::Stat)?.shape();
        for role in [StorageRole::ReadFile, StorageRole::ReadDir] {
            let shape = storage.backend(role)?.shape();
            if !shape.same_kind(stat) {
                return Err(SwiftlyError::Configuration(format!(
                    "{} storage is {:?} but stat storage is {:?}; the bundler version is not supported",
                    role.as_str(),
                    shape,
                    stat
                )));
            }
        }
        Ok(Self { shape: stat })
    }

    /// The detected shape.
    pub fn shape(&self) -> StorageShape {
        self.shape
    }

    /// Reads the entry stored under `key`.
    pub fn read_entry(&self, backend: &Backend, key: &str) -> Result<Option<CacheValue>> {
        match (self.shape, backend) {
            (StorageShape::Indexed { .. }, Backend::Leveled(b)) => {
                Ok(b.get(key).map(|entry| entry.result.clone()))
            }
            (StorageShape::Flat, Backend::Flat(b)) => Ok(b.get(key).cloned()),
            (expected, found) => Err(mismatch(expected, found)),
        }
    }

    /// Writes `value` under `key`, replacing any previous entry.
    pub fn write_entry(&self, backend: &mut Backend, key: &str, value: CacheValue) -> Result<()> {
        match (self.shape, backend) {
            (StorageShape::Indexed { .. }, Backend::Leveled(b)) => {
                b.insert(key, value);
                Ok(())
            }
            (StorageShape::Flat, Backend::Flat(b)) => {
                b.insert(key, value);
                Ok(())
            }
            (expected, found) => Err(mismatch(expected, found)),
        }
    }
}

fn mismatch(expected: StorageShape, found: &Backend) -> SwiftlyError {
    SwiftlyError::Configuration(format!(
        "bundler storage changed shape: expected {:?}, found {:?}",
        expected,
        found.shape()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(names: &[&str]) -> CacheValue {
        CacheValue::Listing(names.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_shim_round_trips_both_shapes() {
        for shape in [StorageShape::Indexed { levels: 9 }, StorageShape::Flat] {
            let shim = StorageShim::new(shape);
            let mut backend = Backend::with_shape(shape);

            assert_eq!(shim.read_entry(&backend, "/app/src").unwrap(), None);
            shim.write_entry(&mut backend, "/app/src", listing(&["a.ts"])).unwrap();
            shim.write_entry(&mut backend, "/app/src", listing(&["a.ts", "b.ts"])).unwrap();
            assert_eq!(
                shim.read_entry(&backend, "/app/src").unwrap(),
                Some(listing(&["a.ts", "b.ts"]))
            );
        }
    }

    #[test]
    fn test_shim_rejects_mismatched_backend() {
        let shim = StorageShim::new(StorageShape::Flat);
        let mut backend = Backend::with_shape(StorageShape::Indexed { levels: 2 });
        let err = shim
            .write_entry(&mut backend, "/x", listing(&[]))
            .unwrap_err();
        assert!(matches!(err, SwiftlyError::Configuration(_)));
        assert!(shim.read_entry(&backend, "/x").is_err());
    }

    #[test]
    fn test_detect_requires_every_backend() {
        let mut stat = Backend::with_shape(StorageShape::Flat);
        let mut read_file = Backend::with_shape(StorageShape::Flat);
        let mut storage = FsStorage {
            stat: Some(&mut stat),
            read_file: Some(&mut read_file),
            read_dir: None,
        };
        let err = StorageShim::detect(&mut storage).unwrap_err();
        assert!(err.to_string().contains("readdir storage"));
    }

    #[test]
    fn test_detect_rejects_mixed_shapes() {
        let mut stat = Backend::with_shape(StorageShape::Indexed { levels: 3 });
        let mut read_file = Backend::with_shape(StorageShape::Flat);
        let mut read_dir = Backend::with_shape(StorageShape::Indexed { levels: 3 });
        let mut storage = FsStorage {
            stat: Some(&mut stat),
            read_file: Some(&mut read_file),
            read_dir: Some(&mut read_dir),
        };
        assert!(StorageShim::detect(&mut storage).is_err());
    }

    #[test]
    fn test_detect_indexed() {
        let mut stat = Backend::with_shape(StorageShape::Indexed { levels: 3 });
        let mut read_file = Backend::with_shape(StorageShape::Indexed { levels: 3 });
        let mut read_dir = Backend::with_shape(StorageShape::Indexed { levels: 3 });
        let mut storage = FsStorage {
            stat: Some(&mut stat),
            read_file: Some(&mut read_file),
            read_dir: Some(&mut read_dir),
        };
        let shim = StorageShim::detect(&mut storage).unwrap();
        assert_eq!(shim.shape(), StorageShape::Indexed { levels: 3 });
    }

    #[test]
    fn test_leveled_tick_expires_oldest_level() {
        let mut backend = LeveledBackend::new(2);
        backend.insert("a", listing(&[]));
        assert_eq!(backend.get("a").unwrap().level, 0);

        backend.tick();
        backend.insert("b", listing(&[]));
        assert_eq!(backend.len(), 2);

        // Back to level 0: "a" expires, "b" survives.
        backend.tick();
        assert!(backend.get("a").is_none());
        assert!(backend.get("b").is_some());
    }

    #[test]
    fn test_leveled_rewrite_moves_entry_to_current_level() {
        let mut backend = LeveledBackend::new(2);
        backend.insert("a", listing(&[]));
        backend.tick();
        backend.insert("a", listing(&["x"]));
        assert_eq!(backend.get("a").unwrap().level, 1);

        backend.tick();
        assert!(backend.get("a").is_some());
    }
}
