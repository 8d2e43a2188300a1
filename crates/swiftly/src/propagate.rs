// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Directory propagation.
//!
//! Writing a virtual file into the stat and content caches is not enough for
//! a bundler to find it: resolvers and scanners also list directories. After a
//! file is injected, each ancestor directory's cached listing is updated to
//! contain the child name, walking upward from the immediate parent.
//!
//! Ancestors that do not exist on disk get a synthetic directory entry (fresh
//! inode, directory mode, no size) and an empty listing first.
//!
//! The walk stops at the first ancestor whose listing already contains the
//! child. Everything above it was made consistent by an earlier injection, so
//! writing the same file twice never duplicates a name and never creates
//! synthetic directories again.

use std::path::Path;

use crate::error::{Result, SwiftlyError};
use crate::fs::{path_key, InputFileSystem, RawAccess};
use crate::stats::FileStat;
use crate::storage::{CacheValue, StorageRole, StorageShim};
use crate::store::VirtualFile;

fn raw(fs: &mut dyn InputFileSystem) -> Result<RawAccess<'_>> {
    fs.raw_access().ok_or_else(|| {
        SwiftlyError::Configuration(
            "bundler filesystem exposes no raw-write capability".to_string(),
        )
    })
}

/// Writes a virtual file into a base layer's caches and propagates its name
/// to every ancestor listing.
pub fn inject(fs: &mut dyn InputFileSystem, shim: &StorageShim, file: &VirtualFile) -> Result<()> {
    let key = path_key(&file.path);
    {
        let mut access = raw(fs)?;
        shim.write_entry(
            access.storage.backend(StorageRole::Stat)?,
            &key,
            CacheValue::Stat(file.stats.clone()),
        )?;
        shim.write_entry(
            access.storage.backend(StorageRole::ReadFile)?,
            &key,
            CacheValue::Content(file.content.clone()),
        )?;
    }
    propagate_directories(fs, shim, &file.path)
}

/// Ensures every ancestor listing of `path` contains the name below it.
///
/// Returns once the filesystem root has been updated or an ancestor already
/// lists its child.
pub fn propagate_directories(
    fs: &mut dyn InputFileSystem,
    shim: &StorageShim,
    path: &Path,
) -> Result<()> {
    let mut child = path;
    while let Some(dir) = child.parent() {
        if dir.as_os_str().is_empty() {
            break;
        }
        let Some(name) = child.file_name() else {
            break;
        };
        let name = name.to_string_lossy().into_owned();
        let dir_key = path_key(dir);

        let listed = match fs.read_dir(dir) {
            Ok(names) => names,
            Err(_) => {
                tracing::trace!(dir = %dir.display(), "creating synthetic directory");
                let mut access = raw(fs)?;
                shim.write_entry(
                    access.storage.backend(StorageRole::ReadDir)?,
                    &dir_key,
                    CacheValue::Listing(Vec::new()),
                )?;
                shim.write_entry(
                    access.storage.backend(StorageRole::Stat)?,
                    &dir_key,
                    CacheValue::Stat(FileStat::virtual_directory()),
                )?;
                Vec::new()
            }
        };

        let mut access = raw(fs)?;
        let read_dir = access.storage.backend(StorageRole::ReadDir)?;
        let mut names = match shim.read_entry(read_dir, &dir_key)? {
            Some(CacheValue::Listing(names)) => names,
            _ => listed,
        };
        if names.iter().any(|existing| *existing == name) {
            break;
        }
        names.push(name);
        names.sort();
        shim.write_entry(read_dir, &dir_key, CacheValue::Listing(names))?;

        child = dir;
    }
    Ok(())
}
