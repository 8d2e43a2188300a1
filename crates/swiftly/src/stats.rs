// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! File metadata shared by real and synthetic entries.
//!
//! Synthetic entries get an inode from a process-wide counter starting at
//! [`INODE_BASE`]. Values are handed out once and never reused while the
//! process runs, so two virtual entries can never be confused by identity.

use std::fs::Metadata;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// First inode handed to a synthetic entry.
pub const INODE_BASE: u64 = 45_000_000;

/// Mode bits of a synthetic regular file (`-rw-r--r--`).
pub const FILE_MODE: u32 = 0o100644;

/// Mode bits of a synthetic directory (`drwxr-xr-x`).
pub const DIR_MODE: u32 = 0o040755;

const SYNTHETIC_DEV: u64 = 8_675_309;
const BLOCK_SIZE: u64 = 4096;

static NEXT_INODE: AtomicU64 = AtomicU64::new(INODE_BASE);

/// Returns the next unused synthetic inode.
pub fn next_inode() -> u64 {
    NEXT_INODE.fetch_add(1, Ordering::Relaxed)
}

/// Kind of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Anything else (symlink, socket, device).
    Other,
}

/// Metadata for a real or synthetic filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    /// Entry kind.
    pub kind: FileKind,
    /// Size in bytes.
    pub size: u64,
    /// Inode number.
    pub ino: u64,
    /// Device number.
    pub dev: u64,
    /// Mode bits including the file type.
    pub mode: u32,
    /// Number of allocated blocks.
    pub blocks: u64,
    /// Last access time.
    pub atime: SystemTime,
    /// Last modification time.
    pub mtime: SystemTime,
    /// Last status change time.
    pub ctime: SystemTime,
    /// Creation time.
    pub birthtime: SystemTime,
}

impl FileStat {
    /// Synthetic stats for a virtual file of `size` bytes, stamped now.
    pub fn virtual_file(size: u64) -> Self {
        Self::synthetic(FileKind::File, size, FILE_MODE, SystemTime::now())
    }

    /// Synthetic stats for a virtual directory, stamped now.
    pub fn virtual_directory() -> Self {
        Self::synthetic(FileKind::Directory, 0, DIR_MODE, SystemTime::now())
    }

    fn synthetic(kind: FileKind, size: u64, mode: u32, time: SystemTime) -> Self {
        Self {
            kind,
            size,
            ino: next_inode(),
            dev: SYNTHETIC_DEV,
            mode,
            blocks: size / BLOCK_SIZE,
            atime: time,
            mtime: time,
            ctime: time,
            birthtime: time,
        }
    }

    /// Converts real filesystem metadata.
    pub fn from_metadata(meta: &Metadata) -> Self {
        let kind = if meta.is_dir() {
            FileKind::Directory
        } else if meta.is_file() {
            FileKind::File
        } else {
            FileKind::Other
        };
        let mtime = meta.modified().unwrap_or(UNIX_EPOCH);
        let atime = meta.accessed().unwrap_or(mtime);
        let birthtime = meta.created().unwrap_or(mtime);

        #[cfg(unix)]
        let (ino, dev, mode, ctime) = {
            use std::os::unix::fs::MetadataExt;
            let ctime = UNIX_EPOCH
                + std::time::Duration::new(meta.ctime().max(0) as u64, meta.ctime_nsec().max(0) as u32);
            (meta.ino(), meta.dev(), meta.mode(), ctime)
        };
        #[cfg(not(unix))]
        let (ino, dev, mode, ctime) = {
            let mode = match kind {
                FileKind::Directory => DIR_MODE,
                _ => FILE_MODE,
            };
            (0, 0, mode, birthtime)
        };

        Self {
            kind,
            size: meta.len(),
            ino,
            dev,
            mode,
            blocks: meta.len() / BLOCK_SIZE,
            atime,
            mtime,
            ctime,
            birthtime,
        }
    }

    /// Returns true for directories.
    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// Returns true for regular files.
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    /// Modification time in whole milliseconds since the epoch.
    pub fn mtime_ms(&self) -> u64 {
        epoch_millis(self.mtime)
    }

    /// Status change time in whole milliseconds since the epoch.
    pub fn ctime_ms(&self) -> u64 {
        epoch_millis(self.ctime)
    }
}

/// Milliseconds since the Unix epoch, saturating at zero for earlier times.
pub fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_inodes_are_unique_and_increasing() {
        let a = FileStat::virtual_file(10);
        let b = FileStat::virtual_directory();
        let c = FileStat::virtual_file(0);
        assert!(a.ino >= INODE_BASE);
        assert!(b.ino > a.ino);
        assert!(c.ino > b.ino);
    }

    #[test]
    fn test_virtual_file_stats() {
        let stat = FileStat::virtual_file(9000);
        assert!(stat.is_file());
        assert!(!stat.is_directory());
        assert_eq!(stat.size, 9000);
        assert_eq!(stat.blocks, 2);
        assert_eq!(stat.mode, FILE_MODE);
        assert_eq!(stat.atime, stat.mtime);
        assert_eq!(stat.ctime, stat.birthtime);
    }

    #[test]
    fn test_virtual_directory_has_no_size() {
        let stat = FileStat::virtual_directory();
        assert!(stat.is_directory());
        assert_eq!(stat.size, 0);
        assert_eq!(stat.mode, DIR_MODE);
    }

    #[test]
    fn test_from_metadata() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("page.tsx");
        std::fs::write(&file, "export default 1").unwrap();

        let stat = FileStat::from_metadata(&std::fs::metadata(&file).unwrap());
        assert!(stat.is_file());
        assert_eq!(stat.size, 16);
        assert!(stat.mtime_ms() > 0);

        let dir_stat = FileStat::from_metadata(&std::fs::metadata(dir.path()).unwrap());
        assert!(dir_stat.is_directory());
    }
}
