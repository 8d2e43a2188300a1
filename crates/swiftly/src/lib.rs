// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

//! # Swiftly
//!
//! Virtual module injection and file-based route synthesis for bundler
//! pipelines.
//!
//! Swiftly makes generated sources visible to a bundler as if they existed on
//! disk, without ever writing them. Files are written straight into the
//! bundler's stat, content and directory-listing caches, and kept consistent
//! across cache purges and incremental rebuilds.
//!
//! ## Features
//!
//! - Storage shim over two cache shapes (levelled and flat)
//! - Directory propagation so injected files show up in listings
//! - Route table generation from a `src/pages` tree
//! - Watch-mode invalidation for rewritten virtual files
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use swiftly::{VirtualFileStore, VirtualModules, ROUTES_SPECIFIER};
//!
//! let mut plugin = VirtualModules::new(
//!     VirtualFileStore::new(),
//!     "src/pages",
//!     ".swiftly-data/build/routes.js",
//! );
//! plugin.attach(&mut compiler)?;
//! let table = plugin.compilation(&mut compiler)?;
//! let routes_path = plugin.resolve(ROUTES_SPECIFIER);
//! ```

/// Bundler abstraction and build events.
pub mod compiler;
/// Error types.
pub mod error;
/// Bundler input filesystem layers.
pub mod fs;
/// The virtual-modules plugin.
pub mod plugin;
/// Directory propagation for injected files.
pub mod propagate;
/// Route table generation.
pub mod routes;
/// Synthetic and real file metadata.
pub mod stats;
/// Cache backends and the storage shim.
pub mod storage;
/// Virtual file registry.
pub mod store;
/// Watch-mode invalidation.
pub mod watch;

pub use compiler::{
    Bundle, BuildEvent, BuildSuccess, BuildTargetConfig, BundlerVersion, Compiler,
    DevServerOptions, Mode, Target,
};
pub use error::{BuildFailure, Diagnostic, Result, SwiftlyError};
pub use fs::{find_base_layer, CachedInputFileSystem, IgnoringFileSystem, InputFileSystem};
pub use plugin::{VirtualModules, ROUTES_SPECIFIER};
pub use routes::{
    parse_route_imports, url_path_for, DirectoryScanner, FsScanner, RouteDescriptor, RouteTable,
    ScanPages,
};
pub use stats::FileStat;
pub use storage::{StorageShape, StorageShim};
pub use store::{VirtualFile, VirtualFileStore};
pub use watch::{
    find_watchers, sync_timestamps, FileTimestamp, FileTimestamps, IgnoringWatchFileSystem,
    RegistryWatchFileSystem, WatchChange, WatchFileSystem, WatcherRegistry,
};
