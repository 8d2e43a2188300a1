// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

//! Swiftly CLI library.
//!
//! This crate drives swiftly's bundler pipelines from the command line.
//!
//! # Features
//!
//! - **One-shot builds** of the browser and server bundles
//! - **Watch mode** with debounced rebuilds
//! - **Server supervision** with graceful restarts
//! - **File-based routing** through the generated `swiftly!routes` module
//!
//! # Usage
//!
//! This crate is primarily used through the `swiftly` binary:
//!
//! ```bash
//! swiftly build --production   # Build for production
//! swiftly serve --port 3000    # Watch, rebuild and run the server
//! ```
//!
//! # Configuration
//!
//! The project root is the nearest directory with a `package.json`. Settings
//! are read from an optional `swiftly.toml` next to it.

/// CLI commands (build, serve).
pub mod commands;
/// Project discovery and `swiftly.toml`.
pub mod config;
/// HTML shell for the browser bundle.
pub mod launcher;
/// Bundler pipelines and watch sessions.
pub mod pipeline;
/// Server process supervision.
pub mod supervisor;
/// Debounced disk watching.
pub mod watcher;
