// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The bundler abstraction consumed by the injection engine.
//!
//! [`Compiler`] exposes the handful of bundler internals the plugin touches:
//! the input filesystem stack, the watch filesystem stack and the file
//! timestamp table. Pipelines report their results as [`BuildEvent`]s.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::BuildFailure;
use crate::fs::InputFileSystem;
use crate::watch::{FileTimestamp, FileTimestamps, WatchFileSystem};

/// Bundler generation, as far as its internal data shapes are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundlerVersion {
    /// Plain timestamps, flat caches.
    Legacy,
    /// Safe-time timestamps, levelled caches.
    Current,
}

impl BundlerVersion {
    /// Timestamp table entry for a modification time.
    pub fn timestamp(self, mtime_ms: u64) -> FileTimestamp {
        match self {
            BundlerVersion::Legacy => FileTimestamp::Plain(mtime_ms),
            BundlerVersion::Current => FileTimestamp::Safe {
                safe_time: mtime_ms,
                timestamp: mtime_ms,
            },
        }
    }
}

/// Build mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Unoptimised output.
    Development,
    /// Optimised output.
    Production,
}

impl Mode {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which runtime a pipeline builds for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Browser bundle served as a static asset.
    Browser,
    /// Server bundle run as a child process.
    Server,
}

impl Target {
    /// Pipeline name for this target.
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Browser => "browser",
            Target::Server => "server",
        }
    }
}

/// Dev server settings for watch mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevServerOptions {
    /// Port the server listens on.
    pub port: u16,
}

/// Configuration a pipeline is built from. Never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTargetConfig {
    /// Target runtime.
    pub target: Target,
    /// Build mode.
    pub mode: Mode,
    /// Entry module path.
    pub entry: PathBuf,
    /// Directory bundles are written to.
    pub output_dir: PathBuf,
    /// Dev server settings, in watch mode.
    pub dev_server: Option<DevServerOptions>,
}

/// One emitted bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    /// Entry module of the bundle.
    pub entry: PathBuf,
    /// Emitted file.
    pub file_path: PathBuf,
    /// Number of modules included.
    pub modules: usize,
}

/// Result of a successful build pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSuccess {
    /// Pipeline that produced the bundles.
    pub pipeline: String,
    /// Every emitted bundle.
    pub bundles: Vec<Bundle>,
    /// Wall time of the pass.
    pub build_time: Duration,
}

/// Outcome of one build pass, as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// The pass emitted bundles.
    Success(BuildSuccess),
    /// The pass reported diagnostics.
    Failure(BuildFailure),
}

impl BuildEvent {
    /// Name of the pipeline the event belongs to.
    pub fn pipeline(&self) -> &str {
        match self {
            BuildEvent::Success(success) => &success.pipeline,
            BuildEvent::Failure(failure) => &failure.pipeline,
        }
    }
}

/// Bundler internals reachable from a plugin.
pub trait Compiler: Send {
    /// Compiler name, used in traces.
    fn name(&self) -> &str;

    /// Directory relative paths are resolved against.
    fn context(&self) -> &Path;

    /// Generation of the bundler's internal data shapes.
    fn version(&self) -> BundlerVersion;

    /// Outermost input filesystem layer.
    fn input_file_system(&mut self) -> &mut dyn InputFileSystem;

    /// Outermost watch filesystem layer, while a watch session is active.
    fn watch_file_system(&mut self) -> Option<&mut dyn WatchFileSystem>;

    /// File timestamp table used by incremental invalidation.
    fn file_timestamps(&mut self) -> Option<&mut FileTimestamps>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_deserializes_lowercase() {
        let mode: Mode = serde_json::from_str("\"development\"").unwrap();
        assert_eq!(mode, Mode::Development);
        assert_eq!(Mode::Production.to_string(), "production");
    }

    #[test]
    fn test_version_timestamp_shapes() {
        assert_eq!(BundlerVersion::Legacy.timestamp(7), FileTimestamp::Plain(7));
        assert_eq!(
            BundlerVersion::Current.timestamp(7),
            FileTimestamp::Safe {
                safe_time: 7,
                timestamp: 7
            }
        );
    }
}
