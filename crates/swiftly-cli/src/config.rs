// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Swiftly project configuration.
//!
//! The project root is the nearest directory, starting from the working
//! directory, that contains a `package.json`. Settings are read from an
//! optional `swiftly.toml` next to it.
//!
//! # Example Configuration
//!
//! ```toml
//! [project]
//! name = "my-app"
//!
//! [paths]
//! pages_dir = "src/pages"
//! data_dir = ".swiftly-data"
//! output_dir = "dist"
//! public_dir = "dist/public"
//!
//! [build]
//! browser_entry = "src/browser.ts"
//! server_entry = "src/server.ts"
//! server = true
//! mode = "production"
//! extensions = ["tsx", "ts", "jsx", "js"]
//!
//! [serve]
//! port = 3000
//! runtime = "node"
//! grace_period_ms = 5000
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use swiftly::Mode;
use thiserror::Error;

/// Manifest file that marks a project root.
pub const MANIFEST_FILE: &str = "package.json";

/// Optional settings file at the project root.
pub const CONFIG_FILE: &str = "swiftly.toml";

/// Errors raised while locating or reading a project.
#[derive(Error, Debug)]
pub enum CliError {
    /// No manifest in the working directory or any parent.
    #[error("Configuration error: no package.json found in {0} or any parent directory")]
    ManifestNotFound(PathBuf),

    /// A project file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// `swiftly.toml` is malformed.
    #[error("invalid swiftly.toml: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Walks up from `start` and returns the first path `start/../name` that
/// exists.
pub fn upsearch(start: &Path, name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Main configuration structure loaded from `swiftly.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Project metadata.
    #[serde(default)]
    pub project: ProjectConfig,
    /// Directory layout.
    #[serde(default)]
    pub paths: PathsConfig,
    /// Pipeline settings.
    #[serde(default)]
    pub build: BuildConfig,
    /// Watch-mode server settings.
    #[serde(default)]
    pub serve: ServeConfig,
}

/// Project metadata configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectConfig {
    /// Project name. Falls back to the manifest's `name`.
    pub name: Option<String>,
}

/// Directory layout, relative to the project root.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Pages root scanned for routes (default: "src/pages").
    #[serde(default = "default_pages_dir")]
    pub pages_dir: String,
    /// Directory for generated data (default: ".swiftly-data").
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Directory the server bundle is written to (default: "dist").
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Directory for the browser bundle and HTML shell (default: "dist/public").
    #[serde(default = "default_public_dir")]
    pub public_dir: String,
}

/// Pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    /// Browser entry module (default: "src/browser.ts").
    #[serde(default = "default_browser_entry")]
    pub browser_entry: String,
    /// Server entry module (default: "src/server.ts").
    #[serde(default = "default_server_entry")]
    pub server_entry: String,
    /// Whether the server pipeline runs at all (default: true).
    #[serde(default = "default_true")]
    pub server: bool,
    /// Extensions probed when resolving imports, in order.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Mode used when no mode flag is given. Unset means production for
    /// `build` and development for `serve`.
    #[serde(default)]
    pub mode: Option<Mode>,
}

/// Watch-mode server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServeConfig {
    /// Port handed to the server (default: 3000).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Program that runs the server bundle (default: "node").
    #[serde(default = "default_runtime")]
    pub runtime: String,
    /// Wait between interrupt and forced kill (default: 5000).
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

fn default_pages_dir() -> String {
    "src/pages".to_string()
}

fn default_data_dir() -> String {
    ".swiftly-data".to_string()
}

fn default_output_dir() -> String {
    "dist".to_string()
}

fn default_public_dir() -> String {
    "dist/public".to_string()
}

fn default_browser_entry() -> String {
    "src/browser.ts".to_string()
}

fn default_server_entry() -> String {
    "src/server.ts".to_string()
}

fn default_true() -> bool {
    true
}

fn default_extensions() -> Vec<String> {
    ["tsx", "ts", "jsx", "js"].iter().map(|s| s.to_string()).collect()
}

fn default_port() -> u16 {
    3000
}

fn default_runtime() -> String {
    "node".to_string()
}

fn default_grace_period_ms() -> u64 {
    5000
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            pages_dir: default_pages_dir(),
            data_dir: default_data_dir(),
            output_dir: default_output_dir(),
            public_dir: default_public_dir(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            browser_entry: default_browser_entry(),
            server_entry: default_server_entry(),
            server: default_true(),
            extensions: default_extensions(),
            mode: None,
        }
    }
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            runtime: default_runtime(),
            grace_period_ms: default_grace_period_ms(),
        }
    }
}

impl ServeConfig {
    /// Grace period as a duration.
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl Config {
    /// Loads `swiftly.toml` from `root`.
    ///
    /// If no configuration file exists, returns default configuration.
    pub fn load(root: &Path) -> Result<Self, CliError> {
        let config_path = root.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(&config_path).map_err(|source| CliError::Read {
            path: config_path.clone(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }
}

#[derive(Deserialize)]
struct Manifest {
    name: Option<String>,
}

/// A discovered project: its root plus settings.
#[derive(Debug, Clone)]
pub struct Project {
    /// Directory containing the manifest.
    pub root: PathBuf,
    /// Loaded settings.
    pub config: Config,
}

impl Project {
    /// Locates the project containing `cwd` and loads its settings.
    pub fn discover(cwd: &Path) -> Result<Self, CliError> {
        let manifest_path = upsearch(cwd, MANIFEST_FILE)
            .ok_or_else(|| CliError::ManifestNotFound(cwd.to_path_buf()))?;
        let root = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.to_path_buf());

        let mut config = Config::load(&root)?;
        if config.project.name.is_none() {
            // A manifest that is not valid JSON still marks the root.
            config.project.name = fs::read_to_string(&manifest_path)
                .ok()
                .and_then(|raw| serde_json::from_str::<Manifest>(&raw).ok())
                .and_then(|manifest| manifest.name);
        }
        tracing::debug!(root = %root.display(), "discovered project");
        Ok(Self { root, config })
    }

    /// Project name, or the root directory's name.
    pub fn name(&self) -> String {
        self.config
            .project
            .name
            .clone()
            .or_else(|| {
                self.root
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "unnamed".to_string())
    }

    /// Pages root.
    pub fn pages_dir(&self) -> PathBuf {
        self.root.join(&self.config.paths.pages_dir)
    }

    /// Generated data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(&self.config.paths.data_dir)
    }

    /// Directory generated build inputs live in.
    pub fn build_data_dir(&self) -> PathBuf {
        self.data_dir().join("build")
    }

    /// Path of the generated route table module.
    pub fn routes_module(&self) -> PathBuf {
        self.build_data_dir().join("routes.js")
    }

    /// Server bundle directory.
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.config.paths.output_dir)
    }

    /// Browser bundle and HTML shell directory.
    pub fn public_dir(&self) -> PathBuf {
        self.root.join(&self.config.paths.public_dir)
    }

    /// Browser entry module.
    pub fn browser_entry(&self) -> PathBuf {
        self.root.join(&self.config.build.browser_entry)
    }

    /// Server entry module.
    pub fn server_entry(&self) -> PathBuf {
        self.root.join(&self.config.build.server_entry)
    }

    /// Creates the generated data directory.
    pub fn prepare(&self) -> Result<(), CliError> {
        let dir = self.build_data_dir();
        fs::create_dir_all(&dir).map_err(|source| CliError::Read { path: dir, source })
    }
}
