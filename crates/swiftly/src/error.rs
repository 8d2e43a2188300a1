// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Error types for the swiftly injection engine.
//!
//! This module defines [`SwiftlyError`], the main error enum.
//!
//! # Error Categories
//!
//! - **Configuration errors**: the bundler's internal storage does not have a
//!   recognized shape, or no project manifest could be found. Fatal and never
//!   retried.
//! - **Initialization errors**: a virtual module was written before a bundler
//!   instance was attached.
//! - **Build failures**: a pipeline reported diagnostics. Fatal for one-shot
//!   builds, reported and skipped in watch mode.
//! - **I/O errors**: real filesystem failures other than "not found".

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A single problem reported by a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Human readable description.
    pub message: String,
    /// File the problem was found in, if known.
    pub file: Option<PathBuf>,
}

impl Diagnostic {
    /// Creates a diagnostic that is not tied to a file.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            file: None,
        }
    }

    /// Attaches the file the problem was found in.
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}: {}", file.display(), self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Diagnostics reported by one pipeline for a failed build pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
    /// Name of the pipeline that failed (e.g. `browser`, `server`).
    pub pipeline: String,
    /// Everything the pipeline reported.
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} build failed", self.pipeline)?;
        for diagnostic in &self.diagnostics {
            write!(f, "\n  {}", diagnostic)?;
        }
        Ok(())
    }
}

/// The main error type for swiftly operations.
#[derive(Error, Debug)]
pub enum SwiftlyError {
    /// Bundler internals or the project layout are not usable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An operation ran before the owning bundler instance existed.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// A pipeline reported diagnostics.
    #[error("{0}")]
    Build(BuildFailure),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing generated module source failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SwiftlyError {
    /// Returns true for errors that must never be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SwiftlyError::Configuration(_) | SwiftlyError::Initialization(_)
        )
    }
}

/// Convenience type alias for Results with [`SwiftlyError`].
pub type Result<T> = std::result::Result<T, SwiftlyError>;
