// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Disk watching for watch-mode pipelines.
//!
//! This module provides `DiskWatcher`, which reports changed source files so
//! a pipeline can purge its caches and rebuild.
//!
//! # Features
//!
//! - Debounced file change events (750ms)
//! - Filters for source extensions and ignored paths
//! - Recursive directory watching

use globset::GlobSet;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, RecommendedCache};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Debounce window for disk events.
pub const DEBOUNCE: Duration = Duration::from_millis(750);

/// Decides which changed paths are worth a rebuild.
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    extensions: Vec<String>,
    ignored: GlobSet,
}

impl ChangeFilter {
    /// Accepts files with one of `extensions` that `ignored` does not match.
    pub fn new(extensions: Vec<String>, ignored: GlobSet) -> Self {
        Self { extensions, ignored }
    }

    /// Returns true if a change to `path` should trigger a rebuild.
    pub fn accepts(&self, path: &Path) -> bool {
        if self.ignored.is_match(path) {
            return false;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => self.extensions.iter().any(|allowed| allowed == ext),
            None => false,
        }
    }
}

/// Watches a directory tree and forwards batches of relevant changed paths.
pub struct DiskWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl DiskWatcher {
    /// Starts watching `root` recursively.
    ///
    /// Every debounced batch containing at least one accepted path is sent to
    /// `changes`. Batches are dropped once the receiver is gone.
    pub fn new(
        root: &Path,
        filter: ChangeFilter,
        changes: mpsc::UnboundedSender<Vec<PathBuf>>,
    ) -> anyhow::Result<Self> {
        let mut debouncer = new_debouncer(DEBOUNCE, None, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    let mut changed: Vec<PathBuf> = events
                        .iter()
                        .flat_map(|e| e.paths.iter())
                        .filter(|p| filter.accepts(p))
                        .cloned()
                        .collect();
                    changed.sort();
                    changed.dedup();

                    if !changed.is_empty() {
                        tracing::debug!(count = changed.len(), "disk change");
                        let _ = changes.send(changed);
                    }
                }
                Err(errors) => {
                    for error in errors {
                        tracing::warn!(%error, "file watcher error");
                    }
                }
            }
        })?;

        debouncer.watch(root, RecursiveMode::Recursive)?;
        Ok(Self {
            _debouncer: debouncer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use globset::{Glob, GlobSetBuilder};

    fn filter() -> ChangeFilter {
        let mut ignored = GlobSetBuilder::new();
        ignored.add(Glob::new("**/.swiftly-data/**").unwrap());
        ignored.add(Glob::new("**/dist/**").unwrap());
        ChangeFilter::new(
            vec!["tsx".to_string(), "ts".to_string()],
            ignored.build().unwrap(),
        )
    }

    #[test]
    fn test_filter_accepts_sources() {
        assert!(filter().accepts(Path::new("/app/src/pages/index.tsx")));
        assert!(filter().accepts(Path::new("/app/src/server.ts")));
    }

    #[test]
    fn test_filter_rejects_other_files() {
        assert!(!filter().accepts(Path::new("/app/README.md")));
        assert!(!filter().accepts(Path::new("/app/Makefile")));
        assert!(!filter().accepts(Path::new("/app/dist/server.ts")));
        assert!(!filter().accepts(Path::new("/app/.swiftly-data/build/x.ts")));
    }
}
