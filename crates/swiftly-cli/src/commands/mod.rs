// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! CLI command implementations.
//!
//! - `build`: one-shot build of every pipeline
//! - `serve`: watch mode with a supervised server process

/// One-shot build command.
pub mod build;
/// Watch-mode serve command.
pub mod serve;

use std::time::Duration;

use console::style;
use swiftly::{
    BuildEvent, BuildFailure, BuildTargetConfig, DevServerOptions, Mode, Target,
    VirtualFileStore,
};

use crate::config::Project;
use crate::pipeline::{Pipeline, PipelineOptions};

/// Creates the browser pipeline and, unless disabled, the server pipeline.
///
/// Every pipeline shares `store`, so a purge in one restores files written
/// through any of them.
pub fn create_pipelines(
    project: &Project,
    mode: Mode,
    dev_server: Option<DevServerOptions>,
    store: &VirtualFileStore,
) -> anyhow::Result<Vec<Pipeline>> {
    project.prepare()?;
    let options = PipelineOptions::for_project(project);

    let mut targets = vec![BuildTargetConfig {
        target: Target::Browser,
        mode,
        entry: project.browser_entry(),
        output_dir: project.public_dir(),
        dev_server,
    }];
    if project.config.build.server {
        targets.push(BuildTargetConfig {
            target: Target::Server,
            mode,
            entry: project.server_entry(),
            output_dir: project.output_dir(),
            dev_server,
        });
    }

    let mut pipelines = Vec::with_capacity(targets.len());
    for config in targets {
        pipelines.push(Pipeline::new(config, options.clone(), store.clone())?);
    }
    Ok(pipelines)
}

/// Picks the build mode. Flags win over the configured mode, which wins
/// over the command's `fallback`.
pub fn select_mode(production: bool, development: bool, configured: Option<Mode>, fallback: Mode) -> Mode {
    match (production, development) {
        (false, false) => configured.unwrap_or(fallback),
        (true, false) => Mode::Production,
        (false, true) => Mode::Development,
        (true, true) => fallback,
    }
}

/// Aggregated result of one build of every pipeline.
#[derive(Debug, Clone, Default)]
pub struct BuildSummary {
    /// Bundles emitted by successful pipelines.
    pub bundles: usize,
    /// Sum of every pipeline's build time.
    pub build_time: Duration,
    /// Pipelines that failed.
    pub failures: Vec<BuildFailure>,
}

impl BuildSummary {
    /// Folds a set of build events into a summary.
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a BuildEvent>) -> Self {
        let mut summary = Self::default();
        for event in events {
            match event {
                BuildEvent::Success(success) => {
                    summary.bundles += success.bundles.len();
                    summary.build_time += success.build_time;
                }
                BuildEvent::Failure(failure) => summary.failures.push(failure.clone()),
            }
        }
        summary
    }

    /// Returns true if no pipeline failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Prints one build event as a status line.
pub fn print_event(event: &BuildEvent) {
    match event {
        BuildEvent::Success(success) => {
            println!(
                "  {:<12} {} {}",
                style(&success.pipeline).cyan(),
                style("✓").green(),
                style(format!(
                    "{} bundle(s) in {}ms",
                    success.bundles.len(),
                    success.build_time.as_millis()
                ))
                .dim()
            );
        }
        BuildEvent::Failure(failure) => print_failure(failure),
    }
}

/// Prints a failure and every diagnostic it carries.
pub fn print_failure(failure: &BuildFailure) {
    eprintln!(
        "  {:<12} {} {}",
        style(&failure.pipeline).cyan(),
        style("✗").red(),
        style("build failed").red()
    );
    for diagnostic in &failure.diagnostics {
        eprintln!("      {}", style(diagnostic).red());
    }
}
