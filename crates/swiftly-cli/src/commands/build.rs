// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Build command: runs every pipeline once and writes the HTML shell.

use std::time::Duration;

use console::style;
use futures_util::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use swiftly::{BuildEvent, Mode, VirtualFileStore};

use super::{create_pipelines, print_event, print_failure, select_mode, BuildSummary};
use crate::config::Project;
use crate::launcher;

/// Builds every pipeline of `project` concurrently.
///
/// The HTML shell is written only if every pipeline succeeded.
pub async fn build_project(project: &Project, mode: Mode) -> anyhow::Result<(BuildSummary, Vec<BuildEvent>)> {
    let store = VirtualFileStore::new();
    let mut pipelines = create_pipelines(project, mode, None, &store)?;

    let results = join_all(pipelines.iter_mut().map(|pipeline| pipeline.run())).await;
    let mut events = Vec::with_capacity(results.len());
    for result in results {
        events.push(result?);
    }

    let summary = BuildSummary::from_events(&events);
    if summary.is_success() {
        launcher::write(&project.public_dir(), &project.name())?;
    }
    tracing::info!(
        bundles = summary.bundles,
        failures = summary.failures.len(),
        virtual_modules = store.len(),
        "build finished"
    );
    Ok((summary, events))
}

/// Runs the build command.
pub async fn run(production: bool, development: bool) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let project = Project::discover(&cwd)?;
    let mode = select_mode(production, development, project.config.build.mode, Mode::Production);

    println!(
        "{} {} {}",
        style("Building").cyan(),
        style(project.name()).bold(),
        style(format!("({})", mode)).dim()
    );

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message("bundling");
    pb.enable_steady_tick(Duration::from_millis(80));

    let outcome = build_project(&project, mode).await;
    pb.finish_and_clear();
    let (summary, events) = outcome?;

    for event in &events {
        if let BuildEvent::Success(_) = event {
            print_event(event);
        }
    }

    if !summary.is_success() {
        for failure in &summary.failures {
            print_failure(failure);
        }
        anyhow::bail!("{} of {} pipeline(s) failed", summary.failures.len(), events.len());
    }

    println!();
    println!(
        "{} {} {}",
        style("✨ Built").green().bold(),
        style(format!("{} bundles in", summary.bundles)).dim(),
        style(format!("{}ms!", summary.build_time.as_millis())).cyan()
    );
    Ok(())
}
