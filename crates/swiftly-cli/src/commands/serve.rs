// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Serve command: watches every pipeline and restarts the server bundle
//! after each successful server build.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use console::style;
use swiftly::{BuildEvent, Bundle, DevServerOptions, Mode, VirtualFileStore};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::{create_pipelines, print_event, select_mode};
use crate::config::Project;
use crate::launcher;
use crate::pipeline::WatchSession;
use crate::supervisor::{ShutdownOutcome, SupervisedProcess};

/// Keeps at most one server process alive, replacing it on every rebuild.
pub struct ServerSlot {
    runtime: String,
    cwd: PathBuf,
    port: u16,
    grace: Duration,
    current: Option<SupervisedProcess>,
}

impl ServerSlot {
    /// Creates an empty slot that runs bundles with `runtime`.
    pub fn new(runtime: impl Into<String>, cwd: &Path, port: u16, grace: Duration) -> Self {
        Self {
            runtime: runtime.into(),
            cwd: cwd.to_path_buf(),
            port,
            grace,
            current: None,
        }
    }

    /// Returns true while a server process is held.
    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    /// OS process id of the held server, while it runs.
    pub fn id(&self) -> Option<u32> {
        self.current.as_ref().and_then(SupervisedProcess::id)
    }

    /// Stops the running server, if any, then starts `bundle`.
    ///
    /// Returns how the previous server ended.
    pub async fn restart(&mut self, bundle: &Bundle) -> anyhow::Result<Option<ShutdownOutcome>> {
        let previous = self.stop().await?;
        tracing::info!(bundle = %bundle.file_path.display(), "starting server process");
        let process = SupervisedProcess::spawn(
            &self.runtime,
            [bundle.file_path.as_os_str()],
            &self.cwd,
            &[("PORT", self.port.to_string())],
        )?;
        self.current = Some(process);
        Ok(previous)
    }

    /// Gracefully stops the running server, if any.
    pub async fn stop(&mut self) -> anyhow::Result<Option<ShutdownOutcome>> {
        let Some(mut process) = self.current.take() else {
            return Ok(None);
        };
        tracing::info!(pid = ?process.id(), "shutting down server process");
        let outcome = process.shutdown(self.grace).await?;
        tracing::debug!(?outcome, "server process stopped");
        Ok(Some(outcome))
    }
}

/// Opens `url` with the platform's default handler.
fn open_browser(url: &str) {
    let (program, args): (&str, Vec<&str>) = if cfg!(target_os = "macos") {
        ("open", vec![url])
    } else if cfg!(windows) {
        ("cmd", vec!["/C", "start", url])
    } else {
        ("xdg-open", vec![url])
    };
    let spawned = tokio::process::Command::new(program)
        .args(args)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn();
    if let Err(err) = spawned {
        tracing::warn!(%err, url, "could not open browser");
    }
}

fn report(pipeline: &str, message: String) {
    eprintln!(
        "  {:<12} {} {}",
        style(pipeline).cyan(),
        style("✗").red(),
        style(message).red()
    );
}

/// What the serve loop does with each build event.
///
/// Nothing here ends the session: failed builds and failed side effects are
/// reported and watching goes on.
pub struct ServeState {
    server: ServerSlot,
    public_dir: PathBuf,
    title: String,
    open_url: Option<String>,
}

impl ServeState {
    /// Creates the state. With `open_url` set, the browser is opened on the
    /// first successful browser build.
    pub fn new(server: ServerSlot, public_dir: &Path, title: impl Into<String>, open_url: Option<String>) -> Self {
        Self {
            server,
            public_dir: public_dir.to_path_buf(),
            title: title.into(),
            open_url,
        }
    }

    /// The server slot.
    pub fn server(&self) -> &ServerSlot {
        &self.server
    }

    /// Reports `event` and reacts to it.
    ///
    /// A server success restarts the server with the new bundle. A browser
    /// success rewrites the HTML shell.
    pub async fn handle(&mut self, event: &BuildEvent) {
        print_event(event);
        let BuildEvent::Success(success) = event else {
            return;
        };
        match success.pipeline.as_str() {
            "server" => {
                for bundle in &success.bundles {
                    if let Err(err) = self.server.restart(bundle).await {
                        report("server", format!("could not start: {}", err));
                    }
                }
            }
            "browser" => {
                if let Err(err) = launcher::write(&self.public_dir, &self.title) {
                    report("browser", format!("could not write {}: {}", launcher::LAUNCHER_FILE, err));
                }
                if let Some(url) = self.open_url.take() {
                    open_browser(&url);
                }
            }
            _ => {}
        }
    }

    /// Stops the server.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.server.stop().await?;
        Ok(())
    }
}

fn forward(
    tasks: &mut JoinSet<swiftly::Result<()>>,
    mut session: WatchSession,
    events: mpsc::UnboundedSender<BuildEvent>,
) {
    tasks.spawn(async move {
        while let Some(event) = session.next_event().await {
            if events.send(event).is_err() {
                break;
            }
        }
        session.finish().await
    });
}

/// Runs the serve command until interrupted or a pipeline hits an
/// unrecoverable error.
pub async fn run(port: Option<u16>, production: bool, development: bool, open: bool) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let project = Project::discover(&cwd)?;
    let mode = select_mode(production, development, project.config.build.mode, Mode::Development);
    let port = port.unwrap_or(project.config.serve.port);

    let store = VirtualFileStore::new();
    let pipelines = create_pipelines(&project, mode, Some(DevServerOptions { port }), &store)?;

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let mut forwarders = JoinSet::new();
    for pipeline in pipelines {
        forward(&mut forwarders, pipeline.watch()?, events_tx.clone());
    }
    drop(events_tx);

    let url = format!("http://localhost:{}/", port);
    println!(
        "{} {} {}",
        style("Serving").cyan(),
        style(project.name()).bold(),
        style(format!("({})", mode)).dim()
    );
    println!("{} {}", style("Server:").cyan(), style(&url).green().bold());
    println!("{} {}", style("Status:").cyan(), style("Watching for changes...").dim());
    println!();

    let server = ServerSlot::new(
        project.config.serve.runtime.clone(),
        &project.root,
        port,
        project.config.serve.grace_period(),
    );
    let state = ServeState::new(
        server,
        &project.public_dir(),
        project.name(),
        open.then(|| url.clone()),
    );

    drive(state, events_rx, forwarders, tokio::signal::ctrl_c()).await
}

/// Feeds build events to `state` until `stop` resolves, every pipeline is
/// done, or a pipeline fails with an unrecoverable error. The server is
/// stopped before returning.
pub async fn drive<F: Future>(
    mut state: ServeState,
    mut events: mpsc::UnboundedReceiver<BuildEvent>,
    mut forwarders: JoinSet<swiftly::Result<()>>,
    stop: F,
) -> anyhow::Result<()> {
    tokio::pin!(stop);
    let mut fatal: Option<anyhow::Error> = None;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                state.handle(&event).await;
            }
            Some(joined) = forwarders.join_next() => {
                let err = match joined {
                    Ok(Ok(())) => continue,
                    Ok(Err(err)) => anyhow::Error::from(err),
                    Err(err) if err.is_cancelled() => continue,
                    Err(err) => anyhow::Error::from(err),
                };
                report("watch", format!("stopped: {}", err));
                fatal = Some(err);
                break;
            }
            _ = &mut stop => {
                println!("\n{}", style("Stopping...").dim());
                break;
            }
        }
    }

    state.shutdown().await?;
    forwarders.shutdown().await;
    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
