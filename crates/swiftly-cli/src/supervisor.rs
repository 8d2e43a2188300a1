// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Supervision of the spawned server process.
//!
//! Shutdown is graceful first: the process receives an interrupt and gets a
//! grace period to exit on its own. Only if it is still alive when the grace
//! period elapses is it killed. The wait ends the moment the process exits,
//! so a voluntary exit never leads to a kill.

use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};

/// Default wait between interrupt and forced kill.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(5000);

/// Lifecycle of a supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Spawned and not asked to stop.
    Running,
    /// Interrupted, waiting for exit.
    ShuttingDown,
    /// Exited or killed.
    Terminated,
}

/// How a shutdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The process had already exited before shutdown started.
    AlreadyExited,
    /// The process exited within the grace period.
    Exited {
        /// Exit code, if the process was not ended by a signal.
        code: Option<i32>,
        /// Time from interrupt to exit.
        elapsed: Duration,
    },
    /// The grace period elapsed and the process was killed.
    Killed {
        /// Time from interrupt to kill.
        elapsed: Duration,
    },
}

impl ShutdownOutcome {
    /// Returns true if the process had to be killed.
    pub fn was_killed(&self) -> bool {
        matches!(self, ShutdownOutcome::Killed { .. })
    }
}

/// A child process with a graceful shutdown contract.
#[derive(Debug)]
pub struct SupervisedProcess {
    child: Child,
    state: ProcessState,
}

impl SupervisedProcess {
    /// Spawns `program` with the terminal's standard streams.
    ///
    /// The child is killed if the handle is dropped while it still runs.
    pub fn spawn<I, S>(program: &str, args: I, cwd: &Path, envs: &[(&str, String)]) -> io::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        for (key, value) in envs {
            cmd.env(key, value);
        }

        let child = cmd.spawn()?;
        tracing::debug!(program, pid = ?child.id(), "spawned process");
        Ok(Self::from_child(child))
    }

    /// Supervises an already spawned child.
    pub fn from_child(child: Child) -> Self {
        Self {
            child,
            state: ProcessState::Running,
        }
    }

    /// OS process id, while the process runs.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Checks for exit without blocking.
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        let status = self.child.try_wait()?;
        if status.is_some() {
            self.state = ProcessState::Terminated;
        }
        Ok(status)
    }

    #[cfg(unix)]
    fn interrupt(&mut self) -> io::Result<()> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        match kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
            // Exited between the check and the signal.
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }

    #[cfg(not(unix))]
    fn interrupt(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    /// Interrupts the process and waits up to `grace` for it to exit, then
    /// kills it.
    pub async fn shutdown(&mut self, grace: Duration) -> io::Result<ShutdownOutcome> {
        if self.state == ProcessState::Terminated || self.try_wait()?.is_some() {
            return Ok(ShutdownOutcome::AlreadyExited);
        }

        self.state = ProcessState::ShuttingDown;
        let started = Instant::now();
        self.interrupt()?;

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                self.state = ProcessState::Terminated;
                tracing::debug!(code = ?status.code(), "process exited after interrupt");
                Ok(ShutdownOutcome::Exited {
                    code: status.code(),
                    elapsed: started.elapsed(),
                })
            }
            Err(_) => {
                tracing::warn!(grace_ms = grace.as_millis() as u64, "process ignored interrupt, killing");
                self.child.kill().await?;
                self.state = ProcessState::Terminated;
                Ok(ShutdownOutcome::Killed {
                    elapsed: started.elapsed(),
                })
            }
        }
    }
}
