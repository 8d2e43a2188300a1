// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Integration tests for graceful server shutdown.

#![cfg(unix)]

use std::path::Path;
use std::time::{Duration, Instant};

use swiftly_cli::supervisor::{ProcessState, SupervisedProcess, ShutdownOutcome};

fn sh(script: &str) -> SupervisedProcess {
    SupervisedProcess::spawn("sh", ["-c", script], Path::new("."), &[]).unwrap()
}

#[tokio::test]
async fn test_voluntary_exit_is_never_killed() {
    // Exits on its own shortly after the interrupt arrives.
    let mut process = sh("trap 'exit 3' INT; while true; do sleep 0.05; done");
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    let outcome = process.shutdown(Duration::from_secs(10)).await.unwrap();

    assert!(!outcome.was_killed(), "unexpected kill: {:?}", outcome);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(process.state(), ProcessState::Terminated);
}

#[tokio::test]
async fn test_process_ignoring_interrupt_is_killed_after_grace() {
    let mut process = sh("trap '' INT; exec sleep 30");
    tokio::time::sleep(Duration::from_millis(200)).await;

    let grace = Duration::from_millis(500);
    let outcome = process.shutdown(grace).await.unwrap();

    match outcome {
        ShutdownOutcome::Killed { elapsed } => assert!(elapsed >= grace),
        other => panic!("expected kill, got {:?}", other),
    }
    assert_eq!(process.state(), ProcessState::Terminated);
    assert!(process.try_wait().unwrap().is_some());
}

#[tokio::test]
async fn test_second_shutdown_reports_already_exited() {
    let mut process = sh("exec sleep 30");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let first = process.shutdown(Duration::from_secs(5)).await.unwrap();
    assert!(matches!(first, ShutdownOutcome::Exited { .. }));

    let second = process.shutdown(Duration::from_secs(5)).await.unwrap();
    assert_eq!(second, ShutdownOutcome::AlreadyExited);
}
