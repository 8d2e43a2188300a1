// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Integration tests for one-shot builds and watch sessions.
//!
//! Each test lays out a small project in a temp directory and drives the
//! real pipelines over it.

use std::fs;
use std::path::{Path, PathBuf};

use swiftly::{BuildEvent, Mode, VirtualFileStore};
use swiftly_cli::commands::build::build_project;
use swiftly_cli::commands::create_pipelines;
use swiftly_cli::config::Project;
use swiftly_cli::pipeline::{Pipeline, CACHE_LEVELS};
use tempfile::{tempdir, TempDir};
use tokio::sync::mpsc;

/// Create a test project structure in a temp directory
fn setup_test_project(dir: &Path) {
    fs::create_dir_all(dir.join("src/pages/about")).unwrap();
    fs::write(dir.join("package.json"), r#"{"name": "demo-site"}"#).unwrap();

    fs::write(
        dir.join("src/browser.ts"),
        "import routes from \"swiftly!routes\";\nimport { mount } from \"./mount\";\nmount(routes);\n",
    )
    .unwrap();
    fs::write(
        dir.join("src/mount.ts"),
        "export function mount(routes) { console.log(routes.length); }\n",
    )
    .unwrap();
    fs::write(
        dir.join("src/server.ts"),
        "import routes from \"swiftly!routes\";\nimport http from \"http\";\nexport default routes;\n",
    )
    .unwrap();

    fs::write(dir.join("src/pages/index.tsx"), "export default () => \"HOME PAGE\";\n").unwrap();
    fs::write(dir.join("src/pages/about/team.tsx"), "export default () => \"TEAM PAGE\";\n").unwrap();
}

fn project() -> (TempDir, Project) {
    let dir = tempdir().unwrap();
    setup_test_project(dir.path());
    let project = Project::discover(dir.path()).unwrap();
    (dir, project)
}

fn take_pipeline(project: &Project, name: &str) -> Pipeline {
    let store = VirtualFileStore::new();
    create_pipelines(project, Mode::Development, None, &store)
        .unwrap()
        .into_iter()
        .find(|pipeline| pipeline.name() == name)
        .unwrap()
}

fn bundle_path(event: &BuildEvent) -> PathBuf {
    match event {
        BuildEvent::Success(success) => success.bundles[0].file_path.clone(),
        BuildEvent::Failure(failure) => panic!("build failed: {:?}", failure.diagnostics),
    }
}

#[tokio::test]
async fn test_build_writes_bundles_and_launcher() {
    let (_dir, project) = project();

    let (summary, events) = build_project(&project, Mode::Production).await.unwrap();
    assert!(summary.is_success(), "failures: {:?}", summary.failures);
    assert_eq!(summary.bundles, 2);
    assert_eq!(events.len(), 2);

    let browser = events.iter().find(|e| e.pipeline() == "browser").unwrap();
    let bundle = fs::read_to_string(bundle_path(browser)).unwrap();
    assert_eq!(bundle_path(browser), project.public_dir().join("browser.bundle.js"));
    assert!(bundle.starts_with("// swiftly browser bundle (production)"));
    assert!(bundle.contains("HOME PAGE"));
    assert!(bundle.contains("TEAM PAGE"));
    assert!(bundle.contains("path: \"/about/team\""));
    assert!(bundle.contains("export function mount"));

    let server = events.iter().find(|e| e.pipeline() == "server").unwrap();
    assert_eq!(bundle_path(server), project.output_dir().join("server.js"));

    let launcher = fs::read_to_string(project.public_dir().join("index.html")).unwrap();
    assert!(launcher.contains("<title>demo-site</title>"));
    assert!(launcher.contains("/browser.bundle.js"));
}

#[tokio::test]
async fn test_generated_route_table_is_never_on_disk() {
    let (_dir, project) = project();

    let (summary, _) = build_project(&project, Mode::Production).await.unwrap();
    assert!(summary.is_success());
    assert!(project.build_data_dir().is_dir());
    assert!(!project.routes_module().exists());
}

#[tokio::test]
async fn test_failed_pipeline_skips_launcher() {
    let (dir, project) = project();
    fs::remove_file(dir.path().join("src/browser.ts")).unwrap();

    let (summary, events) = build_project(&project, Mode::Production).await.unwrap();
    assert!(!summary.is_success());
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].pipeline, "browser");
    assert_eq!(
        summary.failures[0].diagnostics[0].message,
        "entry module not found"
    );

    let server = events.iter().find(|e| e.pipeline() == "server").unwrap();
    assert!(matches!(server, BuildEvent::Success(_)));
    assert!(!project.public_dir().join("index.html").exists());
}

#[tokio::test]
async fn test_unresolved_import_is_a_diagnostic() {
    let (dir, project) = project();
    fs::write(dir.path().join("src/server.ts"), "import \"./nowhere\";\n").unwrap();

    let mut pipeline = take_pipeline(&project, "server");
    match pipeline.run().await.unwrap() {
        BuildEvent::Failure(failure) => {
            assert_eq!(failure.pipeline, "server");
            assert_eq!(failure.diagnostics[0].message, "cannot resolve './nowhere'");
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_route_table_survives_cache_rotation() {
    let (_dir, project) = project();
    let mut pipeline = take_pipeline(&project, "browser");

    // Every pass rotates one level, so this wraps around more than once.
    for _ in 0..(CACHE_LEVELS * 2 + 1) {
        let event = pipeline.run().await.unwrap();
        let bundle = fs::read_to_string(bundle_path(&event)).unwrap();
        assert!(bundle.contains("path: \"/about/team\""));
    }
    assert!(pipeline.graph().contains(&project.routes_module()));
}

#[tokio::test]
async fn test_watch_session_rebuilds_in_order() {
    let (dir, project) = project();
    let server_entry = dir.path().join("src/server.ts");
    fs::write(&server_entry, "import { greet } from \"./greet\";\ngreet();\n").unwrap();

    let (disk_tx, disk_rx) = mpsc::unbounded_channel();
    let mut session = take_pipeline(&project, "server").watch_with(disk_rx);

    match session.next_event().await.unwrap() {
        BuildEvent::Failure(failure) => {
            assert_eq!(failure.diagnostics[0].message, "cannot resolve './greet'");
        }
        other => panic!("expected failure, got {:?}", other),
    }

    let greet = dir.path().join("src/greet.ts");
    fs::write(&greet, "export function greet() { return \"HELLO AGAIN\"; }\n").unwrap();
    disk_tx.send(vec![greet.clone()]).unwrap();

    let event = session.next_event().await.unwrap();
    let bundle = fs::read_to_string(bundle_path(&event)).unwrap();
    assert!(bundle.starts_with("// swiftly server bundle (development)"));
    assert!(bundle.contains("// module: "));
    assert!(bundle.contains("HELLO AGAIN"));

    fs::write(&greet, "export function greet() { return \"CHANGED\"; }\n").unwrap();
    disk_tx.send(vec![greet.clone()]).unwrap();
    let event = session.next_event().await.unwrap();
    let bundle = fs::read_to_string(bundle_path(&event)).unwrap();
    assert!(bundle.contains("CHANGED"));
    assert!(!bundle.contains("HELLO AGAIN"));

    drop(disk_tx);
    assert!(session.next_event().await.is_none());
    session.finish().await.unwrap();
}

#[tokio::test]
async fn test_watch_session_picks_up_new_pages() {
    let (dir, project) = project();
    let (disk_tx, disk_rx) = mpsc::unbounded_channel();
    let mut session = take_pipeline(&project, "browser").watch_with(disk_rx);

    let first = session.next_event().await.unwrap();
    let bundle = fs::read_to_string(bundle_path(&first)).unwrap();
    assert!(!bundle.contains("CONTACT PAGE"));

    let contact = dir.path().join("src/pages/contact.tsx");
    fs::write(&contact, "export default () => \"CONTACT PAGE\";\n").unwrap();
    disk_tx.send(vec![contact]).unwrap();

    let second = session.next_event().await.unwrap();
    let bundle = fs::read_to_string(bundle_path(&second)).unwrap();
    assert!(bundle.contains("CONTACT PAGE"));
    assert!(bundle.contains("path: \"/contact\""));
}
