// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Bundler pipelines.
//!
//! A [`Pipeline`] owns one bundler instance for one target. Each build pass:
//!
//! 1. rotates the cache levels and syncs virtual file timestamps into the
//!    timestamp table
//! 2. regenerates the route table from the pages root
//! 3. walks the module graph from the entry through the cached filesystem
//! 4. writes every reachable module into a single bundle file
//!
//! Imports are resolved in order: plugin-owned specifiers (`swiftly!routes`),
//! then relative and absolute paths with extension probing. Bare specifiers
//! are left external.
//!
//! [`Pipeline::watch`] turns a pipeline into a [`WatchSession`] that rebuilds
//! on disk changes and delivers one [`BuildEvent`] per pass, in pass order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Instant, SystemTime};

use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use swiftly::stats::epoch_millis;
use swiftly::watch::{DirectoryWatcher, FileWatcher};
use swiftly::{
    find_watchers, BuildEvent, BuildFailure, BuildSuccess, BuildTargetConfig, Bundle,
    BundlerVersion, CachedInputFileSystem, Compiler, Diagnostic, FileTimestamps,
    IgnoringFileSystem, IgnoringWatchFileSystem, InputFileSystem, RegistryWatchFileSystem,
    StorageShape, SwiftlyError, Target, VirtualFileStore, VirtualModules, WatchChange,
    WatchFileSystem,
};

use crate::config::Project;
use crate::launcher::BROWSER_BUNDLE;
use crate::watcher::{ChangeFilter, DiskWatcher};

/// Number of levels in the indexed cache shape.
pub const CACHE_LEVELS: usize = 9;

/// File name of the server bundle.
pub const SERVER_BUNDLE: &str = "server.js";

/// Project-wide settings shared by every pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Directory relative paths resolve against.
    pub context: PathBuf,
    /// Pages root scanned for routes.
    pub pages_dir: PathBuf,
    /// Path of the generated route table module.
    pub routes_module: PathBuf,
    /// Extensions probed when resolving imports, in order.
    pub extensions: Vec<String>,
    /// Glob patterns hidden from the input filesystem.
    pub ignored: Vec<String>,
    /// Glob patterns whose disk changes never trigger a rebuild.
    pub watch_ignored: Vec<String>,
    /// Shape of the bundler's internals.
    pub version: BundlerVersion,
}

impl PipelineOptions {
    /// Options for a discovered project.
    pub fn for_project(project: &Project) -> Self {
        let output = project.output_dir();
        let ignored = vec![
            "**/node_modules/**".to_string(),
            "**/.git/**".to_string(),
            format!("{}/**", output.display()),
        ];
        let mut watch_ignored = ignored.clone();
        watch_ignored.push(format!("{}/**", project.data_dir().display()));

        Self {
            context: project.root.clone(),
            pages_dir: project.pages_dir(),
            routes_module: project.routes_module(),
            extensions: project.config.build.extensions.clone(),
            ignored,
            watch_ignored,
            version: BundlerVersion::Current,
        }
    }
}

fn glob_set(patterns: &[String]) -> swiftly::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            SwiftlyError::Configuration(format!("invalid ignore pattern '{}': {}", pattern, e))
        })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| SwiftlyError::Configuration(format!("invalid ignore patterns: {}", e)))
}

/// The bundler internals one pipeline exposes to its plugin.
struct PipelineCompiler {
    name: String,
    context: PathBuf,
    version: BundlerVersion,
    input: Box<dyn InputFileSystem>,
    watch: Option<Box<dyn WatchFileSystem>>,
    timestamps: FileTimestamps,
}

impl Compiler for PipelineCompiler {
    fn name(&self) -> &str {
        &self.name
    }

    fn context(&self) -> &Path {
        &self.context
    }

    fn version(&self) -> BundlerVersion {
        self.version
    }

    fn input_file_system(&mut self) -> &mut dyn InputFileSystem {
        self.input.as_mut()
    }

    fn watch_file_system(&mut self) -> Option<&mut dyn WatchFileSystem> {
        match self.watch.as_mut() {
            Some(watch) => Some(watch.as_mut()),
            None => None,
        }
    }

    fn file_timestamps(&mut self) -> Option<&mut FileTimestamps> {
        Some(&mut self.timestamps)
    }
}

enum Resolution {
    File(PathBuf),
    External,
    Missing,
}

fn import_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"(?m)(?:^|[;\s])(?:import|export)\s+(?:[\w*${}\s,]+\s+from\s+)?["']([^"'\n]+)["']|\bimport\(\s*["']([^"'\n]+)["']\s*\)|\brequire\(\s*["']([^"'\n]+)["']\s*\)"#,
        )
        .expect("import pattern is valid")
    })
}

/// Import specifiers of a module, in source order.
pub fn import_specifiers(source: &str) -> Vec<String> {
    import_pattern()
        .captures_iter(source)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Resolves `.` and `..` segments without touching the disk.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// One bundler instance for one target.
pub struct Pipeline {
    config: BuildTargetConfig,
    extensions: Vec<String>,
    watch_ignored: GlobSet,
    compiler: PipelineCompiler,
    plugin: VirtualModules,
    graph: Vec<PathBuf>,
    directories: HashMap<PathBuf, Arc<Mutex<DirectoryWatcher>>>,
    seen_timestamps: HashMap<PathBuf, u64>,
}

impl Pipeline {
    /// Builds a pipeline and attaches the virtual-modules plugin to it.
    ///
    /// Fails with a configuration error if the plugin cannot hook into the
    /// pipeline's filesystem.
    pub fn new(
        config: BuildTargetConfig,
        options: PipelineOptions,
        store: VirtualFileStore,
    ) -> swiftly::Result<Self> {
        let shape = match options.version {
            BundlerVersion::Current => StorageShape::Indexed {
                levels: CACHE_LEVELS,
            },
            BundlerVersion::Legacy => StorageShape::Flat,
        };
        let input = IgnoringFileSystem::new(
            Box::new(CachedInputFileSystem::new(shape)),
            glob_set(&options.ignored)?,
        );

        let mut compiler = PipelineCompiler {
            name: config.target.as_str().to_string(),
            context: options.context.clone(),
            version: options.version,
            input: Box::new(input),
            watch: None,
            timestamps: FileTimestamps::new(),
        };
        let mut plugin = VirtualModules::new(store, &options.pages_dir, &options.routes_module);
        plugin.attach(&mut compiler)?;

        tracing::debug!(
            pipeline = config.target.as_str(),
            mode = %config.mode,
            entry = %config.entry.display(),
            "created pipeline"
        );
        Ok(Self {
            config,
            extensions: options.extensions,
            watch_ignored: glob_set(&options.watch_ignored)?,
            compiler,
            plugin,
            graph: Vec::new(),
            directories: HashMap::new(),
            seen_timestamps: HashMap::new(),
        })
    }

    /// Pipeline name (`browser` or `server`).
    pub fn name(&self) -> &str {
        self.config.target.as_str()
    }

    /// The configuration this pipeline was built from.
    pub fn config(&self) -> &BuildTargetConfig {
        &self.config
    }

    /// The virtual-modules plugin attached to this pipeline.
    pub fn plugin(&self) -> &VirtualModules {
        &self.plugin
    }

    /// Modules included by the last successful pass, entry first.
    pub fn graph(&self) -> &[PathBuf] {
        &self.graph
    }

    /// Path the bundle is written to.
    pub fn output_file(&self) -> PathBuf {
        let name = match self.config.target {
            Target::Browser => BROWSER_BUNDLE,
            Target::Server => SERVER_BUNDLE,
        };
        self.config.output_dir.join(name)
    }

    /// Writes a virtual module into this pipeline.
    pub fn write_module(&mut self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) -> swiftly::Result<PathBuf> {
        self.plugin.write_module(&mut self.compiler, path, content)
    }

    /// Runs one build pass to completion.
    pub async fn run(&mut self) -> swiftly::Result<BuildEvent> {
        tokio::task::yield_now().await;
        self.build_once()
    }

    /// Runs one build pass.
    ///
    /// Diagnostics come back as [`BuildEvent::Failure`]. Only errors that make
    /// further passes pointless, such as an incompatible filesystem, are
    /// returned as `Err`.
    pub fn build_once(&mut self) -> swiftly::Result<BuildEvent> {
        let started = Instant::now();
        // One level per pass; entries untouched for a full rotation are re-read.
        self.compiler.input.tick()?;
        self.plugin.watch_run(&mut self.compiler);
        let changed = self.changed_since_last_pass();
        tracing::debug!(pipeline = self.name(), changed, "build pass started");

        match self.compile() {
            Ok(bundle) => Ok(BuildEvent::Success(BuildSuccess {
                pipeline: self.name().to_string(),
                bundles: vec![bundle],
                build_time: started.elapsed(),
            })),
            Err(SwiftlyError::Build(failure)) => Ok(BuildEvent::Failure(failure)),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => Ok(BuildEvent::Failure(BuildFailure {
                pipeline: self.name().to_string(),
                diagnostics: vec![Diagnostic::new(err.to_string())],
            })),
        }
    }

    fn changed_since_last_pass(&mut self) -> usize {
        let mut changed = 0;
        for (path, timestamp) in &self.compiler.timestamps {
            let millis = timestamp.millis();
            if self.seen_timestamps.insert(path.clone(), millis) != Some(millis) {
                changed += 1;
            }
        }
        changed
    }

    fn failure(&self, diagnostics: Vec<Diagnostic>) -> SwiftlyError {
        SwiftlyError::Build(BuildFailure {
            pipeline: self.name().to_string(),
            diagnostics,
        })
    }

    fn compile(&mut self) -> swiftly::Result<Bundle> {
        let table = self.plugin.compilation(&mut self.compiler)?;
        tracing::debug!(pipeline = self.name(), routes = table.len(), "route table injected");

        let entry = self.config.entry.clone();
        let entry = match self.probe(&entry) {
            Some(path) => path,
            None => {
                return Err(self.failure(vec![
                    Diagnostic::new("entry module not found").with_file(entry)
                ]))
            }
        };

        let mut diagnostics = Vec::new();
        let mut modules: Vec<(PathBuf, String)> = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([entry.clone()]);

        while let Some(path) = queue.pop_front() {
            if !seen.insert(path.clone()) {
                continue;
            }
            let source = match self.compiler.input.read_file(&path) {
                Ok(content) => String::from_utf8_lossy(&content).into_owned(),
                Err(err) => {
                    diagnostics.push(
                        Diagnostic::new(format!("cannot read module: {}", err)).with_file(&path),
                    );
                    continue;
                }
            };
            for specifier in import_specifiers(&source) {
                match self.resolve_import(&specifier, &path) {
                    Resolution::File(resolved) => queue.push_back(resolved),
                    Resolution::External => {}
                    Resolution::Missing => diagnostics.push(
                        Diagnostic::new(format!("cannot resolve '{}'", specifier)).with_file(&path),
                    ),
                }
            }
            modules.push((path, source));
        }

        if !diagnostics.is_empty() {
            return Err(self.failure(diagnostics));
        }

        let file_path = self.emit(&entry, &modules)?;
        self.graph = modules.into_iter().map(|(path, _)| path).collect();
        Ok(Bundle {
            entry,
            file_path,
            modules: self.graph.len(),
        })
    }

    fn resolve_import(&mut self, specifier: &str, from: &Path) -> Resolution {
        if let Some(path) = self.plugin.resolve(specifier) {
            return Resolution::File(path);
        }
        let base = if specifier.starts_with('/') {
            PathBuf::from(specifier)
        } else if specifier.starts_with("./") || specifier.starts_with("../") {
            from.parent().unwrap_or(Path::new("/")).join(specifier)
        } else {
            return Resolution::External;
        };
        match self.probe(&normalize(&base)) {
            Some(path) => Resolution::File(path),
            None => Resolution::Missing,
        }
    }

    /// Finds the file a module path refers to: the path itself, the path with
    /// each extension appended, then an `index` file inside it.
    fn probe(&mut self, base: &Path) -> Option<PathBuf> {
        let mut candidates = vec![base.to_path_buf()];
        for ext in &self.extensions {
            let mut with_ext = base.as_os_str().to_os_string();
            with_ext.push(".");
            with_ext.push(ext);
            candidates.push(PathBuf::from(with_ext));
        }
        for ext in &self.extensions {
            candidates.push(base.join(format!("index.{}", ext)));
        }

        let input = self.compiler.input.as_mut();
        candidates
            .into_iter()
            .find(|candidate| matches!(input.stat(candidate), Ok(stat) if stat.is_file()))
    }

    fn emit(&self, entry: &Path, modules: &[(PathBuf, String)]) -> swiftly::Result<PathBuf> {
        let mut out = format!(
            "// swiftly {} bundle ({})\n// entry: {}\n",
            self.name(),
            self.config.mode,
            entry.display()
        );
        // Dependencies before their importers.
        for (path, source) in modules.iter().rev() {
            out.push('\n');
            if self.config.mode == swiftly::Mode::Development {
                out.push_str(&format!("// module: {}\n", path.display()));
            }
            out.push_str(source);
            if !source.ends_with('\n') {
                out.push('\n');
            }
        }

        let file_path = self.output_file();
        fs::create_dir_all(&self.config.output_dir)?;
        fs::write(&file_path, out)?;
        tracing::debug!(pipeline = self.name(), path = %file_path.display(), "wrote bundle");
        Ok(file_path)
    }

    fn register_watchers(&mut self, changes: &mpsc::UnboundedSender<WatchChange>) {
        let mut watched: Vec<PathBuf> = self.graph.clone();
        watched.extend(self.plugin.store().snapshot().into_iter().map(|f| f.path));

        let Some(registry) = self.compiler.watch_file_system().and_then(find_watchers) else {
            return;
        };
        for path in watched {
            if registry.get(&path).is_some() {
                continue;
            }
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            let directory = self
                .directories
                .entry(dir)
                .or_insert_with(|| Arc::new(Mutex::new(DirectoryWatcher::default())))
                .clone();
            registry.watch(FileWatcher::new(path, directory, changes.clone()));
        }
    }

    fn apply_disk_changes(&mut self, paths: &[PathBuf]) -> swiftly::Result<()> {
        for path in paths {
            let mtime = fs::metadata(path)
                .and_then(|m| m.modified())
                .unwrap_or_else(|_| SystemTime::now());
            let mtime = epoch_millis(mtime);
            let timestamp = self.compiler.version.timestamp(mtime);
            self.compiler.timestamps.insert(path.clone(), timestamp);

            if let Some(registry) = self.compiler.watch_file_system().and_then(find_watchers) {
                if let Some(watcher) = registry.get(path) {
                    watcher.emit_change(mtime, false);
                }
            }
        }
        self.compiler.input.purge()
    }

    /// Starts a watch session driven by a debounced disk watcher on the
    /// pipeline's context directory.
    pub fn watch(self) -> anyhow::Result<WatchSession> {
        let (disk_tx, disk_rx) = mpsc::unbounded_channel();
        let filter = ChangeFilter::new(self.extensions.clone(), self.watch_ignored.clone());
        let disk = DiskWatcher::new(&self.compiler.context, filter, disk_tx)?;
        let mut session = self.watch_with(disk_rx);
        session.disk = Some(disk);
        Ok(session)
    }

    /// Starts a watch session fed by `disk_changes`. The session ends when
    /// the sender side is dropped.
    pub fn watch_with(mut self, disk_changes: mpsc::UnboundedReceiver<Vec<PathBuf>>) -> WatchSession {
        let ignored = self.watch_ignored.clone();
        self.compiler.watch = Some(Box::new(IgnoringWatchFileSystem::new(
            Box::new(RegistryWatchFileSystem::new()),
            ignored,
        )));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.watch_loop(disk_changes, events_tx));
        WatchSession {
            events: events_rx,
            task: Some(task),
            disk: None,
        }
    }

    async fn watch_loop(
        mut self,
        mut disk_changes: mpsc::UnboundedReceiver<Vec<PathBuf>>,
        events: mpsc::UnboundedSender<BuildEvent>,
    ) -> swiftly::Result<()> {
        let (changes_tx, mut changes_rx) = mpsc::unbounded_channel::<WatchChange>();

        loop {
            let event = self.build_once()?;
            self.register_watchers(&changes_tx);

            // Writes made by this pass notify our own watchers.
            let mut synthetic = 0;
            while let Ok(change) = changes_rx.try_recv() {
                if change.synthetic {
                    synthetic += 1;
                }
            }
            tracing::trace!(pipeline = self.name(), synthetic, "drained own changes");

            if events.send(event).is_err() {
                return Ok(());
            }

            let Some(mut batch) = disk_changes.recv().await else {
                return Ok(());
            };
            while let Ok(more) = disk_changes.try_recv() {
                batch.extend(more);
            }
            batch.sort();
            batch.dedup();
            tracing::debug!(pipeline = self.name(), files = batch.len(), "rebuilding after change");
            self.apply_disk_changes(&batch)?;
        }
    }
}

/// A running watch session.
///
/// Dropping the session stops watching.
pub struct WatchSession {
    events: mpsc::UnboundedReceiver<BuildEvent>,
    task: Option<JoinHandle<swiftly::Result<()>>>,
    disk: Option<DiskWatcher>,
}

impl WatchSession {
    /// The next build event, or `None` once the session ended.
    pub async fn next_event(&mut self) -> Option<BuildEvent> {
        self.events.recv().await
    }

    /// Waits for the session to end and returns why it ended.
    pub async fn finish(mut self) -> swiftly::Result<()> {
        self.disk = None;
        match self.task.take() {
            Some(task) => match task.await {
                Ok(result) => result,
                Err(err) if err.is_cancelled() => Ok(()),
                Err(err) => Err(SwiftlyError::Io(std::io::Error::other(err.to_string()))),
            },
            None => Ok(()),
        }
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_specifiers() {
        let source = r#"
import page0 from "/app/src/pages/index"
import { a, b } from './lib/util';
import * as ns from "../shared"
import './styles.css'
export { c } from "./c"
export default [];
const lazy = import("./lazy");
const legacy = require('./legacy');
import routes from "swiftly!routes";
"#;
        assert_eq!(
            import_specifiers(source),
            vec![
                "/app/src/pages/index",
                "./lib/util",
                "../shared",
                "./styles.css",
                "./c",
                "./lazy",
                "./legacy",
                "swiftly!routes",
            ]
        );
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/app/src/./a/../b.ts")), PathBuf::from("/app/src/b.ts"));
        assert_eq!(normalize(Path::new("/app/../../x")), PathBuf::from("/x"));
    }
}
