// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! The virtual-modules plugin.
//!
//! A pipeline drives [`VirtualModules`] through four hooks:
//!
//! 1. [`attach`](VirtualModules::attach) once the bundler's filesystem stack
//!    exists. The storage shape is detected here and the virtual-file
//!    capability is installed on the base layer.
//! 2. [`watch_run`](VirtualModules::watch_run) before every incremental pass.
//! 3. [`compilation`](VirtualModules::compilation) when a pass starts building
//!    its graph. The pages root is scanned and the route table is injected.
//! 4. [`resolve`](VirtualModules::resolve) while resolving imports.
//!
//! [`write_module`](VirtualModules::write_module) can be called at any time
//! after attaching.

use std::path::{Path, PathBuf};

use crate::compiler::Compiler;
use crate::error::{Result, SwiftlyError};
use crate::fs::{find_base_layer, Overlay};
use crate::propagate;
use crate::routes::{FsScanner, RouteTable};
use crate::storage::StorageShim;
use crate::store::{VirtualFile, VirtualFileStore};
use crate::watch::{find_watchers, sync_timestamps};

/// Import specifier resolved to the generated route table.
pub const ROUTES_SPECIFIER: &str = "swiftly!routes";

#[derive(Debug, Clone)]
struct Attachment {
    shim: StorageShim,
    context: PathBuf,
}

/// Injects virtual modules into one bundler pipeline.
#[derive(Debug)]
pub struct VirtualModules {
    store: VirtualFileStore,
    pages_dir: PathBuf,
    routes_module: PathBuf,
    attachment: Option<Attachment>,
}

impl VirtualModules {
    /// Creates a plugin scanning `pages_dir` and writing the route table to
    /// `routes_module`. Relative paths are resolved against the bundler's
    /// context on attach.
    pub fn new(
        store: VirtualFileStore,
        pages_dir: impl Into<PathBuf>,
        routes_module: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            pages_dir: pages_dir.into(),
            routes_module: routes_module.into(),
            attachment: None,
        }
    }

    /// The registry of every file written through this plugin.
    pub fn store(&self) -> &VirtualFileStore {
        &self.store
    }

    /// Returns true once [`attach`](Self::attach) succeeded.
    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    fn absolutize(context: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            context.join(path)
        }
    }

    /// Absolute path of the generated route table module.
    pub fn routes_module_path(&self) -> Option<PathBuf> {
        self.attachment
            .as_ref()
            .map(|a| Self::absolutize(&a.context, &self.routes_module))
    }

    /// Hooks the plugin into `compiler`'s input filesystem.
    ///
    /// The virtual-file capability is installed on the base layer the first
    /// time any plugin attaches to it. Later attachments reuse the installed
    /// shim and registry, so purges keep restoring every virtual file.
    pub fn attach(&mut self, compiler: &mut dyn Compiler) -> Result<()> {
        let name = compiler.name().to_string();
        let context = compiler.context().to_path_buf();
        let base = find_base_layer(compiler.input_file_system())?;
        let access = base.raw_access().ok_or_else(|| {
            SwiftlyError::Configuration(
                "base filesystem layer exposes no raw-write capability".to_string(),
            )
        })?;
        let mut storage = access.storage;
        let overlay = access.overlay;

        let shim = match overlay.clone() {
            Some(installed) => {
                if !installed.store.same_store(&self.store) {
                    for file in self.store.snapshot() {
                        installed.store.insert(file);
                    }
                    self.store = installed.store.clone();
                }
                tracing::debug!(compiler = %name, "reusing installed overlay");
                installed.shim
            }
            None => {
                let shim = StorageShim::detect(&mut storage)?;
                *overlay = Some(Overlay {
                    store: self.store.clone(),
                    shim,
                });
                tracing::debug!(compiler = %name, shape = ?shim.shape(), "installed virtual file overlay");
                shim
            }
        };

        self.attachment = Some(Attachment { shim, context });
        Ok(())
    }

    /// Writes a virtual module.
    ///
    /// The file is registered, injected into the base layer's caches and
    /// listed in every ancestor directory. In a watch session, a watcher for
    /// the path is notified with a synthetic change. Writing the same path
    /// again replaces the earlier content and stats.
    pub fn write_module(
        &self,
        compiler: &mut dyn Compiler,
        path: impl AsRef<Path>,
        content: impl Into<Vec<u8>>,
    ) -> Result<PathBuf> {
        let attachment = self.attachment.as_ref().ok_or_else(|| {
            SwiftlyError::Initialization(
                "virtual module written before the bundler was attached".to_string(),
            )
        })?;
        let path = Self::absolutize(&attachment.context, path.as_ref());
        let file = VirtualFile::new(path.clone(), content.into());
        tracing::debug!(path = %path.display(), size = file.content.len(), "write virtual module");

        self.store.insert(file.clone());
        let base = find_base_layer(compiler.input_file_system())?;
        propagate::inject(base, &attachment.shim, &file)?;

        if let Some(registry) = compiler.watch_file_system().and_then(find_watchers) {
            if let Some(watcher) = registry.get(&path) {
                let mtime = file.stats.mtime_ms();
                tracing::debug!(path = %path.display(), mtime, "emit file change");
                watcher.emit_change(mtime, true);
            }
        }
        Ok(path)
    }

    /// Copies virtual file timestamps into the bundler's timestamp table.
    /// Runs before every incremental pass.
    pub fn watch_run(&self, compiler: &mut dyn Compiler) {
        let version = compiler.version();
        if let Some(timestamps) = compiler.file_timestamps() {
            sync_timestamps(&self.store, version, timestamps);
            tracing::trace!(count = self.store.len(), "synced virtual file timestamps");
        }
    }

    /// Scans the pages root and injects the route table module.
    pub fn compilation(&self, compiler: &mut dyn Compiler) -> Result<RouteTable> {
        let attachment = self.attachment.as_ref().ok_or_else(|| {
            SwiftlyError::Initialization(
                "compilation started before the bundler was attached".to_string(),
            )
        })?;
        let pages_dir = Self::absolutize(&attachment.context, &self.pages_dir);
        let routes_module = Self::absolutize(&attachment.context, &self.routes_module);

        let table = {
            let mut scanner = FsScanner(compiler.input_file_system());
            RouteTable::from_scan(&mut scanner, &pages_dir)?
        };
        let source = table.to_module_source()?;
        self.write_module(compiler, routes_module, source)?;
        Ok(table)
    }

    /// Resolves plugin-owned specifiers. Anything else is left to the
    /// pipeline's resolver.
    pub fn resolve(&self, specifier: &str) -> Option<PathBuf> {
        if specifier == ROUTES_SPECIFIER {
            self.routes_module_path()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::BundlerVersion;
    use crate::fs::{CachedInputFileSystem, IgnoringFileSystem, InputFileSystem};
    use crate::storage::StorageShape;
    use crate::watch::{
        DirectoryWatcher, FileTimestamp, FileTimestamps, FileWatcher, IgnoringWatchFileSystem,
        RegistryWatchFileSystem, WatchFileSystem,
    };
    use globset::GlobSetBuilder;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct TestCompiler {
        context: PathBuf,
        version: BundlerVersion,
        input: Box<dyn InputFileSystem>,
        watch: Option<Box<dyn WatchFileSystem>>,
        timestamps: FileTimestamps,
    }

    impl TestCompiler {
        fn new(context: &Path, shape: StorageShape) -> Self {
            let empty = GlobSetBuilder::new().build().unwrap();
            Self {
                context: context.to_path_buf(),
                version: BundlerVersion::Current,
                input: Box::new(IgnoringFileSystem::new(
                    Box::new(CachedInputFileSystem::new(shape)),
                    empty,
                )),
                watch: None,
                timestamps: FileTimestamps::new(),
            }
        }
    }

    impl Compiler for TestCompiler {
        fn name(&self) -> &str {
            "test"
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

    fn plugin() -> VirtualModules {
        VirtualModules::new(
            VirtualFileStore::new(),
            "src/pages",
            ".swiftly-data/build/routes.js",
        )
    }

    #[test]
    fn test_write_before_attach_fails() {
        let dir = TempDir::new().unwrap();
        let mut compiler = TestCompiler::new(dir.path(), StorageShape::Flat);
        let err = plugin()
            .write_module(&mut compiler, "a.js", "x")
            .unwrap_err();
        assert!(matches!(err, SwiftlyError::Initialization(_)));
    }

    #[test]
    fn test_written_module_is_readable_and_listed() {
        let dir = TempDir::new().unwrap();
        let mut compiler = TestCompiler::new(dir.path(), StorageShape::Indexed { levels: 9 });
        let mut plugin = plugin();
        plugin.attach(&mut compiler).unwrap();

        let path = plugin
            .write_module(&mut compiler, "gen/answer.js", "export default 42")
            .unwrap();
        assert_eq!(path, dir.path().join("gen/answer.js"));

        let fs = compiler.input_file_system();
        assert_eq!(&*fs.read_file(&path).unwrap(), b"export default 42");
        assert_eq!(fs.read_dir(&dir.path().join("gen")).unwrap(), vec!["answer.js"]);
        assert!(!path.exists());
    }

    #[test]
    fn test_last_write_wins_without_duplicates() {
        let dir = TempDir::new().unwrap();
        let mut compiler = TestCompiler::new(dir.path(), StorageShape::Flat);
        let mut plugin = plugin();
        plugin.attach(&mut compiler).unwrap();

        plugin.write_module(&mut compiler, "v/a.js", "1").unwrap();
        let path = plugin.write_module(&mut compiler, "v/a.js", "2").unwrap();

        let fs = compiler.input_file_system();
        assert_eq!(&*fs.read_file(&path).unwrap(), b"2");
        assert_eq!(fs.read_dir(&dir.path().join("v")).unwrap(), vec!["a.js"]);
        assert_eq!(plugin.store().len(), 1);
    }

    #[test]
    fn test_virtual_modules_survive_purge() {
        let dir = TempDir::new().unwrap();
        let mut compiler = TestCompiler::new(dir.path(), StorageShape::Indexed { levels: 3 });
        let mut plugin = plugin();
        plugin.attach(&mut compiler).unwrap();
        let path = plugin.write_module(&mut compiler, "v/a.js", "kept").unwrap();

        let fs = compiler.input_file_system();
        fs.purge().unwrap();
        assert_eq!(&*fs.read_file(&path).unwrap(), b"kept");
        assert_eq!(fs.read_dir(&dir.path().join("v")).unwrap(), vec!["a.js"]);
    }

    #[test]
    fn test_virtual_modules_survive_level_rotation() {
        let dir = TempDir::new().unwrap();
        let mut compiler = TestCompiler::new(dir.path(), StorageShape::Indexed { levels: 2 });
        let mut plugin = plugin();
        plugin.attach(&mut compiler).unwrap();
        let deep = plugin.write_module(&mut compiler, "gen/deep/a.js", "a").unwrap();

        compiler.input_file_system().tick().unwrap();
        plugin.write_module(&mut compiler, "gen/b.js", "b").unwrap();

        let fs = compiler.input_file_system();
        for _ in 0..3 {
            fs.tick().unwrap();
        }
        assert_eq!(&*fs.read_file(&deep).unwrap(), b"a");
        assert_eq!(&*fs.read_file(&dir.path().join("gen/b.js")).unwrap(), b"b");
        assert_eq!(fs.read_dir(&dir.path().join("gen")).unwrap(), vec!["b.js", "deep"]);
        assert_eq!(fs.read_dir(&dir.path().join("gen/deep")).unwrap(), vec!["a.js"]);
        assert!(fs.stat(&dir.path().join("gen/deep")).unwrap().is_directory());
    }

    #[test]
    fn test_second_attach_reuses_overlay() {
        let dir = TempDir::new().unwrap();
        let mut compiler = TestCompiler::new(dir.path(), StorageShape::Flat);
        let mut first = plugin();
        first.attach(&mut compiler).unwrap();
        let mut second = plugin();
        second.attach(&mut compiler).unwrap();

        assert!(first.store().same_store(second.store()));
        second.write_module(&mut compiler, "b.js", "b").unwrap();
        assert!(first.store().contains(&dir.path().join("b.js")));
    }

    #[test]
    fn test_watch_run_copies_timestamps() {
        let dir = TempDir::new().unwrap();
        let mut compiler = TestCompiler::new(dir.path(), StorageShape::Flat);
        compiler.version = BundlerVersion::Legacy;
        let mut plugin = plugin();
        plugin.attach(&mut compiler).unwrap();
        let path = plugin.write_module(&mut compiler, "a.js", "a").unwrap();

        plugin.watch_run(&mut compiler);
        let expected = plugin.store().get(&path).unwrap().stats.mtime_ms();
        assert_eq!(compiler.timestamps.get(&path), Some(&FileTimestamp::Plain(expected)));
    }

    #[test]
    fn test_write_notifies_active_watcher() {
        let dir = TempDir::new().unwrap();
        let mut compiler = TestCompiler::new(dir.path(), StorageShape::Flat);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let directory = Arc::new(Mutex::new(DirectoryWatcher::default()));
        directory.lock().unwrap().record(&dir.path().join("a.js"), 1);

        let mut base = RegistryWatchFileSystem::new();
        base.watchers_mut().unwrap().watch(FileWatcher::new(
            dir.path().join("a.js"),
            Arc::clone(&directory),
            tx,
        ));
        compiler.watch = Some(Box::new(IgnoringWatchFileSystem::new(
            Box::new(base),
            GlobSetBuilder::new().build().unwrap(),
        )));

        let mut plugin = plugin();
        plugin.attach(&mut compiler).unwrap();
        plugin.write_module(&mut compiler, "a.js", "a").unwrap();
        plugin.write_module(&mut compiler, "unwatched.js", "b").unwrap();

        let change = rx.try_recv().unwrap();
        assert_eq!(change.path, dir.path().join("a.js"));
        assert!(change.synthetic);
        assert!(rx.try_recv().is_err());
        assert!(directory.lock().unwrap().cached_time_info().is_none());
    }

    #[test]
    fn test_compilation_injects_route_table() {
        let dir = TempDir::new().unwrap();
        let pages = dir.path().join("src/pages");
        fs::create_dir_all(pages.join("about")).unwrap();
        fs::write(pages.join("index.tsx"), "").unwrap();
        fs::write(pages.join("about/team.tsx"), "").unwrap();

        let mut compiler = TestCompiler::new(dir.path(), StorageShape::Indexed { levels: 9 });
        let mut plugin = plugin();
        plugin.attach(&mut compiler).unwrap();
        let table = plugin.compilation(&mut compiler).unwrap();
        assert_eq!(table.url_paths(), vec!["/about/team", "/"]);

        let routes = plugin.resolve(ROUTES_SPECIFIER).unwrap();
        assert_eq!(routes, dir.path().join(".swiftly-data/build/routes.js"));
        let source = compiler.input_file_system().read_file(&routes).unwrap();
        let source = String::from_utf8(source.to_vec()).unwrap();
        assert!(source.contains("path: \"/about/team\","));
        assert!(plugin.resolve("./other").is_none());
    }
}
