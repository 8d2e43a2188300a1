// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! File-based route table generation.
//!
//! Every file under the pages root becomes a route:
//!
//! | File                      | URL path      |
//! |---------------------------|---------------|
//! | `pages/index.tsx`         | `/`           |
//! | `pages/about.tsx`         | `/about`      |
//! | `pages/about/index.tsx`   | `/about`      |
//! | `pages/about/team.tsx`    | `/about/team` |
//!
//! Routes keep the order the scan discovered them in. Colliding URL paths are
//! kept as-is; the server matches routes in order, so the first one wins.
//!
//! The table is serialized as a JavaScript module that imports every page and
//! default-exports the route list. It is injected as a virtual module and
//! resolved through the `swiftly!routes` specifier.

use std::collections::VecDeque;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Result;
use crate::fs::InputFileSystem;
use crate::stats::FileStat;

/// Source of directory listings and stats for a page scan.
pub trait DirectoryScanner {
    /// Lists the entry names of `dir`.
    fn read_dir(&mut self, dir: &Path) -> io::Result<Vec<String>>;

    /// Returns metadata for `path`.
    fn stat(&mut self, path: &Path) -> io::Result<FileStat>;
}

/// Scans through a bundler's input filesystem, so virtual pages are seen too.
pub struct FsScanner<'a>(pub &'a mut dyn InputFileSystem);

impl DirectoryScanner for FsScanner<'_> {
    fn read_dir(&mut self, dir: &Path) -> io::Result<Vec<String>> {
        self.0.read_dir(dir)
    }

    fn stat(&mut self, path: &Path) -> io::Result<FileStat> {
        self.0.stat(path)
    }
}

/// A file found under the pages root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFile {
    /// Absolute path.
    pub path: PathBuf,
    /// Metadata from the scanner.
    pub stat: FileStat,
}

/// Depth-first walk yielding every non-directory entry under a root.
///
/// Directories are expanded the moment they are met, in listing order.
/// Nothing is read before the first call to `next`, and a finished walk
/// cannot be restarted. Entries that vanish between listing and stat are
/// skipped; a missing root yields nothing.
pub struct ScanPages<'s, S: DirectoryScanner + ?Sized> {
    scanner: &'s mut S,
    root: PathBuf,
    started: bool,
    stack: Vec<(PathBuf, VecDeque<String>)>,
}

impl<'s, S: DirectoryScanner + ?Sized> ScanPages<'s, S> {
    /// Prepares a walk of `root`.
    pub fn new(scanner: &'s mut S, root: impl Into<PathBuf>) -> Self {
        Self {
            scanner,
            root: root.into(),
            started: false,
            stack: Vec::new(),
        }
    }

    fn enter(&mut self, dir: PathBuf) -> io::Result<()> {
        match self.scanner.read_dir(&dir) {
            Ok(names) => {
                self.stack.push((dir, names.into()));
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl<S: DirectoryScanner + ?Sized> Iterator for ScanPages<'_, S> {
    type Item = io::Result<PageFile>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            let root = self.root.clone();
            if let Err(err) = self.enter(root) {
                return Some(Err(err));
            }
        }

        loop {
            let (dir, names) = self.stack.last_mut()?;
            let Some(name) = names.pop_front() else {
                self.stack.pop();
                continue;
            };
            let path = dir.join(name);

            match self.scanner.stat(&path) {
                Ok(stat) if stat.is_directory() => {
                    if let Err(err) = self.enter(path) {
                        return Some(Err(err));
                    }
                }
                Ok(stat) => return Some(Ok(PageFile { path, stat })),
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// One entry of the route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    /// URL path, always starting with `/`.
    pub url_path: String,
    /// Identifier the page module is imported as (`page0`, `page1`, ...).
    pub render: String,
    /// Import specifier of the page module (its path without extension).
    pub module: String,
    /// Status change time of the page file, in milliseconds.
    pub created_at: u64,
    /// Modification time of the page file, in milliseconds.
    pub modified_at: u64,
}

/// Strips the extension from the last segment of `path`.
///
/// Names without a dot, or whose only dot is the first character, are left
/// alone.
pub fn strip_extension(path: &str) -> &str {
    let name_start = path.rfind(['/', '\\']).map(|i| i + 1).unwrap_or(0);
    match path[name_start..].rfind('.') {
        Some(0) | None => path,
        Some(dot) => &path[..name_start + dot],
    }
}

/// Derives the URL path for a page file.
///
/// The path relative to the pages root loses its extension, and a trailing
/// `index` segment is dropped.
pub fn url_path_for(pages_root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(pages_root).unwrap_or(file);
    let mut segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if let Some(last) = segments.pop() {
        let stem = strip_extension(&last);
        if stem != "index" {
            segments.push(stem.to_string());
        }
    }
    format!("/{}", segments.join("/"))
}

/// Ordered route table for one pages root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    routes: Vec<RouteDescriptor>,
}

impl RouteTable {
    /// Scans `pages_root` and builds a descriptor per discovered file.
    pub fn from_scan<S: DirectoryScanner + ?Sized>(scanner: &mut S, pages_root: &Path) -> Result<Self> {
        let mut routes = Vec::new();
        for page in ScanPages::new(scanner, pages_root) {
            let page = page?;
            let index = routes.len();
            routes.push(RouteDescriptor {
                url_path: url_path_for(pages_root, &page.path),
                render: format!("page{}", index),
                module: strip_extension(&page.path.to_string_lossy()).to_string(),
                created_at: page.stat.ctime_ms(),
                modified_at: page.stat.mtime_ms(),
            });
        }
        tracing::debug!(root = %pages_root.display(), count = routes.len(), "scanned pages");
        Ok(Self { routes })
    }

    /// Builds a table from existing descriptors.
    pub fn from_routes(routes: Vec<RouteDescriptor>) -> Self {
        Self { routes }
    }

    /// Every route, in discovery order.
    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    /// URL paths in discovery order, duplicates included.
    pub fn url_paths(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.url_path.as_str()).collect()
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true if no page was found.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Serializes the table as an injectable JavaScript module.
    pub fn to_module_source(&self) -> Result<String> {
        let mut out = String::new();
        for route in &self.routes {
            out.push_str(&format!(
                "import {} from {}\n",
                route.render,
                serde_json::to_string(&route.module)?
            ));
        }
        out.push_str("\nexport default [\n");
        for route in &self.routes {
            out.push_str("  {\n");
            out.push_str(&format!("    path: {},\n", serde_json::to_string(&route.url_path)?));
            out.push_str(&format!("    render: {},\n", route.render));
            out.push_str(&format!("    createdAt: new Date({}),\n", route.created_at));
            out.push_str(&format!("    modifiedAt: new Date({}),\n", route.modified_at));
            out.push_str("  },\n");
        }
        out.push_str("];\n");
        Ok(out)
    }
}

fn import_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?m)^import\s+([A-Za-z_$][\w$]*)\s+from\s+("(?:[^"\\]|\\.)*")\s*;?\s*$"#)
            .expect("import pattern is valid")
    })
}

/// Reads back the `(identifier, specifier)` pairs of a serialized table's
/// import statements, in order.
pub fn parse_route_imports(source: &str) -> Result<Vec<(String, String)>> {
    let mut imports = Vec::new();
    for caps in import_pattern().captures_iter(source) {
        let specifier: String = serde_json::from_str(&caps[2])?;
        imports.push((caps[1].to_string(), specifier));
    }
    Ok(imports)
}
