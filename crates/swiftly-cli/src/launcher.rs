// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Static HTML shell that loads the browser bundle.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File name of the browser bundle, served from the public directory root.
pub const BROWSER_BUNDLE: &str = "browser.bundle.js";

/// File name of the HTML shell.
pub const LAUNCHER_FILE: &str = "index.html";

/// Renders the HTML shell for a page title.
pub fn render(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <title>{}</title>
  </head>
  <body>
    <div id="root"></div>
    <script async defer src="/{}"></script>
  </body>
</html>
"#,
        escape(title),
        BROWSER_BUNDLE
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Writes the HTML shell into `public_dir`, creating it if needed.
pub fn write(public_dir: &Path, title: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(public_dir)?;
    let path = public_dir.join(LAUNCHER_FILE);
    fs::write(&path, render(title))?;
    tracing::debug!(path = %path.display(), "wrote launcher");
    Ok(path)
}
