// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

use clap::{Parser, Subcommand};
use swiftly_cli::commands;
use tracing_subscriber::EnvFilter;

/// Environment variable that turns on tracing of virtual-module writes.
const DEBUG_ENV: &str = "SWIFTLY_DEBUG";

#[derive(Parser)]
#[command(name = "swiftly")]
#[command(author = "Maravilla Labs")]
#[command(version)]
#[command(about = "Build and serve file-routed bundler projects", long_about = None)]
struct Cli {
    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build sources into an artifact that can be published
    Build {
        /// Ensure the build is ready for production
        #[arg(long, alias = "prod")]
        production: bool,
        /// Do not optimise the sources
        #[arg(long, alias = "dev")]
        development: bool,
    },
    /// Watch sources, rebuild on change and run the server bundle
    Serve {
        /// Port the server listens on
        #[arg(short, long)]
        port: Option<u16>,
        /// Serve an optimised build
        #[arg(long, alias = "prod")]
        production: bool,
        /// Serve an unoptimised build (default)
        #[arg(long, alias = "dev")]
        development: bool,
        /// Open the browser after the first successful build
        #[arg(long)]
        open: bool,
    },
}

fn debug_enabled() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| !value.is_empty() && value != "0")
        .unwrap_or(false)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut directives = cli.log_level.clone();
    if debug_enabled() {
        directives.push_str(",swiftly=trace,swiftly_cli=trace");
    }
    let filter = EnvFilter::try_new(&directives)
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    match cli.command {
        Commands::Build {
            production,
            development,
        } => commands::build::run(production, development).await,
        Commands::Serve {
            port,
            production,
            development,
            open,
        } => commands::serve::run(port, production, development, open).await,
    }
}
