// Declare modules
pub mod access;
pub mod cli;
pub mod config;
pub mod error;
pub mod formatter;
pub mod html;
pub mod links;
pub mod models;
pub mod routes;
pub mod rules;
pub mod scanner;
pub mod server;

use anyhow::Result;
use clap::Parser;

use self::cli::Cli;
use self::config::resolve_config;

/// Loads configuration once, then serves until the listener fails.
pub fn run() -> Result<()> {
    // 1. Parse Args
    let args = Cli::parse();

    // 2. Resolve Configuration (fatal on any unreadable or malformed file)
    let config = resolve_config(args)?;

    if config.registry.is_empty() {
        log::warn!("No projects registered; only the empty index will be served.");
    }
    for (id, project) in config.registry.projects() {
        log::info!("Project {} -> {}", id, project.root_path.display());
    }

    // 3. Serve
    server::serve(config)
}
