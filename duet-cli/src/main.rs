//! # duet
//!
//! CLI tool for exercising the duet messaging engine.
//!
//! ## Commands
//!
//! - `demo`: Run a scripted conversation between two users
//!
//! ## Example
//!
//! ```bash
//! # Run the demo with default settings
//! duet demo
//!
//! # Use a config file and show engine logs
//! duet --verbose demo --config duet.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use duet_client::EngineConfig;

mod commands;

use commands::demo;

/// CLI tool for exercising the duet messaging engine.
#[derive(Parser, Debug)]
#[command(name = "duet")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Show engine logs (debug level)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scripted two-user conversation over the in-memory backend
    Demo {
        /// Engine configuration file (TOML)
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()),
        )
        .init();

    match cli.command {
        Commands::Demo { config } => {
            let config = match config {
                Some(path) => EngineConfig::from_file(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => EngineConfig::default(),
            };
            demo::run(config).await?;
        }
    }

    Ok(())
}
