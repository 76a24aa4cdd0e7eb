//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// relevel - level-triggered reconciliation
#[derive(Parser, Debug)]
#[command(name = "relevel")]
#[command(version)]
#[command(about = "Run a level-triggered controller over a seeded in-memory source")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the demo controller until Ctrl+C
    Run {
        /// Configuration file (controller settings and seed objects)
        #[arg(short, long)]
        config: PathBuf,

        /// Override the configured worker count
        #[arg(short, long)]
        workers: Option<usize>,

        /// Override the configured resync interval, in seconds (0 disables)
        #[arg(long)]
        resync_secs: Option<u64>,
    },

    /// Validate a configuration file and print it as JSON
    CheckConfig {
        /// Configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}
