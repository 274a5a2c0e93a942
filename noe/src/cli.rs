//! Command-line interface definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Noema - autonomous cognitive agent core
#[derive(Debug, Parser)]
#[command(name = "noe", version, about)]
pub struct Cli {
    /// Path to a config file (.noema.yml is picked up automatically)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level override: trace | debug | info | warn | error
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the core in the foreground until interrupted
    Run,

    /// Print a summary of the current snapshot and exit
    Snapshot,

    /// Print version information
    Version,
}
