//! Command-line interface definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "weft",
    version,
    about = "Chain-driven agent loop orchestrator",
    long_about = "Watches an agent's terminal output for stage keywords and drives a \
                  fixing/analysis loop over outstanding work items."
)]
pub struct Cli {
    /// State directory shared by monitors (lock state lives here).
    #[arg(long, global = true, default_value = ".weft")]
    pub work_dir: PathBuf,

    /// Chain configuration file.
    #[arg(long, global = true, default_value = "weft.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start a monitor and run the chain until a terminal outcome.
    Run {
        /// Identifier for this monitor; generated when absent.
        #[arg(long)]
        monitor_id: Option<String>,
    },
    /// Show chain configuration and current lock state.
    Status,
    /// Inspect or reset the shared send lock.
    Lock {
        #[command(subcommand)]
        action: LockAction,
    },
    /// Write a starter configuration and work-item list.
    Init {
        /// Overwrite existing files.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum LockAction {
    /// Print holder, cooldown, metrics and recent events.
    Show,
    /// Clear the lock state. Explicit operator action; never done implicitly.
    Reset,
}
