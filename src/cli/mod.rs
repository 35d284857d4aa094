// src/cli/mod.rs
//! CLI definitions for reprise
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! - `init` - Create the database
//! - `history` - List, inspect, store, replay, undo, rollback and redo transactions
//! - `packages` - Maintain the package snapshot replays resolve against
//! - `completions` - Shell completions

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use reprise::config::DEFAULT_CONFIG_PATH;
use std::path::PathBuf;

mod history;
mod packages;

pub use history::{HistoryCommands, ReplayArgs};
pub use packages::PackageCommands;

#[derive(Parser)]
#[command(name = "reprise")]
#[command(author = "Reprise Contributors")]
#[command(version)]
#[command(about = "Package transaction history with merge, undo, rollback and replay", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Path to the database file (overrides db_path from the configuration)
    #[arg(short, long, global = true)]
    pub db_path: Option<String>,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new reprise database
    Init,

    /// Transaction history
    #[command(subcommand)]
    History(HistoryCommands),

    /// Package snapshot used to resolve replays
    #[command(subcommand)]
    Packages(PackageCommands),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
