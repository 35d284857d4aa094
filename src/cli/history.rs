// src/cli/history.rs
//! Transaction history commands

use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Tolerance flags shared by replay, undo, rollback and redo
///
/// Unset flags fall back to the `[replay]` section of the configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct ReplayArgs {
    /// Accept entries that disagree with what is installed
    #[arg(long)]
    pub ignore_installed: bool,

    /// Accept packages the resolver pulls in beyond the document
    #[arg(long)]
    pub ignore_extras: bool,

    /// Skip packages, groups and environments that cannot be found
    #[arg(long)]
    pub skip_unavailable: bool,

    /// Fail when a requested package cannot be installed
    #[arg(long, overrides_with = "no_strict")]
    pub strict: bool,

    /// Allow requested packages to be skipped when they cannot be installed
    #[arg(long, overrides_with = "strict")]
    pub no_strict: bool,

    /// Show the resolved transaction without recording it
    #[arg(long)]
    pub dry_run: bool,
}

impl ReplayArgs {
    /// `--strict` / `--no-strict`, or `default` when neither is given
    pub fn strict_or(&self, default: bool) -> bool {
        if self.strict {
            true
        } else if self.no_strict {
            false
        } else {
            default
        }
    }
}

#[derive(Subcommand)]
pub enum HistoryCommands {
    /// List recorded transactions, most recent first
    List {
        /// Show at most this many transactions
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show one transaction, or a range merged into one
    Info {
        /// Transaction id, `last`, `last-N` or a range `A..B`
        transactions: String,
    },

    /// Write a transaction or merged range to a replay file
    Store {
        /// Transaction id, `last`, `last-N` or a range `A..B`
        transactions: String,

        /// Output file
        #[arg(short, long, default_value = "transaction.json")]
        output: PathBuf,
    },

    /// Replay a stored transaction file
    Replay {
        /// Replay file written by `history store`
        file: PathBuf,

        #[command(flatten)]
        options: ReplayArgs,
    },

    /// Revert a single transaction
    Undo {
        /// Transaction id, `last` or `last-N`
        transaction: String,

        #[command(flatten)]
        options: ReplayArgs,
    },

    /// Revert every transaction after the given one
    Rollback {
        /// Transaction id, `last` or `last-N`
        transaction: String,

        #[command(flatten)]
        options: ReplayArgs,
    },

    /// Repeat a transaction
    Redo {
        /// Transaction id, `last` or `last-N`
        transaction: String,

        #[command(flatten)]
        options: ReplayArgs,
    },
}
