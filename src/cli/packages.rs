// src/cli/packages.rs
//! Package snapshot commands

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum PackageCommands {
    /// Load installed and available packages from a JSON file
    Import {
        /// JSON file with `packages`, `groups` and `environments` lists
        file: PathBuf,
    },

    /// List the package snapshot, installed builds first
    List {
        /// Only show installed builds
        #[arg(short, long)]
        installed: bool,
    },
}
