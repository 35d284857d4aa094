// src/commands/system.rs
//! Database initialization and shell completions

use super::Settings;
use crate::cli::Cli;
use anyhow::Result;
use clap::CommandFactory;
use clap_complete::Shell;
use tracing::info;

pub fn cmd_init(settings: &Settings) -> Result<()> {
    info!("Initializing reprise database at: {}", settings.db_path);
    reprise::db::init(&settings.db_path)?;
    println!("Database initialized successfully at: {}", settings.db_path);
    Ok(())
}

pub fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "reprise", &mut std::io::stdout());
    Ok(())
}
