// src/main.rs

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, Commands, HistoryCommands, PackageCommands};
use commands::Settings;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Completions { shell } = cli.command {
        return commands::cmd_completions(shell);
    }

    let settings = Settings::load(&cli.config, cli.db_path)?;

    match cli.command {
        Commands::Init => commands::cmd_init(&settings),

        Commands::History(command) => match command {
            HistoryCommands::List { limit } => commands::cmd_history_list(&settings, limit),
            HistoryCommands::Info { transactions } => {
                commands::cmd_history_info(&settings, &transactions)
            }
            HistoryCommands::Store {
                transactions,
                output,
            } => commands::cmd_history_store(&settings, &transactions, &output),
            HistoryCommands::Replay { file, options } => {
                commands::cmd_history_replay(&settings, &file, &options)
            }
            HistoryCommands::Undo {
                transaction,
                options,
            } => commands::cmd_history_undo(&settings, &transaction, &options),
            HistoryCommands::Rollback {
                transaction,
                options,
            } => commands::cmd_history_rollback(&settings, &transaction, &options),
            HistoryCommands::Redo {
                transaction,
                options,
            } => commands::cmd_history_redo(&settings, &transaction, &options),
        },

        Commands::Packages(command) => match command {
            PackageCommands::Import { file } => commands::cmd_packages_import(&settings, &file),
            PackageCommands::List { installed } => {
                commands::cmd_packages_list(&settings, installed)
            }
        },

        Commands::Completions { .. } => Ok(()),
    }
}
