// src/commands/mod.rs
//! Command handlers for the reprise CLI

mod history;
mod packages;
mod system;

pub use history::{
    cmd_history_info, cmd_history_list, cmd_history_redo, cmd_history_replay,
    cmd_history_rollback, cmd_history_store, cmd_history_undo,
};
pub use packages::{cmd_packages_import, cmd_packages_list};
pub use system::{cmd_completions, cmd_init};

use anyhow::{Context, Result};
use reprise::Config;
use reprise::db::SqliteHistory;
use rusqlite::Connection;
use std::path::Path;
use std::rc::Rc;

/// Configuration file values with command-line overrides applied
pub struct Settings {
    pub config: Config,
    pub db_path: String,
}

impl Settings {
    pub fn load(config_path: &Path, db_path: Option<String>) -> Result<Self> {
        let config = Config::load_or_default(config_path)
            .with_context(|| format!("Failed to load configuration {}", config_path.display()))?;
        let db_path = db_path.unwrap_or_else(|| config.db_path.display().to_string());
        Ok(Self { config, db_path })
    }

    /// Open the database shared by the history and the package snapshot
    pub fn open_db(&self) -> Result<(Rc<Connection>, SqliteHistory)> {
        let conn = Rc::new(
            reprise::db::open(&self.db_path).context("Failed to open package database")?,
        );
        let history = SqliteHistory::new(conn.clone());
        Ok((conn, history))
    }
}
