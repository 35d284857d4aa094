// src/error.rs

//! Error types shared across the crate

use crate::replay::{DocumentError, TransactionReplayError};
use thiserror::Error;

/// Errors produced by the history, replay and storage layers
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O failure with the underlying OS error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Malformed or incompatible replay document
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// One or more problems found while replaying a transaction
    #[error(transparent)]
    Replay(#[from] TransactionReplayError),

    #[error("Initialization error: {0}")]
    InitError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Not found: {0}")]
    NotFoundError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
