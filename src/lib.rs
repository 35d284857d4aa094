// src/lib.rs

//! Reprise: package transaction history with merge, undo, rollback and replay
//!
//! # Architecture
//!
//! - History: immutable transaction records with lazily loaded action lists
//! - Merge: a range of records folded into one net transaction
//! - Replay: transactions written to and read from versioned JSON documents,
//!   then re-issued against the current system through collaborator traits
//! - Storage: SQLite with versioned migrations

pub mod config;
pub mod db;
mod error;
pub mod history;
pub mod lock;
pub mod replay;
pub mod version;

pub use config::Config;
pub use error::{Error, Result};
pub use history::{
    ActionKind, HistoryStore, MergedTransaction, PackageAction, Reason, TransactionRecord,
    TransactionView,
};
pub use lock::{LockToken, SystemLock};
pub use replay::{ReplayDocument, ReplayOptions, TransactionReplay};
pub use version::{Nevra, RpmVersion};
