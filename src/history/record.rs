// src/history/record.rs

//! Transaction record model
//!
//! A record is created when a transaction begins, collects actions while the
//! transaction is built and is finalized when it ends. Once appended to a
//! [`HistoryStore`] it is immutable; records read back from a store load
//! their action lists and console output on first access and keep them for
//! the lifetime of the instance.

use super::action::PackageAction;
use super::comps::{EnvironmentAction, GroupAction};
use super::{HistoryStore, TransactionView};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::cell::OnceCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Console stream a stored line was written to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleStream {
    Output,
    Error,
}

impl ConsoleStream {
    pub fn as_i64(&self) -> i64 {
        match self {
            ConsoleStream::Output => 1,
            ConsoleStream::Error => 2,
        }
    }
}

/// A single package transaction, stored or in progress
#[derive(Clone)]
pub struct TransactionRecord {
    pub id: Option<i64>,
    pub begin_timestamp: DateTime<Utc>,
    /// `None` while running, or when the transaction never terminated
    pub end_timestamp: Option<DateTime<Utc>>,
    pub begin_db_version: String,
    pub end_db_version: Option<String>,
    pub login_user: Option<String>,
    pub command_line: Option<String>,
    pub return_code: Option<i32>,
    pub releasever: Option<String>,
    /// The package database changed outside of history before this transaction
    pub altered_before_rpmdb: bool,
    /// The package database changed outside of history after this transaction
    pub altered_after_rpmdb: bool,
    /// Stored fields this version does not model
    pub extra: BTreeMap<String, String>,
    store: Option<Rc<dyn HistoryStore>>,
    actions: OnceCell<Vec<PackageAction>>,
    group_actions: OnceCell<Vec<GroupAction>>,
    environment_actions: OnceCell<Vec<EnvironmentAction>>,
    output: OnceCell<Vec<String>>,
    errors: OnceCell<Vec<String>>,
}

impl TransactionRecord {
    /// Start recording a transaction that begins now
    pub fn begin(begin_db_version: impl Into<String>, command_line: impl Into<String>) -> Self {
        let mut record = Self::begin_at(Utc::now(), begin_db_version);
        record.command_line = Some(command_line.into());
        record
    }

    /// Start recording a transaction with an explicit begin time
    pub fn begin_at(begin_timestamp: DateTime<Utc>, begin_db_version: impl Into<String>) -> Self {
        Self {
            id: None,
            begin_timestamp,
            end_timestamp: None,
            begin_db_version: begin_db_version.into(),
            end_db_version: None,
            login_user: None,
            command_line: None,
            return_code: None,
            releasever: None,
            altered_before_rpmdb: false,
            altered_after_rpmdb: false,
            extra: BTreeMap::new(),
            store: None,
            actions: OnceCell::from(Vec::new()),
            group_actions: OnceCell::from(Vec::new()),
            environment_actions: OnceCell::from(Vec::new()),
            output: OnceCell::from(Vec::new()),
            errors: OnceCell::from(Vec::new()),
        }
    }

    /// Bind this record to its stored row; list data is loaded on demand
    pub fn attach(mut self, id: i64, store: Rc<dyn HistoryStore>) -> Self {
        self.id = Some(id);
        self.store = Some(store);
        self.actions = OnceCell::new();
        self.group_actions = OnceCell::new();
        self.environment_actions = OnceCell::new();
        self.output = OnceCell::new();
        self.errors = OnceCell::new();
        self
    }

    /// Finalize a running transaction
    pub fn finish(&mut self, end_db_version: impl Into<String>, return_code: i32) {
        self.finish_at(Utc::now(), end_db_version, return_code);
    }

    pub fn finish_at(
        &mut self,
        end_timestamp: DateTime<Utc>,
        end_db_version: impl Into<String>,
        return_code: i32,
    ) {
        self.end_timestamp = Some(end_timestamp);
        self.end_db_version = Some(end_db_version.into());
        self.return_code = Some(return_code);
    }

    pub fn is_unterminated(&self) -> bool {
        self.end_timestamp.is_none()
    }

    pub fn add_action(&mut self, action: PackageAction) -> Result<()> {
        Self::live(self.id, &mut self.actions)?.push(action);
        Ok(())
    }

    pub fn add_group_action(&mut self, action: GroupAction) -> Result<()> {
        Self::live(self.id, &mut self.group_actions)?.push(action);
        Ok(())
    }

    pub fn add_environment_action(&mut self, action: EnvironmentAction) -> Result<()> {
        Self::live(self.id, &mut self.environment_actions)?.push(action);
        Ok(())
    }

    pub fn add_output(&mut self, line: impl Into<String>) -> Result<()> {
        Self::live(self.id, &mut self.output)?.push(line.into());
        Ok(())
    }

    pub fn add_error(&mut self, line: impl Into<String>) -> Result<()> {
        Self::live(self.id, &mut self.errors)?.push(line.into());
        Ok(())
    }

    fn live<T>(id: Option<i64>, cell: &mut OnceCell<Vec<T>>) -> Result<&mut Vec<T>> {
        match (id, cell.get_mut()) {
            (None, Some(list)) => Ok(list),
            _ => Err(Error::InitError(format!(
                "Transaction {} is stored and cannot be modified",
                id.map(|i| i.to_string()).unwrap_or_default()
            ))),
        }
    }

    fn lazy<'a, T>(
        &self,
        cell: &'a OnceCell<Vec<T>>,
        load: impl FnOnce(&dyn HistoryStore, i64) -> Result<Vec<T>>,
    ) -> Result<&'a [T]> {
        if let Some(list) = cell.get() {
            return Ok(list);
        }
        let loaded = match (&self.store, self.id) {
            (Some(store), Some(id)) => load(store.as_ref(), id)?,
            _ => Vec::new(),
        };
        Ok(cell.get_or_init(|| loaded))
    }

    /// Package actions in the order they were recorded
    pub fn actions(&self) -> Result<&[PackageAction]> {
        self.lazy(&self.actions, |store, id| store.load_actions(id))
    }

    pub fn group_actions(&self) -> Result<&[GroupAction]> {
        self.lazy(&self.group_actions, |store, id| store.load_group_actions(id))
    }

    pub fn environment_actions(&self) -> Result<&[EnvironmentAction]> {
        self.lazy(&self.environment_actions, |store, id| {
            store.load_environment_actions(id)
        })
    }

    /// Console output captured while the transaction ran
    pub fn output(&self) -> Result<&[String]> {
        self.lazy(&self.output, |store, id| {
            store.load_console(id, ConsoleStream::Output)
        })
    }

    /// Error lines captured while the transaction ran
    pub fn errors(&self) -> Result<&[String]> {
        self.lazy(&self.errors, |store, id| {
            store.load_console(id, ConsoleStream::Error)
        })
    }
}

impl TransactionView for TransactionRecord {
    fn ids(&self) -> Vec<i64> {
        self.id.into_iter().collect()
    }

    fn actions(&self) -> Result<&[PackageAction]> {
        TransactionRecord::actions(self)
    }

    fn group_actions(&self) -> Result<&[GroupAction]> {
        TransactionRecord::group_actions(self)
    }

    fn environment_actions(&self) -> Result<&[EnvironmentAction]> {
        TransactionRecord::environment_actions(self)
    }
}

impl fmt::Debug for TransactionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionRecord")
            .field("id", &self.id)
            .field("begin_timestamp", &self.begin_timestamp)
            .field("end_timestamp", &self.end_timestamp)
            .field("begin_db_version", &self.begin_db_version)
            .field("end_db_version", &self.end_db_version)
            .field("command_line", &self.command_line)
            .field("return_code", &self.return_code)
            .field("actions", &self.actions.get())
            .finish_non_exhaustive()
    }
}

/// Most recent first: begin time descending, end time ascending, id descending
impl Ord for TransactionRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .begin_timestamp
            .cmp(&self.begin_timestamp)
            .then_with(|| self.end_timestamp.cmp(&other.end_timestamp))
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for TransactionRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TransactionRecord {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TransactionRecord {}
