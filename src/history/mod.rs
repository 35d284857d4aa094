// src/history/mod.rs

//! Transaction history model
//!
//! Records of what past transactions did to packages, groups and
//! environments, the contract of the store that persists them, and the
//! merge engine that folds a range of records into one net transaction.

pub mod action;
pub mod comps;
pub mod merge;
pub mod record;
pub mod select;

pub use action::{ActionKind, PackageAction, Reason, SYSTEM_REPO};
pub use comps::{
    CompsEnvironment, CompsGroup, EnvironmentAction, EnvironmentGroup, GroupAction,
    GroupPackage, PackageTypes,
};
pub use merge::{MergedTransaction, PackageMerge, merge_package_actions};
pub use record::{ConsoleStream, TransactionRecord};
pub use select::{TransactionRange, TransactionSelector};

use crate::error::Result;

/// Anything that can be serialized into a replay document
///
/// Implemented by stored records, merged ranges and live in-progress
/// records alike.
pub trait TransactionView {
    /// Ids of the stored transactions this view covers, ascending
    fn ids(&self) -> Vec<i64>;
    fn actions(&self) -> Result<&[PackageAction]>;
    fn group_actions(&self) -> Result<&[GroupAction]>;
    fn environment_actions(&self) -> Result<&[EnvironmentAction]>;
}

/// Persistence of transaction records
pub trait HistoryStore {
    fn load_actions(&self, id: i64) -> Result<Vec<PackageAction>>;
    fn load_group_actions(&self, id: i64) -> Result<Vec<GroupAction>>;
    fn load_environment_actions(&self, id: i64) -> Result<Vec<EnvironmentAction>>;
    fn load_console(&self, id: i64, stream: ConsoleStream) -> Result<Vec<String>>;

    /// Reason `name.arch` had before transaction `id` ran
    ///
    /// Looks at the newest earlier transaction that touched the package;
    /// `Reason::Unknown` when there is none.
    fn reason_before(&self, name: &str, arch: &str, id: i64) -> Result<Reason>;

    /// Records for the given ids, most recent first; unknown ids are skipped
    fn query(&self, ids: &[i64]) -> Result<Vec<TransactionRecord>>;
    /// Records with `first <= id <= last`, most recent first
    fn range(&self, first: i64, last: i64) -> Result<Vec<TransactionRecord>>;
    fn list(&self, limit: Option<usize>) -> Result<Vec<TransactionRecord>>;
    fn last(&self) -> Result<Option<TransactionRecord>>;

    /// Persist a finished record and return its new id
    fn append(&self, record: &TransactionRecord) -> Result<i64>;
}
