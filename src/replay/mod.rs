// src/replay/mod.rs

//! Transaction replay
//!
//! Serializing transactions into replay documents, reverting them and
//! replaying them against the current system through the collaborator
//! traits in [`collab`].

pub mod collab;
pub mod document;
pub mod engine;
pub mod error;
pub mod plan;
pub mod revert;
pub mod staged;

pub use collab::{
    CompsHistory, Package, PackageSource, ReplayContext, TransactionBuilder, TransactionItem,
};
pub use document::{ReplayDocument, RpmEntry, VERSION_MAJOR, VERSION_MINOR};
pub use engine::{ReplayOptions, TransactionReplay};
pub use error::{DocumentError, ProblemKind, ReplayProblem, TransactionReplayError};
pub use plan::PlanningBuilder;
pub use revert::revert_document;
pub use staged::StagedComps;

use crate::error::Result;
use crate::history::TransactionView;

/// Capture a transaction as a replay document
pub fn serialize(view: &dyn TransactionView) -> Result<ReplayDocument> {
    ReplayDocument::from_view(view)
}

/// Parse and validate replay document text
pub fn deserialize(text: &str) -> std::result::Result<ReplayDocument, DocumentError> {
    ReplayDocument::parse(text)
}
