// src/replay/revert.rs

//! Inverse of a replay document, used by undo and rollback

use super::document::{ReplayDocument, RpmEntry};
use crate::error::Result;
use crate::history::{ActionKind, EnvironmentAction, GroupAction, HistoryStore, Reason, SYSTEM_REPO};
use crate::version::Nevra;
use tracing::debug;

/// Map every entry of `document` to the action that undoes it
///
/// `first_id` is the oldest transaction being reverted; reason changes are
/// reverted to whatever reason the package had before it.
pub fn revert_document(
    document: &ReplayDocument,
    store: &dyn HistoryStore,
    first_id: i64,
) -> Result<ReplayDocument> {
    let mut rpms = Vec::with_capacity(document.rpms.len());
    for entry in &document.rpms {
        rpms.push(revert_rpm(entry, store, first_id)?);
    }

    let groups = document
        .groups
        .iter()
        .map(|g| GroupAction {
            action: g.action.inverse(),
            group: g.group.clone(),
        })
        .collect();
    let environments = document
        .environments
        .iter()
        .map(|e| EnvironmentAction {
            action: e.action.inverse(),
            environment: e.environment.clone(),
        })
        .collect();

    Ok(ReplayDocument {
        major: document.major,
        minor: document.minor,
        rpms,
        groups,
        environments,
    })
}

fn revert_rpm(entry: &RpmEntry, store: &dyn HistoryStore, first_id: i64) -> Result<RpmEntry> {
    let action = entry.action.inverse();
    let mut reason = entry.reason;

    if action == ActionKind::Install && reason == Reason::Clean {
        reason = Reason::Dependency;
    }
    if action == ActionKind::ReasonChange {
        match Nevra::parse(&entry.nevra) {
            Ok(nevra) => reason = store.reason_before(&nevra.name, &nevra.arch, first_id)?,
            // Replay reports the bad NEVRA
            Err(e) => debug!("Keeping reason of unparsable entry: {}", e),
        }
    }

    Ok(RpmEntry {
        action,
        nevra: entry.nevra.clone(),
        reason,
        repo_id: entry.repo_id.clone().filter(|r| r != SYSTEM_REPO),
    })
}
