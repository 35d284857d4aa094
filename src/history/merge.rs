// src/history/merge.rs

//! Transaction merge engine
//!
//! Folds an oldest-to-newest run of transactions into the single net
//! transaction a rollback over that range has to undo.
//!
//! Packages are tracked as lineages keyed by name and base architecture.
//! A lineage remembers the build that was on the system before the range
//! (`origin`) and the build that is there after it (`current`); the net
//! action falls out of comparing the two. Outgoing actions of a transaction
//! are applied before incoming ones so an upgrade pair always finds its
//! removed half waiting. Shapes that cannot be explained this way are kept
//! verbatim and reported as warnings.

use super::action::{ActionKind, PackageAction};
use super::comps::{EnvironmentAction, GroupAction};
use super::record::TransactionRecord;
use super::TransactionView;
use crate::error::{Error, Result};
use crate::version::Nevra;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

type LineageKey = (String, String);

fn lineage_key(nevra: &Nevra) -> LineageKey {
    (nevra.name.clone(), nevra.basearch().to_string())
}

#[derive(Debug)]
struct Lineage {
    origin: Option<PackageAction>,
    current: Option<PackageAction>,
    /// Build that was current before the latest outgoing action
    previous: Option<PackageAction>,
    /// Incoming action that started a lineage with nothing installed
    flavor: ActionKind,
    /// Kind of the most recent outgoing action
    removal: ActionKind,
    steps: Vec<PackageAction>,
    transactions: usize,
    last_tx: usize,
    reinstalled: bool,
    /// Replaced by the same build from another repository
    rebuilt: bool,
    resurrected: bool,
    reason_changed: bool,
    unmerged: bool,
}

impl Lineage {
    fn new() -> Self {
        Self {
            origin: None,
            current: None,
            previous: None,
            flavor: ActionKind::Install,
            removal: ActionKind::Erase,
            steps: Vec::new(),
            transactions: 0,
            last_tx: 0,
            reinstalled: false,
            rebuilt: false,
            resurrected: false,
            reason_changed: false,
            unmerged: false,
        }
    }

    fn touch(&mut self, tx: usize, step: &PackageAction) {
        if self.transactions == 0 || self.last_tx != tx {
            self.transactions += 1;
            self.last_tx = tx;
        }
        self.steps.push(step.clone());
    }

    fn removal_kind(&self) -> ActionKind {
        if self.removal == ActionKind::Obsoleted {
            ActionKind::Obsoleted
        } else {
            ActionKind::Erase
        }
    }

    fn resolve(&self) -> Vec<PackageAction> {
        if self.unmerged || self.transactions <= 1 {
            return self.steps.clone();
        }

        let mut net = match (&self.origin, &self.current) {
            (None, None) => Vec::new(),
            (None, Some(current)) if self.rebuilt => {
                info!(
                    "{} was installed and rebuilt from another repository, keeping a reinstall",
                    current.nevra
                );
                vec![current.with_action(ActionKind::Reinstall)]
            }
            (None, Some(current)) => vec![current.with_action(self.flavor)],
            (Some(origin), None) => vec![origin.with_action(self.removal_kind())],
            (Some(origin), Some(current)) => self.resolve_replacement(origin, current),
        };

        let done = self.steps.iter().all(|s| s.done);
        for action in &mut net {
            action.done = done;
        }
        net
    }

    fn resolve_replacement(&self, origin: &PackageAction, current: &PackageAction) -> Vec<PackageAction> {
        match current.nevra.compare_evr(&origin.nevra) {
            Ordering::Greater => vec![
                current.with_action(ActionKind::Upgrade),
                origin.with_action(ActionKind::Upgraded),
            ],
            Ordering::Less => vec![
                current.with_action(ActionKind::Downgrade),
                origin.with_action(ActionKind::Downgraded),
            ],
            Ordering::Equal if current.nevra != origin.nevra => vec![
                current.with_action(ActionKind::Upgrade),
                origin.with_action(ActionKind::Upgraded),
            ],
            Ordering::Equal => {
                if self.resurrected || self.reinstalled || origin.origin() != current.origin() {
                    info!(
                        "{} returned to the same version across the merged range, keeping a reinstall",
                        current.nevra
                    );
                    vec![current.with_action(ActionKind::Reinstall)]
                } else if self.reason_changed || origin.reason != current.reason {
                    vec![current.with_action(ActionKind::ReasonChange)]
                } else {
                    info!(
                        "{} returned to the same version across the merged range, dropping it",
                        current.nevra
                    );
                    Vec::new()
                }
            }
        }
    }
}

enum Slot {
    Lineage(usize),
    Unmerged(PackageAction),
}

/// Net package actions of a merged range
#[derive(Debug, Clone, Default)]
pub struct PackageMerge {
    pub actions: Vec<PackageAction>,
    /// Entries that could not be merged and were kept as recorded
    pub warnings: Vec<String>,
}

/// Oldest pending lineage for `key` that `accept` takes
fn take_pending(
    pending: &mut HashMap<LineageKey, Vec<(usize, usize)>>,
    key: &LineageKey,
    accept: impl Fn(usize, usize) -> bool,
) -> Option<(usize, usize)> {
    let list = pending.get_mut(key)?;
    let pos = list.iter().position(|&(idx, tx)| accept(idx, tx))?;
    Some(list.remove(pos))
}

#[derive(Default)]
struct PackageMerger {
    lineages: Vec<Lineage>,
    slots: Vec<Slot>,
    /// Lineage whose current build is this NEVRA
    installed: HashMap<Nevra, usize>,
    /// Lineages with nothing installed, with the transaction that removed it
    pending: HashMap<LineageKey, Vec<(usize, usize)>>,
    removed: HashSet<Nevra>,
    warnings: Vec<String>,
}

impl PackageMerger {
    fn apply(&mut self, tx: usize, actions: &[PackageAction]) {
        for action in actions.iter().filter(|a| a.action.is_outgoing()) {
            self.outgoing(tx, action);
        }
        for action in actions.iter().filter(|a| a.action.is_incoming()) {
            self.incoming(tx, action);
        }
        for action in actions.iter().filter(|a| a.action == ActionKind::ReasonChange) {
            self.reason_change(tx, action);
        }
        self.close_transaction(tx);
    }

    fn new_lineage(&mut self) -> usize {
        let idx = self.lineages.len();
        self.lineages.push(Lineage::new());
        self.slots.push(Slot::Lineage(idx));
        idx
    }

    fn keep_unmerged(&mut self, action: &PackageAction, why: &str) {
        let message = format!("{} {}: {}, left unmerged", action.action, action.nevra, why);
        warn!("{}", message);
        self.warnings.push(message);
        self.slots.push(Slot::Unmerged(action.clone()));
    }

    fn outgoing(&mut self, tx: usize, action: &PackageAction) {
        let idx = match self.installed.remove(&action.nevra) {
            Some(idx) => idx,
            None if self.removed.contains(&action.nevra) => {
                self.keep_unmerged(action, "package was already removed");
                return;
            }
            None => {
                let idx = self.new_lineage();
                self.lineages[idx].origin = Some(action.clone());
                idx
            }
        };

        let lineage = &mut self.lineages[idx];
        lineage.previous = lineage.current.take();
        lineage.removal = action.action;
        if action.action == ActionKind::Reinstalled {
            lineage.reinstalled = true;
        }
        lineage.touch(tx, action);

        self.pending
            .entry(lineage_key(&action.nevra))
            .or_default()
            .push((idx, tx));
        self.removed.insert(action.nevra.clone());
    }

    fn incoming(&mut self, tx: usize, action: &PackageAction) {
        if self.installed.contains_key(&action.nevra) {
            self.keep_unmerged(action, "package is already installed");
            return;
        }

        let key = lineage_key(&action.nevra);
        let replacement = matches!(
            action.action,
            ActionKind::Upgrade | ActionKind::Downgrade | ActionKind::Reinstall
        );

        let paired = match take_pending(&mut self.pending, &key, |_, pending_tx| pending_tx == tx) {
            Some(found) => Some(found),
            None if replacement => None,
            None => {
                let lineages = &self.lineages;
                take_pending(&mut self.pending, &key, |idx, _| {
                    matches!(lineages[idx].removal, ActionKind::Erase | ActionKind::Obsoleted)
                })
            }
        };

        let idx = match paired {
            Some((idx, pending_tx)) => {
                let lineage = &mut self.lineages[idx];
                if pending_tx != tx {
                    lineage.resurrected = true;
                    debug!("{} resurrects an earlier removal", action.nevra);
                }
                if !replacement {
                    lineage.flavor = action.action;
                }
                if action.action == ActionKind::Reinstall {
                    lineage.reinstalled = true;
                }
                if replacement
                    && let Some(previous) = &lineage.previous
                    && previous.nevra == action.nevra
                    && previous.origin() != action.origin()
                {
                    lineage.rebuilt = true;
                }
                idx
            }
            None if replacement => {
                self.keep_unmerged(action, "no matching outgoing package");
                return;
            }
            None => {
                let idx = self.new_lineage();
                self.lineages[idx].flavor = action.action;
                idx
            }
        };

        let lineage = &mut self.lineages[idx];
        lineage.current = Some(action.clone());
        lineage.touch(tx, action);
        self.installed.insert(action.nevra.clone(), idx);
        self.removed.remove(&action.nevra);
    }

    fn reason_change(&mut self, tx: usize, action: &PackageAction) {
        if let Some(&idx) = self.installed.get(&action.nevra) {
            let lineage = &mut self.lineages[idx];
            if let Some(current) = lineage.current.as_mut() {
                current.reason = action.reason;
            }
            lineage.reason_changed = true;
            lineage.touch(tx, action);
            return;
        }
        if self.removed.contains(&action.nevra) {
            self.keep_unmerged(action, "package was already removed");
            return;
        }

        let idx = self.new_lineage();
        let lineage = &mut self.lineages[idx];
        lineage.origin = Some(action.clone());
        lineage.current = Some(action.clone());
        lineage.reason_changed = true;
        lineage.touch(tx, action);
        self.installed.insert(action.nevra.clone(), idx);
    }

    /// Replacement halves left without their incoming half cannot be merged
    fn close_transaction(&mut self, tx: usize) {
        let mut dangling = Vec::new();
        for list in self.pending.values_mut() {
            list.retain(|&(idx, pending_tx)| {
                let replaced = matches!(
                    self.lineages[idx].removal,
                    ActionKind::Upgraded | ActionKind::Downgraded | ActionKind::Reinstalled
                );
                if pending_tx == tx && replaced {
                    dangling.push(idx);
                    false
                } else {
                    true
                }
            });
        }
        dangling.sort_unstable();

        for idx in dangling {
            let lineage = &mut self.lineages[idx];
            lineage.unmerged = true;
            if let Some(step) = lineage.steps.last() {
                let message = format!(
                    "{} {}: no matching incoming package, left unmerged",
                    step.action, step.nevra
                );
                warn!("{}", message);
                self.warnings.push(message);
            }
        }
    }

    fn finish(self) -> PackageMerge {
        let mut actions = Vec::new();
        for slot in self.slots {
            match slot {
                Slot::Lineage(idx) => actions.extend(self.lineages[idx].resolve()),
                Slot::Unmerged(action) => actions.push(action),
            }
        }
        PackageMerge {
            actions,
            warnings: self.warnings,
        }
    }
}

/// Merge per-transaction package action lists, oldest first
pub fn merge_package_actions(transactions: &[&[PackageAction]]) -> PackageMerge {
    let mut merger = PackageMerger::default();
    for (tx, actions) in transactions.iter().enumerate() {
        merger.apply(tx, actions);
    }
    merger.finish()
}

/// Union by id; a later entry replaces an earlier one in place
fn merge_by_id<T: Clone>(lists: &[&[T]], id: impl Fn(&T) -> &str) -> Vec<T> {
    let mut merged: Vec<T> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for list in lists {
        for item in list.iter() {
            match index.get(id(item)) {
                Some(&pos) => merged[pos] = item.clone(),
                None => {
                    index.insert(id(item).to_string(), merged.len());
                    merged.push(item.clone());
                }
            }
        }
    }
    merged
}

/// Read-only net view over a contiguous run of stored transactions
#[derive(Debug, Clone)]
pub struct MergedTransaction {
    /// Oldest first
    members: Vec<TransactionRecord>,
    pub begin_timestamp: DateTime<Utc>,
    pub begin_db_version: String,
    pub end_timestamp: Option<DateTime<Utc>>,
    pub end_db_version: Option<String>,
    pub altered_before_rpmdb: bool,
    pub altered_after_rpmdb: bool,
    actions: Vec<PackageAction>,
    group_actions: Vec<GroupAction>,
    environment_actions: Vec<EnvironmentAction>,
    warnings: Vec<String>,
}

impl MergedTransaction {
    /// Merge records given in any order; a repeated id is merged once
    pub fn new(records: Vec<TransactionRecord>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut members = Vec::with_capacity(records.len());
        for record in records {
            if let Some(id) = record.id {
                if !seen.insert(id) {
                    debug!("Transaction {} is already part of the merge", id);
                    continue;
                }
            }
            members.push(record);
        }
        // Records sort most recent first; members are kept oldest first
        members.sort_by(|a, b| b.cmp(a));

        let (oldest, newest) = match (members.first(), members.last()) {
            (Some(oldest), Some(newest)) => (oldest, newest),
            _ => return Err(Error::InitError("No transactions to merge".to_string())),
        };

        let chain_broken = members.windows(2).any(|pair| {
            pair[0].altered_after_rpmdb
                || pair[1].altered_before_rpmdb
                || pair[0].end_db_version.as_deref() != Some(pair[1].begin_db_version.as_str())
        });

        let (end_timestamp, end_db_version) = members
            .iter()
            .filter_map(|m| m.end_timestamp.map(|end| (end, m.end_db_version.clone())))
            .max_by_key(|(end, _)| *end)
            .map_or((None, None), |(end, version)| (Some(end), version));

        let begin_timestamp = oldest.begin_timestamp;
        let begin_db_version = oldest.begin_db_version.clone();
        let altered_before_rpmdb = oldest.altered_before_rpmdb || chain_broken;
        let altered_after_rpmdb = newest.altered_after_rpmdb || chain_broken;

        let mut action_lists = Vec::with_capacity(members.len());
        let mut group_lists = Vec::with_capacity(members.len());
        let mut environment_lists = Vec::with_capacity(members.len());
        for member in &members {
            action_lists.push(member.actions()?);
            group_lists.push(member.group_actions()?);
            environment_lists.push(member.environment_actions()?);
        }

        let PackageMerge { actions, warnings } = merge_package_actions(&action_lists);
        let group_actions = merge_by_id(&group_lists, |g: &GroupAction| g.group.id.as_str());
        let environment_actions = merge_by_id(&environment_lists, |e: &EnvironmentAction| {
            e.environment.id.as_str()
        });

        Ok(Self {
            members,
            begin_timestamp,
            begin_db_version,
            end_timestamp,
            end_db_version,
            altered_before_rpmdb,
            altered_after_rpmdb,
            actions,
            group_actions,
            environment_actions,
            warnings,
        })
    }

    /// The merged records, oldest first
    pub fn members(&self) -> &[TransactionRecord] {
        &self.members
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn login_users(&self) -> Vec<&str> {
        self.members.iter().filter_map(|m| m.login_user.as_deref()).collect()
    }

    pub fn command_lines(&self) -> Vec<&str> {
        self.members.iter().filter_map(|m| m.command_line.as_deref()).collect()
    }

    pub fn return_codes(&self) -> Vec<Option<i32>> {
        self.members.iter().map(|m| m.return_code).collect()
    }

    pub fn output(&self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        for member in &self.members {
            lines.extend_from_slice(member.output()?);
        }
        Ok(lines)
    }

    pub fn errors(&self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        for member in &self.members {
            lines.extend_from_slice(member.errors()?);
        }
        Ok(lines)
    }
}

impl TransactionView for MergedTransaction {
    fn ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.members.iter().filter_map(|m| m.id).collect();
        ids.sort_unstable();
        ids
    }

    fn actions(&self) -> Result<&[PackageAction]> {
        Ok(&self.actions)
    }

    fn group_actions(&self) -> Result<&[GroupAction]> {
        Ok(&self.group_actions)
    }

    fn environment_actions(&self) -> Result<&[EnvironmentAction]> {
        Ok(&self.environment_actions)
    }
}
