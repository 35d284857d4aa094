// src/replay/engine.rs

//! Replay engine
//!
//! Turns a replay document back into install, erase and reason requests
//! against the current system. Problems with individual entries are
//! collected over the whole document and raised together, unless the
//! matching tolerance flag turns them into warnings.

use super::collab::{Package, ReplayContext, TransactionItem};
use super::document::{ReplayDocument, RpmEntry};
use super::error::{ProblemKind, ReplayProblem, TransactionReplayError};
use crate::error::{Error, Result};
use crate::history::{
    ActionKind, EnvironmentAction, GroupAction, Reason, SYSTEM_REPO, TransactionView,
};
use crate::version::Nevra;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// Tolerance policy of a replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayOptions {
    /// Accept packages the resolver adds beyond the document
    pub ignore_extras: bool,
    /// Accept entries that disagree with what is installed
    pub ignore_installed: bool,
    /// Skip entries whose package, group or environment cannot be found
    pub skip_unavailable: bool,
    /// Fail the whole install request when one candidate cannot be installed
    pub strict: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            ignore_extras: false,
            ignore_installed: false,
            skip_unavailable: false,
            strict: true,
        }
    }
}

#[derive(Debug, Default)]
struct ReplayState {
    /// NEVRAs the document accounts for
    seen: HashSet<Nevra>,
    /// Reasons to restore once the transaction is resolved
    reasons: HashMap<Nevra, Reason>,
    warnings: Vec<String>,
    problems: Vec<ReplayProblem>,
}

impl ReplayState {
    fn raise_or_warn(&mut self, options: &ReplayOptions, problem: ReplayProblem) {
        if problem.kind.tolerated_by(options) {
            let message = problem.to_string();
            warn!("{}", message);
            self.warnings.push(message);
        } else {
            debug!("Replay problem: {}", problem);
            self.problems.push(problem);
        }
    }
}

/// Replays one document
#[derive(Debug)]
pub struct TransactionReplay {
    source_name: String,
    document: ReplayDocument,
    options: ReplayOptions,
    state: ReplayState,
}

impl TransactionReplay {
    pub fn new(source_name: impl Into<String>, document: ReplayDocument, options: ReplayOptions) -> Self {
        Self {
            source_name: source_name.into(),
            document,
            options,
            state: ReplayState::default(),
        }
    }

    /// Replay a document stored as a file
    pub fn from_file(path: &Path, options: ReplayOptions) -> Result<Self> {
        let document = ReplayDocument::read_from(path)?;
        Ok(Self::new(path.display().to_string(), document, options))
    }

    /// Replay a stored, merged or live transaction without a file in between
    pub fn from_view(
        view: &dyn TransactionView,
        source_name: impl Into<String>,
        options: ReplayOptions,
    ) -> Result<Self> {
        let document = ReplayDocument::from_view(view)?;
        Ok(Self::new(source_name, document, options))
    }

    pub fn document(&self) -> &ReplayDocument {
        &self.document
    }

    pub fn options(&self) -> &ReplayOptions {
        &self.options
    }

    /// Problems that were tolerated, in the order they were found
    pub fn warnings(&self) -> &[String] {
        &self.state.warnings
    }

    /// Issue every request of the document to the collaborators
    pub fn run(&mut self, ctx: &mut ReplayContext<'_>) -> Result<()> {
        info!(
            "Replaying {} package, {} group and {} environment entries from {}",
            self.document.rpms.len(),
            self.document.groups.len(),
            self.document.environments.len(),
            self.source_name
        );

        for entry in &self.document.rpms {
            replay_package(&self.options, &mut self.state, entry, ctx)?;
        }
        for entry in &self.document.groups {
            replay_group(&self.options, &mut self.state, entry, ctx)?;
        }
        for entry in &self.document.environments {
            replay_environment(&self.options, &mut self.state, entry, ctx)?;
        }

        self.raise_problems()
    }

    /// Check and adjust the resolved transaction
    ///
    /// Packages the document does not account for are extras. Reasons
    /// recorded in the document are restored onto the matching items.
    pub fn post_transaction(&mut self, items: &mut [TransactionItem]) -> Result<()> {
        for item in items.iter_mut() {
            if item.action == ActionKind::ReasonChange {
                continue;
            }
            let nevra = &item.package.nevra;

            if !self.state.seen.contains(nevra) {
                let side_effect = matches!(
                    item.action,
                    ActionKind::Upgraded | ActionKind::Downgraded | ActionKind::Reinstalled
                );
                if self.options.ignore_installed && side_effect {
                    debug!("Accepting {} {} as a side effect", item.action, nevra);
                    continue;
                }
                let problem = ReplayProblem::new(
                    ProblemKind::UnexpectedExtra,
                    nevra.to_string(),
                    item.action.as_str(),
                );
                self.state.raise_or_warn(&self.options, problem);
                continue;
            }

            if let Some(&reason) = self.state.reasons.get(nevra) {
                let overwrite = item.action.is_install_flavor()
                    || item.action == ActionKind::Erase
                    || reason.compare_specificity(&item.reason) == Ordering::Greater;
                if overwrite && item.reason != reason {
                    debug!("Restoring reason of {} to {}", nevra, reason);
                    item.reason = reason;
                }
            }
        }

        self.raise_problems()
    }

    fn raise_problems(&mut self) -> Result<()> {
        if self.state.problems.is_empty() {
            return Ok(());
        }
        Err(Error::Replay(TransactionReplayError {
            source_name: self.source_name.clone(),
            problems: std::mem::take(&mut self.state.problems),
        }))
    }
}

/// Narrow candidates to the recorded repo, keeping installed builds
fn pin_to_repo(candidates: Vec<Package>, repo_id: Option<&str>) -> Vec<Package> {
    let Some(repo_id) = repo_id.filter(|r| *r != SYSTEM_REPO) else {
        return candidates;
    };
    if !candidates.iter().any(|p| p.repo_id == repo_id) {
        return candidates;
    }
    candidates
        .into_iter()
        .filter(|p| p.repo_id == repo_id || p.is_installed())
        .collect()
}

fn replay_package(
    options: &ReplayOptions,
    state: &mut ReplayState,
    entry: &RpmEntry,
    ctx: &mut ReplayContext<'_>,
) -> Result<()> {
    let action = entry.action;
    let problem = |kind| ReplayProblem::new(kind, entry.nevra.as_str(), action.as_str());

    let nevra = match Nevra::parse(&entry.nevra) {
        Ok(nevra) => nevra,
        Err(e) => {
            debug!("{}", e);
            state.raise_or_warn(options, problem(ProblemKind::UnparsableNevra));
            return Ok(());
        }
    };

    let candidates = ctx
        .packages
        .resolve_packages(&nevra.name, &nevra.arch, Some(&nevra.evr()))?;
    let candidates = pin_to_repo(candidates, entry.repo_id.as_deref());
    if candidates.is_empty() {
        state.raise_or_warn(options, problem(ProblemKind::UnavailablePackage));
        return Ok(());
    }

    match action {
        ActionKind::Install
        | ActionKind::TrueInstall
        | ActionKind::DepInstall
        | ActionKind::Obsoleting
        | ActionKind::Upgrade
        | ActionKind::Downgrade => {
            if action.is_install_flavor() && !ctx.packages.is_installonly(&nevra.name) {
                let installed = ctx.packages.installed_packages(&|p: &Package| {
                    p.nevra.name == nevra.name && p.nevra.arch == nevra.arch
                })?;
                if !installed.is_empty() {
                    let tolerated = ProblemKind::AlreadyInstalled.tolerated_by(options);
                    state.raise_or_warn(options, problem(ProblemKind::AlreadyInstalled));
                    if !tolerated {
                        return Ok(());
                    }
                }
            }
            ctx.builder.request_install(&candidates, !options.strict)?;
        }
        ActionKind::Reinstall => {
            let available: Vec<Package> =
                candidates.into_iter().filter(|p| !p.is_installed()).collect();
            if available.is_empty() {
                state.raise_or_warn(options, problem(ProblemKind::UnavailablePackage));
                return Ok(());
            }
            ctx.builder.request_install(&available, !options.strict)?;
        }
        ActionKind::Upgraded
        | ActionKind::Downgraded
        | ActionKind::Reinstalled
        | ActionKind::Erase
        | ActionKind::Obsoleted => {
            let installed: Vec<Package> =
                candidates.into_iter().filter(Package::is_installed).collect();
            if installed.is_empty() {
                state.raise_or_warn(options, problem(ProblemKind::NotInstalled));
                return Ok(());
            }
            if action == ActionKind::Erase || !options.skip_unavailable {
                for package in &installed {
                    ctx.builder.request_erase(package, false)?;
                }
            }
        }
        ActionKind::ReasonChange => {
            ctx.builder.set_reason(&candidates[0], entry.reason)?;
            return Ok(());
        }
    }

    if action.is_incoming() || action == ActionKind::Erase {
        state.reasons.insert(nevra.clone(), entry.reason);
    }
    state.seen.insert(nevra);
    Ok(())
}

fn replay_group(
    options: &ReplayOptions,
    state: &mut ReplayState,
    entry: &GroupAction,
    ctx: &mut ReplayContext<'_>,
) -> Result<()> {
    let id = entry.group.id.as_str();
    let problem = |kind| ReplayProblem::new(kind, id, entry.action.as_str());

    match entry.action {
        ActionKind::Install => {
            if !ctx.packages.group_available(id)? {
                state.raise_or_warn(options, problem(ProblemKind::UnavailableGroup));
                return Ok(());
            }
            ctx.comps.save_group(&entry.group)?;
        }
        ActionKind::Upgrade
        | ActionKind::Upgraded
        | ActionKind::Downgrade
        | ActionKind::Downgraded => {
            if ctx.comps.get_group(id)?.is_none() {
                state.raise_or_warn(options, problem(ProblemKind::GroupNotInstalled));
                return Ok(());
            }
            ctx.comps.save_group(&entry.group)?;
        }
        ActionKind::Erase => {
            if ctx.comps.get_group(id)?.is_none() {
                state.raise_or_warn(options, problem(ProblemKind::GroupNotInstalled));
                return Ok(());
            }
            ctx.comps.remove_group(id)?;
        }
        _ => state.raise_or_warn(options, problem(ProblemKind::UnexpectedAction)),
    }
    Ok(())
}

fn replay_environment(
    options: &ReplayOptions,
    state: &mut ReplayState,
    entry: &EnvironmentAction,
    ctx: &mut ReplayContext<'_>,
) -> Result<()> {
    let id = entry.environment.id.as_str();
    let problem = |kind| ReplayProblem::new(kind, id, entry.action.as_str());

    match entry.action {
        ActionKind::Install => {
            if !ctx.packages.environment_available(id)? {
                state.raise_or_warn(options, problem(ProblemKind::UnavailableEnvironment));
                return Ok(());
            }
            ctx.comps.save_environment(&entry.environment)?;
        }
        ActionKind::Upgrade
        | ActionKind::Upgraded
        | ActionKind::Downgrade
        | ActionKind::Downgraded => {
            if ctx.comps.get_environment(id)?.is_none() {
                state.raise_or_warn(options, problem(ProblemKind::EnvironmentNotInstalled));
                return Ok(());
            }
            ctx.comps.save_environment(&entry.environment)?;
        }
        ActionKind::Erase => {
            if ctx.comps.get_environment(id)?.is_none() {
                state.raise_or_warn(options, problem(ProblemKind::EnvironmentNotInstalled));
                return Ok(());
            }
            ctx.comps.remove_environment(id)?;
        }
        _ => state.raise_or_warn(options, problem(ProblemKind::UnexpectedAction)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(nevra: &str, repo: &str) -> Package {
        Package::new(Nevra::parse(nevra).unwrap(), repo)
    }

    #[test]
    fn test_pin_to_repo_keeps_installed() {
        let candidates = vec![
            pkg("foo-1-1.x86_64", "fedora"),
            pkg("foo-1-1.x86_64", "updates"),
            pkg("foo-1-1.x86_64", SYSTEM_REPO),
        ];
        let pinned = pin_to_repo(candidates, Some("updates"));
        let repos: Vec<&str> = pinned.iter().map(|p| p.repo_id.as_str()).collect();
        assert_eq!(repos, vec!["updates", SYSTEM_REPO]);
    }

    #[test]
    fn test_pin_to_repo_ignores_unknown_repo() {
        let candidates = vec![pkg("foo-1-1.x86_64", "fedora")];
        assert_eq!(pin_to_repo(candidates.clone(), Some("copr")), candidates);
        assert_eq!(pin_to_repo(candidates.clone(), Some(SYSTEM_REPO)), candidates);
        assert_eq!(pin_to_repo(candidates.clone(), None), candidates);
    }

    #[test]
    fn test_default_options_are_strict() {
        let options = ReplayOptions::default();
        assert!(options.strict);
        assert!(!options.ignore_extras && !options.ignore_installed && !options.skip_unavailable);
    }
}
