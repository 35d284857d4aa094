// src/replay/plan.rs

//! Dependency-free transaction planning
//!
//! [`PlanningBuilder`] turns replay requests into transaction items by
//! comparing each requested build with what is installed under the same
//! name and architecture. It never pulls in dependencies, so a plan only
//! contains what was asked for. The CLI uses it to show and record what a
//! replay would do.

use super::collab::{Package, PackageSource, TransactionBuilder, TransactionItem};
use crate::error::{Error, Result};
use crate::history::{ActionKind, Reason};
use std::cmp::Ordering;
use tracing::debug;

pub struct PlanningBuilder<'a> {
    source: &'a dyn PackageSource,
    items: Vec<TransactionItem>,
}

impl<'a> PlanningBuilder<'a> {
    pub fn new(source: &'a dyn PackageSource) -> Self {
        Self {
            source,
            items: Vec::new(),
        }
    }

    fn push(&mut self, package: &Package, action: ActionKind, reason: Reason) {
        self.items.push(TransactionItem {
            package: package.clone(),
            action,
            reason,
        });
    }

    fn has_item(&self, package: &Package, outgoing: bool) -> bool {
        self.items.iter().any(|item| {
            item.package.nevra == package.nevra && item.action.is_outgoing() == outgoing
        })
    }
}

impl TransactionBuilder for PlanningBuilder<'_> {
    fn request_install(&mut self, candidates: &[Package], optional: bool) -> Result<()> {
        let Some(target) = candidates.iter().find(|p| !p.is_installed()).cloned() else {
            if candidates.is_empty() && !optional {
                return Err(Error::NotFoundError("No candidate to install".to_string()));
            }
            debug!("Every candidate is already installed");
            return Ok(());
        };
        if self.has_item(&target, false) {
            return Ok(());
        }

        let name = target.nevra.name.clone();
        let arch = target.nevra.arch.clone();
        let installed = self
            .source
            .installed_packages(&|p: &Package| p.nevra.name == name && p.nevra.arch == arch)?;

        if installed.is_empty() || self.source.is_installonly(&name) {
            self.push(&target, ActionKind::Install, Reason::Unknown);
            return Ok(());
        }

        // Replace the newest installed build
        let Some(replaced) = installed.iter().max_by(|a, b| a.nevra.compare_evr(&b.nevra)) else {
            return Ok(());
        };
        let (incoming, outgoing) = match target.nevra.compare_evr(&replaced.nevra) {
            Ordering::Greater => (ActionKind::Upgrade, ActionKind::Upgraded),
            Ordering::Less => (ActionKind::Downgrade, ActionKind::Downgraded),
            Ordering::Equal => (ActionKind::Reinstall, ActionKind::Reinstalled),
        };
        self.push(&target, incoming, Reason::Unknown);
        if !self.has_item(replaced, true) {
            self.push(replaced, outgoing, Reason::Unknown);
        }
        Ok(())
    }

    fn request_erase(&mut self, package: &Package, _clean_deps: bool) -> Result<()> {
        if !self.has_item(package, true) {
            self.push(package, ActionKind::Erase, Reason::Unknown);
        }
        Ok(())
    }

    fn set_reason(&mut self, package: &Package, reason: Reason) -> Result<()> {
        match self
            .items
            .iter_mut()
            .find(|item| item.package.nevra == package.nevra && !item.action.is_outgoing())
        {
            Some(item) => item.reason = reason,
            None => self.push(package, ActionKind::ReasonChange, reason),
        }
        Ok(())
    }

    fn resolve(&mut self) -> Result<Vec<TransactionItem>> {
        Ok(self.items.clone())
    }
}
