// src/replay/collab.rs

//! Collaborator interfaces used by replay
//!
//! Package availability, dependency resolution and the persisted group
//! state all live outside the replay engine. It only talks to them through
//! these traits, and every caller passes them in explicitly.

use crate::error::Result;
use crate::history::{ActionKind, CompsEnvironment, CompsGroup, Reason, SYSTEM_REPO};
use crate::version::{Nevra, RpmVersion};
use std::fmt;

/// A package build as offered by a repository or the installed system
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Package {
    pub nevra: Nevra,
    /// `@System` for installed packages
    pub repo_id: String,
}

impl Package {
    pub fn new(nevra: Nevra, repo_id: impl Into<String>) -> Self {
        Self {
            nevra,
            repo_id: repo_id.into(),
        }
    }

    pub fn installed(nevra: Nevra) -> Self {
        Self::new(nevra, SYSTEM_REPO)
    }

    pub fn is_installed(&self) -> bool {
        self.repo_id == SYSTEM_REPO
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.nevra, self.repo_id)
    }
}

/// One step of a resolved transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionItem {
    pub package: Package,
    pub action: ActionKind,
    pub reason: Reason,
}

/// Package availability and installed-state queries
pub trait PackageSource {
    /// Builds of `name` for `arch`; with `evr`, only that exact build
    ///
    /// Installed builds are included with the `@System` repo id.
    fn resolve_packages(
        &self,
        name: &str,
        arch: &str,
        evr: Option<&RpmVersion>,
    ) -> Result<Vec<Package>>;

    fn installed_packages(&self, filter: &dyn Fn(&Package) -> bool) -> Result<Vec<Package>>;

    /// Packages that may be installed in several versions at once
    fn is_installonly(&self, name: &str) -> bool;

    fn group_available(&self, id: &str) -> Result<bool>;
    fn environment_available(&self, id: &str) -> Result<bool>;
}

/// Collects requests and resolves them into a transaction
pub trait TransactionBuilder {
    /// Install one of `candidates`; with `optional`, failing to do so is not an error
    fn request_install(&mut self, candidates: &[Package], optional: bool) -> Result<()>;
    fn request_erase(&mut self, package: &Package, clean_deps: bool) -> Result<()>;
    fn set_reason(&mut self, package: &Package, reason: Reason) -> Result<()>;
    fn resolve(&mut self) -> Result<Vec<TransactionItem>>;
}

/// Persisted state of installed groups and environments
pub trait CompsHistory {
    fn get_group(&self, id: &str) -> Result<Option<CompsGroup>>;
    fn save_group(&mut self, group: &CompsGroup) -> Result<()>;
    fn remove_group(&mut self, id: &str) -> Result<()>;

    fn get_environment(&self, id: &str) -> Result<Option<CompsEnvironment>>;
    fn save_environment(&mut self, environment: &CompsEnvironment) -> Result<()>;
    fn remove_environment(&mut self, id: &str) -> Result<()>;
}

/// Collaborators of one replay run
pub struct ReplayContext<'a> {
    pub packages: &'a dyn PackageSource,
    pub builder: &'a mut dyn TransactionBuilder,
    pub comps: &'a mut dyn CompsHistory,
}

impl<'a> ReplayContext<'a> {
    pub fn new(
        packages: &'a dyn PackageSource,
        builder: &'a mut dyn TransactionBuilder,
        comps: &'a mut dyn CompsHistory,
    ) -> Self {
        Self {
            packages,
            builder,
            comps,
        }
    }
}
