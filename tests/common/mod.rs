// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use reprise::db::{self, SqliteHistory};
use reprise::history::{
    ActionKind, CompsEnvironment, CompsGroup, HistoryStore, PackageAction, Reason,
    TransactionRecord,
};
use reprise::replay::{
    CompsHistory, Package, PackageSource, TransactionBuilder, TransactionItem,
};
use reprise::{Nevra, RpmVersion};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tempfile::TempDir;

pub fn nevra(s: &str) -> Nevra {
    Nevra::parse(s).unwrap()
}

pub fn pkg(s: &str, repo: &str) -> Package {
    Package::new(nevra(s), repo)
}

pub fn action(kind: ActionKind, s: &str, reason: Reason, repo: &str) -> PackageAction {
    PackageAction::new(kind, nevra(s), reason).with_repo(repo)
}

/// Create an initialized database in a temp dir.
///
/// Returns (TempDir, history) - keep the TempDir alive to prevent cleanup.
pub fn setup_history() -> (TempDir, SqliteHistory) {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir
        .path()
        .join("reprise.db")
        .to_str()
        .unwrap()
        .to_string();

    db::init(&db_path).unwrap();
    let history = SqliteHistory::new(Rc::new(db::open(&db_path).unwrap()));
    (temp_dir, history)
}

/// Append a finished transaction that moved the rpmdb from `begin` to `end`
pub fn store_transaction(
    history: &SqliteHistory,
    minute: u32,
    begin: &str,
    end: &str,
    actions: Vec<PackageAction>,
) -> i64 {
    let started = Utc.with_ymd_and_hms(2026, 3, 1, 10, minute, 0).unwrap();
    let mut record = TransactionRecord::begin_at(started, begin);
    record.command_line = Some(format!("test transaction {}", minute));
    record.login_user = Some("root".to_string());
    for action in actions {
        record.add_action(action).unwrap();
    }
    record.finish_at(started + chrono::Duration::seconds(30), end, 0);
    history.append(&record).unwrap()
}

/// In-memory package availability
#[derive(Default)]
pub struct FakePackages {
    pub packages: Vec<Package>,
    pub installonly: HashSet<String>,
    pub groups: HashSet<String>,
    pub environments: HashSet<String>,
}

impl FakePackages {
    pub fn with(packages: &[(&str, &str)]) -> Self {
        Self {
            packages: packages.iter().map(|(n, r)| pkg(n, r)).collect(),
            ..Self::default()
        }
    }
}

impl PackageSource for FakePackages {
    fn resolve_packages(
        &self,
        name: &str,
        arch: &str,
        evr: Option<&RpmVersion>,
    ) -> reprise::Result<Vec<Package>> {
        Ok(self
            .packages
            .iter()
            .filter(|p| p.nevra.name == name && p.nevra.arch == arch)
            .filter(|p| evr.is_none_or(|evr| p.nevra.evr().compare(evr).is_eq()))
            .cloned()
            .collect())
    }

    fn installed_packages(
        &self,
        filter: &dyn Fn(&Package) -> bool,
    ) -> reprise::Result<Vec<Package>> {
        Ok(self
            .packages
            .iter()
            .filter(|p| p.is_installed() && filter(p))
            .cloned()
            .collect())
    }

    fn is_installonly(&self, name: &str) -> bool {
        self.installonly.contains(name)
    }

    fn group_available(&self, id: &str) -> reprise::Result<bool> {
        Ok(self.groups.contains(id))
    }

    fn environment_available(&self, id: &str) -> reprise::Result<bool> {
        Ok(self.environments.contains(id))
    }
}

/// Builder that records requests and resolves them verbatim, plus `extras`
pub struct FakeBuilder {
    pub default_reason: Reason,
    pub extras: Vec<TransactionItem>,
    pub items: Vec<TransactionItem>,
}

impl FakeBuilder {
    pub fn new(default_reason: Reason) -> Self {
        Self {
            default_reason,
            extras: Vec::new(),
            items: Vec::new(),
        }
    }
}

impl TransactionBuilder for FakeBuilder {
    fn request_install(&mut self, candidates: &[Package], optional: bool) -> reprise::Result<()> {
        match candidates.iter().find(|p| !p.is_installed()).or(candidates.first()) {
            Some(package) => {
                self.items.push(TransactionItem {
                    package: package.clone(),
                    action: ActionKind::Install,
                    reason: self.default_reason,
                });
                Ok(())
            }
            None if optional => Ok(()),
            None => Err(reprise::Error::NotFoundError("no candidates".to_string())),
        }
    }

    fn request_erase(&mut self, package: &Package, _clean_deps: bool) -> reprise::Result<()> {
        self.items.push(TransactionItem {
            package: package.clone(),
            action: ActionKind::Erase,
            reason: self.default_reason,
        });
        Ok(())
    }

    fn set_reason(&mut self, package: &Package, reason: Reason) -> reprise::Result<()> {
        self.items.push(TransactionItem {
            package: package.clone(),
            action: ActionKind::ReasonChange,
            reason,
        });
        Ok(())
    }

    fn resolve(&mut self) -> reprise::Result<Vec<TransactionItem>> {
        let mut items = self.items.clone();
        items.extend(self.extras.iter().cloned());
        Ok(items)
    }
}

/// In-memory installed group state
#[derive(Default)]
pub struct FakeComps {
    pub groups: HashMap<String, CompsGroup>,
    pub environments: HashMap<String, CompsEnvironment>,
}

impl CompsHistory for FakeComps {
    fn get_group(&self, id: &str) -> reprise::Result<Option<CompsGroup>> {
        Ok(self.groups.get(id).cloned())
    }

    fn save_group(&mut self, group: &CompsGroup) -> reprise::Result<()> {
        self.groups.insert(group.id.clone(), group.clone());
        Ok(())
    }

    fn remove_group(&mut self, id: &str) -> reprise::Result<()> {
        self.groups.remove(id);
        Ok(())
    }

    fn get_environment(&self, id: &str) -> reprise::Result<Option<CompsEnvironment>> {
        Ok(self.environments.get(id).cloned())
    }

    fn save_environment(&mut self, environment: &CompsEnvironment) -> reprise::Result<()> {
        self.environments
            .insert(environment.id.clone(), environment.clone());
        Ok(())
    }

    fn remove_environment(&mut self, id: &str) -> reprise::Result<()> {
        self.environments.remove(id);
        Ok(())
    }
}
