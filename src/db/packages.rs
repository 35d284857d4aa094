// src/db/packages.rs

//! Package snapshot
//!
//! A local view of which package builds are installed (`@System`) and which
//! are offered by repositories, plus the group and environment ids comps
//! metadata knows about. Replays resolve against it, and recording a
//! planned transaction moves builds in and out of the installed set.

use super::with_transaction;
use crate::error::{Error, Result};
use crate::history::{ActionKind, SYSTEM_REPO};
use crate::replay::{Package, PackageSource, TransactionItem};
use crate::version::{Nevra, RpmVersion};
use rusqlite::{Connection, Row, params};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info};

const PACKAGE_COLUMNS: &str = "name, epoch, version, release, arch, repo_id";

fn package_from_row(row: &Row) -> rusqlite::Result<Package> {
    let nevra = Nevra::new(
        row.get::<_, String>(0)?,
        row.get::<_, i64>(1)? as u64,
        row.get::<_, String>(2)?,
        row.get::<_, String>(3)?,
        row.get::<_, String>(4)?,
    );
    Ok(Package::new(nevra, row.get::<_, String>(5)?))
}

/// One package line of an import file
#[derive(Debug, Deserialize)]
struct ImportPackage {
    nevra: String,
    repo_id: String,
}

/// Snapshot import file
///
/// `{"packages": [{"nevra": "...", "repo_id": "@System"}], "groups": ["core"], "environments": []}`
#[derive(Debug, Default, Deserialize)]
struct ImportFile {
    #[serde(default)]
    packages: Vec<ImportPackage>,
    #[serde(default)]
    groups: Vec<String>,
    #[serde(default)]
    environments: Vec<String>,
}

/// Counts of what an import added
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub packages: usize,
    pub groups: usize,
    pub environments: usize,
}

/// Package availability backed by the `package_snapshot` table
pub struct PackageSnapshot {
    conn: Rc<Connection>,
    installonly: HashSet<String>,
}

impl PackageSnapshot {
    pub fn new(conn: Rc<Connection>, installonly: impl IntoIterator<Item = String>) -> Self {
        Self {
            conn,
            installonly: installonly.into_iter().collect(),
        }
    }

    /// Record one build; adding a known build is a no-op
    pub fn add_package(&self, package: &Package) -> Result<()> {
        let nevra = &package.nevra;
        self.conn.execute(
            "INSERT OR IGNORE INTO package_snapshot (name, epoch, version, release, arch, repo_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &nevra.name,
                nevra.epoch as i64,
                &nevra.version,
                &nevra.release,
                &nevra.arch,
                &package.repo_id,
            ],
        )?;
        Ok(())
    }

    pub fn remove_package(&self, package: &Package) -> Result<()> {
        let nevra = &package.nevra;
        self.conn.execute(
            "DELETE FROM package_snapshot
             WHERE name = ?1 AND epoch = ?2 AND version = ?3 AND release = ?4 AND arch = ?5
               AND repo_id = ?6",
            params![
                &nevra.name,
                nevra.epoch as i64,
                &nevra.version,
                &nevra.release,
                &nevra.arch,
                &package.repo_id,
            ],
        )?;
        Ok(())
    }

    pub fn add_comps(&self, kind: &str, id: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO comps_catalog (kind, comps_id) VALUES (?1, ?2)",
            params![kind, id],
        )?;
        Ok(())
    }

    fn comps_known(&self, kind: &str, id: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT count(*) FROM comps_catalog WHERE kind = ?1 AND comps_id = ?2",
            params![kind, id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Every build in the snapshot, installed ones first
    pub fn list(&self) -> Result<Vec<Package>> {
        let sql = format!(
            "SELECT {PACKAGE_COLUMNS} FROM package_snapshot
             ORDER BY repo_id != ?1, name, arch, epoch, version, release"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let packages = stmt
            .query_map([SYSTEM_REPO], package_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(packages)
    }

    /// Version string of the installed set: `<count>:<sha256 of sorted NEVRAs>`
    pub fn rpmdb_version(&self) -> Result<String> {
        let mut nevras: Vec<String> = self
            .installed_packages(&|_| true)?
            .iter()
            .map(|p| p.nevra.to_string())
            .collect();
        nevras.sort();

        let mut hasher = Sha256::new();
        for nevra in &nevras {
            hasher.update(nevra.as_bytes());
            hasher.update(b"\n");
        }
        Ok(format!("{}:{}", nevras.len(), hex::encode(hasher.finalize())))
    }

    /// Load packages and comps ids from a JSON import file
    pub fn import_file(&self, path: &Path) -> Result<ImportSummary> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
        let file: ImportFile = serde_json::from_str(&text)?;

        let summary = with_transaction(&self.conn, |_| {
            let mut summary = ImportSummary::default();
            for entry in &file.packages {
                let nevra = Nevra::parse(&entry.nevra)?;
                self.add_package(&Package::new(nevra, entry.repo_id.clone()))?;
                summary.packages += 1;
            }
            for id in &file.groups {
                self.add_comps("group", id)?;
                summary.groups += 1;
            }
            for id in &file.environments {
                self.add_comps("environment", id)?;
                summary.environments += 1;
            }
            Ok(summary)
        })?;

        info!(
            "Imported {} packages, {} groups and {} environments from {}",
            summary.packages,
            summary.groups,
            summary.environments,
            path.display()
        );
        Ok(summary)
    }

    /// Move the builds of a recorded transaction in and out of `@System`
    pub fn apply(&self, items: &[TransactionItem]) -> Result<()> {
        with_transaction(&self.conn, |_| {
            for item in items {
                let installed = Package::installed(item.package.nevra.clone());
                if item.action.is_incoming() {
                    self.add_package(&installed)?;
                } else if item.action.is_outgoing() && item.action != ActionKind::Reinstalled {
                    self.remove_package(&installed)?;
                }
            }
            Ok(())
        })?;
        debug!("Applied {} items to the package snapshot", items.len());
        Ok(())
    }
}

impl PackageSource for PackageSnapshot {
    fn resolve_packages(
        &self,
        name: &str,
        arch: &str,
        evr: Option<&RpmVersion>,
    ) -> Result<Vec<Package>> {
        let sql = format!(
            "SELECT {PACKAGE_COLUMNS} FROM package_snapshot WHERE name = ?1 AND arch = ?2 ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let packages = stmt
            .query_map(params![name, arch], package_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(match evr {
            Some(evr) => packages
                .into_iter()
                .filter(|p| p.nevra.evr().compare(evr).is_eq())
                .collect(),
            None => packages,
        })
    }

    fn installed_packages(&self, filter: &dyn Fn(&Package) -> bool) -> Result<Vec<Package>> {
        let sql = format!("SELECT {PACKAGE_COLUMNS} FROM package_snapshot WHERE repo_id = ?1 ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let packages = stmt
            .query_map([SYSTEM_REPO], package_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(packages.into_iter().filter(|p| filter(p)).collect())
    }

    fn is_installonly(&self, name: &str) -> bool {
        self.installonly.contains(name)
    }

    fn group_available(&self, id: &str) -> Result<bool> {
        self.comps_known("group", id)
    }

    fn environment_available(&self, id: &str) -> Result<bool> {
        self.comps_known("environment", id)
    }
}
