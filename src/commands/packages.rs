// src/commands/packages.rs
//! Package snapshot maintenance

use super::Settings;
use anyhow::Result;
use reprise::db::PackageSnapshot;
use std::path::Path;
use tracing::info;

pub fn cmd_packages_import(settings: &Settings, file: &Path) -> Result<()> {
    info!("Importing package snapshot from {}", file.display());
    let (conn, _) = settings.open_db()?;
    let snapshot = PackageSnapshot::new(conn, settings.config.installonly.clone());

    let summary = snapshot.import_file(file)?;
    println!(
        "Imported {} package(s), {} group(s), {} environment(s)",
        summary.packages, summary.groups, summary.environments
    );
    println!("rpmdb version: {}", snapshot.rpmdb_version()?);
    Ok(())
}

pub fn cmd_packages_list(settings: &Settings, installed_only: bool) -> Result<()> {
    let (conn, _) = settings.open_db()?;
    let snapshot = PackageSnapshot::new(conn, settings.config.installonly.clone());

    let packages: Vec<_> = snapshot
        .list()?
        .into_iter()
        .filter(|p| !installed_only || p.is_installed())
        .collect();

    if packages.is_empty() {
        println!("No packages in the snapshot.");
        println!("\nUse 'reprise packages import FILE' to load one.");
        return Ok(());
    }

    println!("{:50}  REPO", "PACKAGE");
    println!("{}", "-".repeat(70));
    for package in &packages {
        println!("{:50}  {}", package.nevra.to_string(), package.repo_id);
    }
    println!("\nTotal: {} package(s)", packages.len());
    Ok(())
}
