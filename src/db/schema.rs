// src/db/schema.rs

//! Database schema definitions and migrations
//!
//! This module defines the SQLite schema for the history tables, the
//! persisted group/environment state and the package snapshot, and provides
//! a migration system to evolve the schema over time.

use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!("Schema migration complete. Now at version {}", SCHEMA_VERSION);
    Ok(())
}

fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        2 => migrate_v2(conn),
        _ => Err(Error::InitError(format!(
            "Unknown migration version: {}",
            version
        ))),
    }
}

/// Initial schema - Version 1
///
/// Transaction history:
/// - trans: one row per transaction with its header fields
/// - trans_item: package actions in recorded order
/// - trans_group_item / trans_group_member: group actions and their packages
/// - trans_env_item / trans_env_member: environment actions and their groups
/// - trans_output: console lines (fd 1 output, fd 2 errors)
/// - trans_extra: stored fields without a typed column
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        CREATE TABLE trans (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            begin_timestamp INTEGER NOT NULL,
            end_timestamp INTEGER,
            begin_db_version TEXT NOT NULL,
            end_db_version TEXT,
            login_user TEXT,
            command_line TEXT,
            return_code INTEGER,
            releasever TEXT
        );

        CREATE INDEX idx_trans_begin ON trans(begin_timestamp);

        CREATE TABLE trans_item (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            trans_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            action TEXT NOT NULL,
            name TEXT NOT NULL,
            epoch INTEGER NOT NULL DEFAULT 0,
            version TEXT NOT NULL,
            release TEXT NOT NULL,
            arch TEXT NOT NULL,
            reason TEXT NOT NULL,
            repo_id TEXT,
            done INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY (trans_id) REFERENCES trans(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_trans_item_trans ON trans_item(trans_id);
        CREATE INDEX idx_trans_item_name ON trans_item(name, arch);

        CREATE TABLE trans_group_item (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            trans_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            action TEXT NOT NULL,
            group_id TEXT NOT NULL,
            package_types INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (trans_id) REFERENCES trans(id) ON DELETE CASCADE
        );

        CREATE TABLE trans_group_member (
            item_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            installed INTEGER NOT NULL,
            package_type INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (item_id, position),
            FOREIGN KEY (item_id) REFERENCES trans_group_item(id) ON DELETE CASCADE
        );

        CREATE TABLE trans_env_item (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            trans_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            action TEXT NOT NULL,
            env_id TEXT NOT NULL,
            package_types INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (trans_id) REFERENCES trans(id) ON DELETE CASCADE
        );

        CREATE TABLE trans_env_member (
            item_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            group_id TEXT NOT NULL,
            installed INTEGER NOT NULL,
            group_type INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (item_id, position),
            FOREIGN KEY (item_id) REFERENCES trans_env_item(id) ON DELETE CASCADE
        );

        CREATE TABLE trans_output (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            trans_id INTEGER NOT NULL,
            fd INTEGER NOT NULL CHECK(fd IN (1, 2)),
            line TEXT NOT NULL,
            FOREIGN KEY (trans_id) REFERENCES trans(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_trans_output_trans ON trans_output(trans_id, fd);

        CREATE TABLE trans_extra (
            trans_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (trans_id, name),
            FOREIGN KEY (trans_id) REFERENCES trans(id) ON DELETE CASCADE
        );
        ",
    )?;

    Ok(())
}

/// Version 2: installed group state and the package snapshot
///
/// - comps_group / comps_group_package: groups currently installed
/// - comps_environment / comps_environment_group: environments currently installed
/// - package_snapshot: package builds known to be installed or available
/// - comps_catalog: group and environment ids known to comps metadata
fn migrate_v2(conn: &Connection) -> Result<()> {
    debug!("Migrating to schema version 2");

    conn.execute_batch(
        "
        CREATE TABLE comps_group (
            group_id TEXT PRIMARY KEY,
            package_types INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE comps_group_package (
            group_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            installed INTEGER NOT NULL,
            package_type INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (group_id, position),
            FOREIGN KEY (group_id) REFERENCES comps_group(group_id) ON DELETE CASCADE
        );

        CREATE TABLE comps_environment (
            env_id TEXT PRIMARY KEY,
            package_types INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE comps_environment_group (
            env_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            group_id TEXT NOT NULL,
            installed INTEGER NOT NULL,
            group_type INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (env_id, position),
            FOREIGN KEY (env_id) REFERENCES comps_environment(env_id) ON DELETE CASCADE
        );

        CREATE TABLE package_snapshot (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            epoch INTEGER NOT NULL DEFAULT 0,
            version TEXT NOT NULL,
            release TEXT NOT NULL,
            arch TEXT NOT NULL,
            repo_id TEXT NOT NULL,
            UNIQUE(name, epoch, version, release, arch, repo_id)
        );

        CREATE INDEX idx_package_snapshot_name ON package_snapshot(name, arch);

        CREATE TABLE comps_catalog (
            kind TEXT NOT NULL CHECK(kind IN ('group', 'environment')),
            comps_id TEXT NOT NULL,
            PRIMARY KEY (kind, comps_id)
        );
        ",
    )?;

    Ok(())
}
