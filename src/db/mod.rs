// src/db/mod.rs

//! SQLite storage
//!
//! One database holds the transaction history, the installed group and
//! environment state and the package snapshot replay resolves against.

pub mod history;
pub mod packages;
pub mod schema;

pub use history::SqliteHistory;
pub use packages::PackageSnapshot;

use crate::history::HistoryStore;
use crate::error::{Error, Result};
use crate::history::TransactionRecord;
use crate::replay::{StagedComps, TransactionItem};
use rusqlite::Connection;
use std::path::Path;
use tracing::{debug, info};

fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    Ok(())
}

/// Create the database file and bring its schema up to date
pub fn init(db_path: &str) -> Result<()> {
    let path = Path::new(db_path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::InitError(format!(
                "Failed to create database directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    info!("Initializing database at {}", db_path);
    let conn = Connection::open(path)?;
    configure(&conn)?;
    schema::migrate(&conn)?;
    Ok(())
}

/// Open an existing database, migrating it if needed
pub fn open(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        return Err(Error::NotFoundError(format!(
            "Database not found at {}. Run 'reprise init' first.",
            db_path
        )));
    }

    debug!("Opening database at {}", db_path);
    let conn = Connection::open(db_path)?;
    configure(&conn)?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Open a private in-memory database with the current schema
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Run `f` in a transaction of its own, or inside the one already open on `conn`
///
/// Writes that must land together with others open the outer transaction
/// themselves; nested calls then join it instead of committing early.
pub fn with_transaction<T, F>(conn: &Connection, f: F) -> Result<T>
where
    F: FnOnce(&Connection) -> Result<T>,
{
    if !conn.is_autocommit() {
        return f(conn);
    }
    let tx = conn.unchecked_transaction()?;
    let result = f(&tx)?;
    tx.commit()?;
    Ok(result)
}

/// Apply a resolved replay and append its record in one database transaction
///
/// Nothing is written unless every step succeeds: the installed snapshot,
/// the staged group and environment changes and the new history entry.
pub fn record_replay(
    snapshot: &PackageSnapshot,
    history: &SqliteHistory,
    comps: StagedComps<SqliteHistory>,
    items: &[TransactionItem],
    mut record: TransactionRecord,
) -> Result<i64> {
    let tx = history.connection().unchecked_transaction()?;
    snapshot.apply(items)?;
    comps.commit()?;
    record.finish(snapshot.rpmdb_version()?, 0);
    let id = history.append(&record)?;
    tx.commit()?;
    info!("Recorded transaction {} with {} items", id, items.len());
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{ActionKind, CompsGroup, PackageTypes, Reason};
    use crate::replay::{CompsHistory, Package};
    use crate::version::Nevra;
    use std::rc::Rc;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("nested/dir/reprise.db");
        let db_path = db_path.to_str().unwrap();

        init(db_path).unwrap();
        assert!(Path::new(db_path).exists());
        open(db_path).unwrap();
    }

    #[test]
    fn test_open_missing_database() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("missing.db");
        let err = open(db_path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, Error::NotFoundError(_)));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let conn = open_in_memory().unwrap();
        let result: Result<()> = with_transaction(&conn, |conn| {
            conn.execute(
                "INSERT INTO comps_catalog (kind, comps_id) VALUES ('group', 'core')",
                [],
            )?;
            Err(Error::InitError("abort".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = conn
            .query_row("SELECT count(*) FROM comps_catalog", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    fn replay_parts() -> (PackageSnapshot, SqliteHistory, StagedComps<SqliteHistory>, Vec<TransactionItem>) {
        let conn = Rc::new(open_in_memory().unwrap());
        let history = SqliteHistory::new(conn.clone());
        let snapshot = PackageSnapshot::new(conn, Vec::<String>::new());
        let mut comps = StagedComps::new(history.clone());
        comps
            .save_group(&CompsGroup::new("core", PackageTypes::MANDATORY))
            .unwrap();
        let items = vec![TransactionItem {
            package: Package::new(Nevra::parse("foo-1.0-1.x86_64").unwrap(), "fedora"),
            action: ActionKind::Install,
            reason: Reason::User,
        }];
        (snapshot, history, comps, items)
    }

    #[test]
    fn test_record_replay_commits_everything() {
        let (snapshot, history, comps, items) = replay_parts();
        let record = TransactionRecord::begin(snapshot.rpmdb_version().unwrap(), "replay");

        let id = record_replay(&snapshot, &history, comps, &items, record).unwrap();

        let stored = history.find_by_id(id).unwrap().unwrap();
        assert_eq!(stored.end_db_version, Some(snapshot.rpmdb_version().unwrap()));
        assert!(snapshot.list().unwrap().iter().any(|p| p.is_installed()));
        assert!(history.get_group("core").unwrap().is_some());
    }

    #[test]
    fn test_record_replay_leaves_nothing_behind_on_failure() {
        let (snapshot, history, comps, items) = replay_parts();
        let before = snapshot.rpmdb_version().unwrap();
        let mut record = TransactionRecord::begin(before.clone(), "replay");
        // Appending a record that already has an id fails after the snapshot moved
        record.id = Some(7);

        assert!(record_replay(&snapshot, &history, comps, &items, record).is_err());

        assert_eq!(snapshot.rpmdb_version().unwrap(), before);
        assert!(history.get_group("core").unwrap().is_none());
        assert!(history.is_empty().unwrap());
        assert!(history.connection().is_autocommit());
    }

    #[test]
    fn test_nested_transaction_joins_outer() {
        let conn = open_in_memory().unwrap();
        {
            let outer = conn.unchecked_transaction().unwrap();
            with_transaction(&conn, |conn| {
                conn.execute(
                    "INSERT INTO comps_catalog (kind, comps_id) VALUES ('group', 'core')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
            assert!(!conn.is_autocommit());
            drop(outer);
        }

        let count: i64 = conn
            .query_row("SELECT count(*) FROM comps_catalog", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
