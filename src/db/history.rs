// src/db/history.rs

//! SQLite-backed history store
//!
//! Header fields are read with the record row; action lists and console
//! lines are loaded by the record itself on first access through the
//! [`HistoryStore`] methods. Timestamps are stored as Unix seconds.

use super::with_transaction;
use crate::error::{Error, Result};
use crate::history::{
    ActionKind, CompsEnvironment, CompsGroup, ConsoleStream, EnvironmentAction, GroupAction,
    HistoryStore, PackageAction, PackageTypes, Reason, TransactionRecord,
};
use crate::replay::CompsHistory;
use crate::version::Nevra;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::rc::Rc;
use std::str::FromStr;
use tracing::debug;

const RECORD_COLUMNS: &str = "id, begin_timestamp, end_timestamp, begin_db_version, end_db_version,
     login_user, command_line, return_code, releasever";

/// Transaction history over a shared SQLite connection
///
/// Cloning is cheap; clones share the connection.
#[derive(Clone)]
pub struct SqliteHistory {
    conn: Rc<Connection>,
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Parse a text column with the type's `FromStr`
fn parse_column<T: FromStr<Err = String>>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    text.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}

fn types_column(row: &Row, idx: usize) -> rusqlite::Result<PackageTypes> {
    let bits: i64 = row.get(idx)?;
    let bits = u8::try_from(bits).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Integer, Box::new(e))
    })?;
    Ok(PackageTypes::from_bits_truncate(bits))
}

fn record_from_row(row: &Row) -> rusqlite::Result<TransactionRecord> {
    let mut record = TransactionRecord::begin_at(timestamp(row.get(1)?), row.get::<_, String>(3)?);
    record.id = Some(row.get(0)?);
    record.end_timestamp = row.get::<_, Option<i64>>(2)?.map(timestamp);
    record.end_db_version = row.get(4)?;
    record.login_user = row.get(5)?;
    record.command_line = row.get(6)?;
    record.return_code = row.get(7)?;
    record.releasever = row.get(8)?;
    Ok(record)
}

fn action_from_row(row: &Row) -> rusqlite::Result<PackageAction> {
    let nevra = Nevra::new(
        row.get::<_, String>(1)?,
        row.get::<_, i64>(2)? as u64,
        row.get::<_, String>(3)?,
        row.get::<_, String>(4)?,
        row.get::<_, String>(5)?,
    );
    Ok(PackageAction {
        action: parse_column(row, 0)?,
        nevra,
        reason: parse_column(row, 6)?,
        repo_id: row.get::<_, Option<String>>(7)?.filter(|r| !r.is_empty()),
        done: row.get(8)?,
    })
}

impl SqliteHistory {
    pub fn new(conn: Rc<Connection>) -> Self {
        Self { conn }
    }

    /// Open the database at `db_path` with its own connection
    pub fn open(db_path: &str) -> Result<Self> {
        Ok(Self::new(Rc::new(super::open(db_path)?)))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn store(&self) -> Rc<dyn HistoryStore> {
        Rc::new(self.clone())
    }

    /// Fill in extras and altered flags, then bind the record to this store
    fn finish_record(&self, mut record: TransactionRecord) -> Result<TransactionRecord> {
        let id = record.id.ok_or_else(|| {
            Error::InitError("Stored transaction without ID".to_string())
        })?;

        let mut stmt = self
            .conn
            .prepare("SELECT name, value FROM trans_extra WHERE trans_id = ?1 ORDER BY name")?;
        let extras = stmt
            .query_map([id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        record.extra.extend(extras);

        let previous_end: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT end_db_version FROM trans WHERE id < ?1 ORDER BY id DESC LIMIT 1",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(previous_end) = previous_end {
            record.altered_before_rpmdb =
                previous_end.as_deref() != Some(record.begin_db_version.as_str());
        }

        let next_begin: Option<String> = self
            .conn
            .query_row(
                "SELECT begin_db_version FROM trans WHERE id > ?1 ORDER BY id ASC LIMIT 1",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(next_begin) = next_begin {
            record.altered_after_rpmdb = record.end_db_version.as_deref() != Some(next_begin.as_str());
        }

        Ok(record.attach(id, self.store()))
    }

    fn select_records(&self, clause: &str, params: impl rusqlite::Params) -> Result<Vec<TransactionRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM trans {clause}");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params, record_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut records = rows
            .into_iter()
            .map(|record| self.finish_record(record))
            .collect::<Result<Vec<_>>>()?;
        records.sort();
        Ok(records)
    }

    /// Find a transaction by ID
    pub fn find_by_id(&self, id: i64) -> Result<Option<TransactionRecord>> {
        Ok(self.select_records("WHERE id = ?1", [id])?.into_iter().next())
    }

    /// Whether any transaction has been recorded yet
    pub fn is_empty(&self) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row("SELECT count(*) FROM trans", [], |row| row.get(0))?;
        Ok(count == 0)
    }

    fn load_group_members(&self, item_id: i64, group: &mut CompsGroup) -> Result<()> {
        let mut stmt = self.conn.prepare(
            "SELECT name, installed, package_type FROM trans_group_member
             WHERE item_id = ?1 ORDER BY position",
        )?;
        let members = stmt.query_map([item_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?, types_column(row, 2)?))
        })?;
        for member in members {
            let (name, installed, package_type) = member?;
            group.add_package(name, installed, package_type);
        }
        Ok(())
    }

    fn load_environment_members(&self, item_id: i64, environment: &mut CompsEnvironment) -> Result<()> {
        let mut stmt = self.conn.prepare(
            "SELECT group_id, installed, group_type FROM trans_env_member
             WHERE item_id = ?1 ORDER BY position",
        )?;
        let members = stmt.query_map([item_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?, types_column(row, 2)?))
        })?;
        for member in members {
            let (id, installed, group_type) = member?;
            environment.add_group(id, installed, group_type);
        }
        Ok(())
    }

    fn insert_record(tx: &Connection, record: &TransactionRecord) -> Result<i64> {
        tx.execute(
            "INSERT INTO trans (begin_timestamp, end_timestamp, begin_db_version, end_db_version,
                                login_user, command_line, return_code, releasever)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.begin_timestamp.timestamp(),
                record.end_timestamp.map(|t| t.timestamp()),
                &record.begin_db_version,
                &record.end_db_version,
                &record.login_user,
                &record.command_line,
                record.return_code,
                &record.releasever,
            ],
        )?;
        let id = tx.last_insert_rowid();

        for (position, action) in record.actions()?.iter().enumerate() {
            tx.execute(
                "INSERT INTO trans_item (trans_id, position, action, name, epoch, version, release,
                                         arch, reason, repo_id, done)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    id,
                    position as i64,
                    action.action.as_str(),
                    &action.nevra.name,
                    action.nevra.epoch as i64,
                    &action.nevra.version,
                    &action.nevra.release,
                    &action.nevra.arch,
                    action.reason.as_str(),
                    &action.repo_id,
                    action.done,
                ],
            )?;
        }

        for (position, entry) in record.group_actions()?.iter().enumerate() {
            tx.execute(
                "INSERT INTO trans_group_item (trans_id, position, action, group_id, package_types)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    position as i64,
                    entry.action.as_str(),
                    &entry.group.id,
                    entry.group.package_types.bits() as i64,
                ],
            )?;
            let item_id = tx.last_insert_rowid();
            for (member_pos, member) in entry.group.packages.iter().enumerate() {
                tx.execute(
                    "INSERT INTO trans_group_member (item_id, position, name, installed, package_type)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        item_id,
                        member_pos as i64,
                        &member.name,
                        member.installed,
                        member.package_type.bits() as i64,
                    ],
                )?;
            }
        }

        for (position, entry) in record.environment_actions()?.iter().enumerate() {
            tx.execute(
                "INSERT INTO trans_env_item (trans_id, position, action, env_id, package_types)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    position as i64,
                    entry.action.as_str(),
                    &entry.environment.id,
                    entry.environment.package_types.bits() as i64,
                ],
            )?;
            let item_id = tx.last_insert_rowid();
            for (member_pos, member) in entry.environment.groups.iter().enumerate() {
                tx.execute(
                    "INSERT INTO trans_env_member (item_id, position, group_id, installed, group_type)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        item_id,
                        member_pos as i64,
                        &member.id,
                        member.installed,
                        member.group_type.bits() as i64,
                    ],
                )?;
            }
        }

        let console = [
            (ConsoleStream::Output, record.output()?),
            (ConsoleStream::Error, record.errors()?),
        ];
        for (stream, lines) in console {
            for line in lines {
                tx.execute(
                    "INSERT INTO trans_output (trans_id, fd, line) VALUES (?1, ?2, ?3)",
                    params![id, stream.as_i64(), line],
                )?;
            }
        }

        for (name, value) in &record.extra {
            tx.execute(
                "INSERT INTO trans_extra (trans_id, name, value) VALUES (?1, ?2, ?3)",
                params![id, name, value],
            )?;
        }

        Ok(id)
    }
}

impl HistoryStore for SqliteHistory {
    fn load_actions(&self, id: i64) -> Result<Vec<PackageAction>> {
        let mut stmt = self.conn.prepare(
            "SELECT action, name, epoch, version, release, arch, reason, repo_id, done
             FROM trans_item WHERE trans_id = ?1 ORDER BY position",
        )?;
        let actions = stmt
            .query_map([id], action_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(actions)
    }

    fn load_group_actions(&self, id: i64) -> Result<Vec<GroupAction>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, action, group_id, package_types FROM trans_group_item
             WHERE trans_id = ?1 ORDER BY position",
        )?;
        let items = stmt
            .query_map([id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    parse_column::<ActionKind>(row, 1)?,
                    row.get::<_, String>(2)?,
                    types_column(row, 3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut actions = Vec::with_capacity(items.len());
        for (item_id, action, group_id, package_types) in items {
            let mut group = CompsGroup::new(group_id, package_types);
            self.load_group_members(item_id, &mut group)?;
            actions.push(GroupAction { action, group });
        }
        Ok(actions)
    }

    fn load_environment_actions(&self, id: i64) -> Result<Vec<EnvironmentAction>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, action, env_id, package_types FROM trans_env_item
             WHERE trans_id = ?1 ORDER BY position",
        )?;
        let items = stmt
            .query_map([id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    parse_column::<ActionKind>(row, 1)?,
                    row.get::<_, String>(2)?,
                    types_column(row, 3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut actions = Vec::with_capacity(items.len());
        for (item_id, action, env_id, package_types) in items {
            let mut environment = CompsEnvironment::new(env_id, package_types);
            self.load_environment_members(item_id, &mut environment)?;
            actions.push(EnvironmentAction {
                action,
                environment,
            });
        }
        Ok(actions)
    }

    fn load_console(&self, id: i64, stream: ConsoleStream) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT line FROM trans_output WHERE trans_id = ?1 AND fd = ?2 ORDER BY id")?;
        let lines = stmt
            .query_map(params![id, stream.as_i64()], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(lines)
    }

    fn reason_before(&self, name: &str, arch: &str, id: i64) -> Result<Reason> {
        let latest: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT action, reason FROM trans_item
                 WHERE name = ?1 AND arch = ?2 AND trans_id < ?3
                 ORDER BY trans_id DESC, position DESC LIMIT 1",
                params![name, arch, id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((action, reason)) = latest else {
            return Ok(Reason::Unknown);
        };
        // A package that was taken off the system has no reason left to restore
        let action: ActionKind = action.parse().map_err(Error::ParseError)?;
        if matches!(action, ActionKind::Erase | ActionKind::Obsoleted) {
            return Ok(Reason::Unknown);
        }
        reason.parse().map_err(Error::ParseError)
    }

    fn query(&self, ids: &[i64]) -> Result<Vec<TransactionRecord>> {
        let mut records = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.find_by_id(id)? {
                Some(record) => records.push(record),
                None => debug!("Transaction {} not found", id),
            }
        }
        records.sort();
        records.dedup_by_key(|r| r.id);
        Ok(records)
    }

    fn range(&self, first: i64, last: i64) -> Result<Vec<TransactionRecord>> {
        let (first, last) = if first <= last { (first, last) } else { (last, first) };
        self.select_records("WHERE id BETWEEN ?1 AND ?2", [first, last])
    }

    fn list(&self, limit: Option<usize>) -> Result<Vec<TransactionRecord>> {
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        self.select_records("ORDER BY id DESC LIMIT ?1", [limit])
    }

    fn last(&self) -> Result<Option<TransactionRecord>> {
        Ok(self
            .select_records("ORDER BY id DESC LIMIT 1", [])?
            .into_iter()
            .next())
    }

    fn append(&self, record: &TransactionRecord) -> Result<i64> {
        if record.id.is_some() {
            return Err(Error::InitError(
                "Transaction is already stored".to_string(),
            ));
        }
        let id = with_transaction(&self.conn, |tx| Self::insert_record(tx, record))?;
        debug!("Recorded transaction {}", id);
        Ok(id)
    }
}

impl CompsHistory for SqliteHistory {
    fn get_group(&self, id: &str) -> Result<Option<CompsGroup>> {
        let package_types = self
            .conn
            .query_row(
                "SELECT package_types FROM comps_group WHERE group_id = ?1",
                [id],
                |row| types_column(row, 0),
            )
            .optional()?;
        let Some(package_types) = package_types else {
            return Ok(None);
        };

        let mut group = CompsGroup::new(id, package_types);
        let mut stmt = self.conn.prepare(
            "SELECT name, installed, package_type FROM comps_group_package
             WHERE group_id = ?1 ORDER BY position",
        )?;
        let members = stmt.query_map([id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?, types_column(row, 2)?))
        })?;
        for member in members {
            let (name, installed, package_type) = member?;
            group.add_package(name, installed, package_type);
        }
        Ok(Some(group))
    }

    fn save_group(&mut self, group: &CompsGroup) -> Result<()> {
        with_transaction(&self.conn, |tx| {
            tx.execute("DELETE FROM comps_group_package WHERE group_id = ?1", [&group.id])?;
            tx.execute(
                "INSERT OR REPLACE INTO comps_group (group_id, package_types) VALUES (?1, ?2)",
                params![&group.id, group.package_types.bits() as i64],
            )?;
            for (position, member) in group.packages.iter().enumerate() {
                tx.execute(
                    "INSERT INTO comps_group_package (group_id, position, name, installed, package_type)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        &group.id,
                        position as i64,
                        &member.name,
                        member.installed,
                        member.package_type.bits() as i64,
                    ],
                )?;
            }
            Ok(())
        })
    }

    fn remove_group(&mut self, id: &str) -> Result<()> {
        with_transaction(&self.conn, |tx| {
            tx.execute("DELETE FROM comps_group_package WHERE group_id = ?1", [id])?;
            tx.execute("DELETE FROM comps_group WHERE group_id = ?1", [id])?;
            Ok(())
        })
    }

    fn get_environment(&self, id: &str) -> Result<Option<CompsEnvironment>> {
        let package_types = self
            .conn
            .query_row(
                "SELECT package_types FROM comps_environment WHERE env_id = ?1",
                [id],
                |row| types_column(row, 0),
            )
            .optional()?;
        let Some(package_types) = package_types else {
            return Ok(None);
        };

        let mut environment = CompsEnvironment::new(id, package_types);
        let mut stmt = self.conn.prepare(
            "SELECT group_id, installed, group_type FROM comps_environment_group
             WHERE env_id = ?1 ORDER BY position",
        )?;
        let members = stmt.query_map([id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?, types_column(row, 2)?))
        })?;
        for member in members {
            let (group_id, installed, group_type) = member?;
            environment.add_group(group_id, installed, group_type);
        }
        Ok(Some(environment))
    }

    fn save_environment(&mut self, environment: &CompsEnvironment) -> Result<()> {
        with_transaction(&self.conn, |tx| {
            tx.execute(
                "DELETE FROM comps_environment_group WHERE env_id = ?1",
                [&environment.id],
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO comps_environment (env_id, package_types) VALUES (?1, ?2)",
                params![&environment.id, environment.package_types.bits() as i64],
            )?;
            for (position, member) in environment.groups.iter().enumerate() {
                tx.execute(
                    "INSERT INTO comps_environment_group (env_id, position, group_id, installed, group_type)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        &environment.id,
                        position as i64,
                        &member.id,
                        member.installed,
                        member.group_type.bits() as i64,
                    ],
                )?;
            }
            Ok(())
        })
    }

    fn remove_environment(&mut self, id: &str) -> Result<()> {
        with_transaction(&self.conn, |tx| {
            tx.execute("DELETE FROM comps_environment_group WHERE env_id = ?1", [id])?;
            tx.execute("DELETE FROM comps_environment WHERE env_id = ?1", [id])?;
            Ok(())
        })
    }
}
