//! SQLite-based step storage.
//!
//! Provides persistent storage for:
//! - Daily baselines (the cumulative counter value at first observation of
//!   each calendar date, one row per date, retained forever)
//! - The single checkpoint record (last durably saved count + timestamp)
//!
//! The store is the single source of truth across process restarts. Each
//! logical transaction opens a connection, does its work, and drops the
//! handle; concurrent instances (a restarted process racing a not-yet-dead
//! old one) are serialized by SQLite itself. The core never holds a
//! connection across the event-to-persist path.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, Result};

use super::data_dir;

const KV_CHECKPOINT_STEPS: &str = "checkpoint_steps";
const KV_CHECKPOINT_SAVED_AT: &str = "checkpoint_saved_at";

/// The last durably written counter value and when it was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub saved_steps: i32,
    pub saved_at: DateTime<Utc>,
}

/// SQLite database holding daily baselines and the checkpoint.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/stride/stride.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created or the
    /// database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("stride.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open the database at an explicit path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &std::path::Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS days (
                date  TEXT PRIMARY KEY,
                steps INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Baseline counter value recorded at the first observation of `date`,
    /// or `None` if that date has never been observed.
    pub fn steps_for_day(&self, date: NaiveDate) -> Result<Option<i32>, DatabaseError> {
        let mut stmt = self.conn.prepare("SELECT steps FROM days WHERE date = ?1")?;
        let value = stmt
            .query_row(params![date.format("%Y-%m-%d").to_string()], |row| {
                row.get::<_, i32>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Record the baseline for a newly observed date.
    ///
    /// Baselines are written once and never mutated; a second insert for the
    /// same date is ignored.
    pub fn insert_new_day(&self, date: NaiveDate, steps: i32) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO days (date, steps) VALUES (?1, ?2)",
            params![date.format("%Y-%m-%d").to_string(), steps],
        )?;
        Ok(())
    }

    /// All recorded `(date, baseline)` rows, oldest first.
    pub fn history(&self) -> Result<Vec<(NaiveDate, i32)>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT date, steps FROM days ORDER BY date ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i32>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (date_str, steps) = row?;
            let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            out.push((date, steps));
        }
        Ok(out)
    }

    /// Write the checkpoint record.
    ///
    /// Both rows are committed in one transaction so a racing instance (or
    /// a crash between the writes) never observes a count paired with a
    /// stale timestamp.
    pub fn save_current_steps(&self, steps: i32, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![KV_CHECKPOINT_STEPS, steps.to_string()],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![KV_CHECKPOINT_SAVED_AT, at.to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Last durably saved counter value, or 0 if nothing has been saved.
    pub fn current_steps(&self) -> Result<i32, DatabaseError> {
        match self.kv_get(KV_CHECKPOINT_STEPS)? {
            Some(v) => v
                .parse::<i32>()
                .map_err(|e| DatabaseError::QueryFailed(e.to_string())),
            None => Ok(0),
        }
    }

    /// The full checkpoint record, or `None` if nothing has been saved yet.
    pub fn checkpoint(&self) -> Result<Option<Checkpoint>, DatabaseError> {
        let steps = match self.kv_get(KV_CHECKPOINT_STEPS)? {
            Some(v) => v
                .parse::<i32>()
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
            None => return Ok(None),
        };
        let saved_at = match self.kv_get(KV_CHECKPOINT_SAVED_AT)? {
            Some(v) => DateTime::parse_from_rfc3339(&v)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?,
            None => return Ok(None),
        };
        Ok(Some(Checkpoint { saved_steps: steps, saved_at }))
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn day_rows_insert_and_query() {
        let db = Database::open_memory().unwrap();
        assert!(db.steps_for_day(date("2026-03-01")).unwrap().is_none());
        db.insert_new_day(date("2026-03-01"), 1234).unwrap();
        assert_eq!(db.steps_for_day(date("2026-03-01")).unwrap(), Some(1234));
    }

    #[test]
    fn day_rows_are_never_mutated() {
        let db = Database::open_memory().unwrap();
        db.insert_new_day(date("2026-03-01"), 100).unwrap();
        db.insert_new_day(date("2026-03-01"), 999).unwrap();
        assert_eq!(db.steps_for_day(date("2026-03-01")).unwrap(), Some(100));
    }

    #[test]
    fn checkpoint_roundtrip() {
        let db = Database::open_memory().unwrap();
        assert!(db.checkpoint().unwrap().is_none());
        assert_eq!(db.current_steps().unwrap(), 0);

        let at = Utc::now();
        db.save_current_steps(500, at).unwrap();
        assert_eq!(db.current_steps().unwrap(), 500);
        let cp = db.checkpoint().unwrap().unwrap();
        assert_eq!(cp.saved_steps, 500);
        assert_eq!(cp.saved_at.timestamp(), at.timestamp());
    }

    #[test]
    fn checkpoint_overwrite_keeps_fields_paired() {
        let db = Database::open_memory().unwrap();
        let first = Utc::now();
        db.save_current_steps(100, first).unwrap();
        let second = first + chrono::Duration::minutes(20);
        db.save_current_steps(145, second).unwrap();

        let cp = db.checkpoint().unwrap().unwrap();
        assert_eq!(cp.saved_steps, 145);
        assert_eq!(cp.saved_at.timestamp(), second.timestamp());
    }

    #[test]
    fn history_sorted_by_date() {
        let db = Database::open_memory().unwrap();
        db.insert_new_day(date("2026-03-02"), 2000).unwrap();
        db.insert_new_day(date("2026-03-01"), 1000).unwrap();
        let rows = db.history().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], (date("2026-03-01"), 1000));
        assert_eq!(rows[1], (date("2026-03-02"), 2000));
    }

    #[test]
    fn open_failure_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        // A directory is not a valid database file.
        let err = Database::open_at(dir.path()).unwrap_err();
        match err {
            DatabaseError::OpenFailed { path, .. } => assert_eq!(path, dir.path()),
            other => panic!("expected OpenFailed, got {other}"),
        }
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stride.db");

        {
            let db = Database::open_at(&path).unwrap();
            db.insert_new_day(date("2026-03-01"), 100).unwrap();
            db.save_current_steps(140, Utc::now()).unwrap();
        }

        // A fresh connection (restarted process) sees the same state.
        let db = Database::open_at(&path).unwrap();
        assert_eq!(db.steps_for_day(date("2026-03-01")).unwrap(), Some(100));
        assert_eq!(db.current_steps().unwrap(), 140);
    }

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.kv_get("test").unwrap().is_none());
        db.kv_set("test", "hello").unwrap();
        assert_eq!(db.kv_get("test").unwrap().unwrap(), "hello");
    }
}
