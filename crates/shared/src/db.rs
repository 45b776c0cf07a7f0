//! SQLite connection and schema management for the movie library.
//!
//! The schema version lives in `PRAGMA user_version`. Opening a database
//! whose version is behind [`SCHEMA_VERSION`] re-runs the idempotent schema
//! script, which only creates what is missing.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use tracing::{debug, info};

pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA: &str = include_str!("../schema.sql");

/// Database connection wrapper
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create the library database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Opening database");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        // WAL lets `status` read while a scan is writing
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .context("Failed to enable WAL journal")?;

        Self::init(conn)
    }

    /// Private in-memory database, used by tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version = self.version()?;
        if version >= SCHEMA_VERSION {
            debug!(version, "Database schema up to date");
            return Ok(());
        }

        self.conn
            .execute_batch(SCHEMA)
            .context("Failed to create library schema")?;
        self.conn
            .pragma_update(None, "user_version", SCHEMA_VERSION)
            .context("Failed to record schema version")?;

        info!(from = version, to = SCHEMA_VERSION, "Library schema migrated");
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn version(&self) -> Result<i32> {
        self.conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .context("Failed to read schema version")
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [table_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn begin_transaction(&mut self) -> Result<rusqlite::Transaction<'_>> {
        self.conn.transaction().context("Failed to begin transaction")
    }
}
