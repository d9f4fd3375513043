// SQLite database setup and migrations
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use super::storage::StorageError;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Invalid distribution JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type DbResult<T> = Result<T, DbError>;

// Thread-safe database connection wrapper
pub struct DbConnection {
    conn: Arc<Mutex<Connection>>,
}

impl DbConnection {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A panic mid-query leaves the connection itself usable
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clone for DbConnection {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

/// Open (or create) the database at `db_path` and apply migrations
pub fn init_db(db_path: &Path) -> DbResult<DbConnection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    run_migrations(&conn)?;

    log::info!("Opened database at {}", db_path.display());
    Ok(DbConnection::new(conn))
}

/// In-memory database with the full schema
pub fn open_in_memory() -> DbResult<DbConnection> {
    let conn = Connection::open_in_memory()?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    run_migrations(&conn)?;
    Ok(DbConnection::new(conn))
}

fn run_migrations(conn: &Connection) -> DbResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version < 1 {
        migration_v1(conn)?;
        conn.execute("INSERT INTO schema_migrations (version) VALUES (?1)", [1])?;
        log::debug!("Applied schema migration 1");
    }

    Ok(())
}

fn migration_v1(conn: &Connection) -> DbResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS recordings (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            file_path TEXT NOT NULL,
            source TEXT NOT NULL,
            sha256 TEXT NOT NULL,
            bytes INTEGER NOT NULL,
            dataset TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_recordings_created_at ON recordings(created_at DESC)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS analyses (
            id TEXT PRIMARY KEY,
            recording_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            emotion TEXT NOT NULL,
            confidence REAL NOT NULL,
            distribution TEXT NOT NULL,
            FOREIGN KEY (recording_id) REFERENCES recordings(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_analyses_recording_id ON analyses(recording_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_analyses_created_at ON analyses(created_at DESC)",
        [],
    )?;

    Ok(())
}
