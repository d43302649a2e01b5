//! SQLite-backed transactional store.
//!
//! One database holds every entity. Mutations run inside [`Store::write`],
//! which takes SQLite's write lock up front (`BEGIN IMMEDIATE`) so each
//! read-validate-write sequence is serializable. The row modules below are
//! plain functions over a [`Connection`] and never open transactions
//! themselves; the registries compose them inside one `write` call.

pub(crate) mod algorithms;
pub(crate) mod deployments;
pub(crate) mod history;
pub(crate) mod models;
pub(crate) mod schedulers;
pub(crate) mod time;
pub(crate) mod versions;

use crate::config::StoreConfig;
use crate::error::{MaioError, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, Row, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Handle to the lifecycle database.
///
/// Uses WAL mode for safe concurrent access across processes and
/// `Arc<Mutex<Connection>>` for thread safety within a process. Cloning is
/// cheap and shares the connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open the store at a specific path.
    ///
    /// Creates the database and parent directories if they don't exist.
    pub fn open_at(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| MaioError::Io {
                    message: format!("Failed to create database directory: {}", parent.display()),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        Self::configure_connection(&conn, true)?;
        Self::ensure_schema(&conn)?;
        debug!("Opened lifecycle store at {}", db_path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_connection(&conn, false)?;
        Self::ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection, wal: bool) -> Result<()> {
        if wal {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;\n\
                 PRAGMA synchronous=NORMAL;",
            )?;
        }
        conn.execute_batch(&format!(
            "PRAGMA busy_timeout={};\n\
             PRAGMA foreign_keys=ON;\n\
             PRAGMA temp_store=MEMORY;",
            StoreConfig::BUSY_TIMEOUT_MS,
        ))?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS models (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                use_case TEXT,
                usage_guidelines TEXT,
                datasource_id INTEGER NOT NULL,
                output_tag_json TEXT NOT NULL,
                input_tags_json TEXT NOT NULL DEFAULT '[]',
                version_seq INTEGER NOT NULL DEFAULT 0,
                created_by INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS algorithms (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT,
                parameters_json TEXT NOT NULL,
                canonical_parameters TEXT NOT NULL,
                base_algorithm_id INTEGER REFERENCES algorithms(id) ON DELETE RESTRICT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_algorithms_root_name
                ON algorithms(name) WHERE base_algorithm_id IS NULL;

            CREATE UNIQUE INDEX IF NOT EXISTS idx_algorithms_fork_params
                ON algorithms(base_algorithm_id, canonical_parameters)
                WHERE base_algorithm_id IS NOT NULL;

            CREATE TABLE IF NOT EXISTS model_versions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                model_id INTEGER NOT NULL REFERENCES models(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                description TEXT,
                version INTEGER NOT NULL,
                status TEXT NOT NULL,
                version_type TEXT NOT NULL,
                algorithm_id INTEGER REFERENCES algorithms(id) ON DELETE RESTRICT,
                parameters_json TEXT,
                mapping_datasource_id INTEGER,
                mapping_start TEXT,
                mapping_end TEXT,
                training_percentage REAL,
                artifact_ref TEXT,
                failure_reason TEXT,
                archived INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(model_id, version)
            );

            CREATE INDEX IF NOT EXISTS idx_versions_algorithm
                ON model_versions(algorithm_id);

            CREATE TABLE IF NOT EXISTS deployments (
                version_id INTEGER PRIMARY KEY
                    REFERENCES model_versions(id) ON DELETE CASCADE,
                endpoint_ref TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS schedulers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                version_id INTEGER NOT NULL REFERENCES model_versions(id) ON DELETE CASCADE,
                datasource_id INTEGER NOT NULL,
                start_time TEXT NOT NULL,
                interval_seconds INTEGER NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                last_fired_at TEXT,
                created_by INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_schedulers_version
                ON schedulers(version_id);

            CREATE TABLE IF NOT EXISTS scheduler_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                scheduler_id INTEGER NOT NULL REFERENCES schedulers(id) ON DELETE CASCADE,
                counter INTEGER NOT NULL,
                status TEXT NOT NULL,
                start_execution TEXT,
                end_execution TEXT,
                execution_duration_ms INTEGER,
                successful_run INTEGER NOT NULL DEFAULT 0,
                anomaly_detected INTEGER,
                anomaly_count INTEGER,
                failure_reason TEXT,
                created_by INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(scheduler_id, counter)
            );

            CREATE INDEX IF NOT EXISTS idx_history_page
                ON scheduler_history(scheduler_id, created_at, id);",
        )?;
        Ok(())
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| MaioError::Database {
            message: "Failed to acquire store connection lock".to_string(),
            source: None,
        })
    }

    /// Run read-only queries against the connection.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock_conn()?;
        f(&conn)
    }

    /// Run `f` inside an immediate transaction.
    ///
    /// Commits when `f` returns `Ok`; any error rolls the whole mutation back.
    pub fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!("Rollback failed after {}: {}", err.code(), rollback_err);
                }
                Err(err)
            }
        }
    }
}

/// Error for a column whose stored text is not a valid value.
pub(crate) fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

pub(crate) fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn json_column_opt<T: DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        serde_json::from_str(&raw)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_parent_dirs() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("nested").join("dir").join("maio.db");
        let _store = Store::open_at(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_reopen_keeps_schema() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("maio.db");
        drop(Store::open_at(&db_path).unwrap());
        let store = Store::open_at(&db_path).unwrap();
        let tables: i64 = store
            .read(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(tables, 6);
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let store = Store::open_in_memory().unwrap();
        let result: Result<()> = store.write(|tx| {
            tx.execute(
                "INSERT INTO algorithms (name, parameters_json, canonical_parameters, created_at, updated_at)
                 VALUES ('iforest', '{}', '{}', 'x', 'x')",
                [],
            )?;
            Err(MaioError::validation("name", "forced"))
        });
        assert!(result.is_err());

        let count: i64 = store
            .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM algorithms", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let store = Store::open_in_memory().unwrap();
        let result = store.write(|tx| {
            tx.execute(
                "INSERT INTO deployments (version_id, created_at) VALUES (99, 'x')",
                [],
            )?;
            Ok(())
        });
        assert!(result.is_err());
    }
}
