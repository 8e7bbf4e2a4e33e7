//! SQLite-backed storage handle shared by the observation store, user store,
//! and version counter.
//!
//! `rusqlite` is synchronous, so every call into it runs inside
//! `tokio::task::spawn_blocking`; the connection itself is guarded by a
//! single `parking_lot::Mutex`, matching the teacher's pattern of a shared
//! resource behind one dedicated mutex (spec §5 "Shared-resource policy").

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::error::{AppError, Result};

#[derive(Clone)]
pub struct Db {
    inner: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let db = Db {
            inner: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.inner.lock();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS version_counter (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                value INTEGER NOT NULL
            );
            INSERT OR IGNORE INTO version_counter (id, value) VALUES (0, 0);

            CREATE TABLE IF NOT EXISTS observations (
                observation_id TEXT PRIMARY KEY,
                form_type TEXT NOT NULL,
                form_version TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0,
                geolocation TEXT,
                server_version INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_observations_version
                ON observations (server_version);
            CREATE INDEX IF NOT EXISTS idx_observations_form_type
                ON observations (form_type);

            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Runs `f` against the shared connection on a blocking-pool thread.
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = inner.lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| AppError::Internal(format!("blocking task panicked: {e}")))?
    }
}
