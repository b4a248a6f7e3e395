//! SQLite-backed persistent store and audit ledger
//!
//! One database file holds the entity tables and the append-only
//! `audit_events` table. Every mutation runs inside an immediate
//! transaction that writes the row and appends its event, so the row and
//! the ledger never disagree. Triggers reject `UPDATE` and `DELETE` on
//! `audit_events`.
//!
//! The connection is synchronous; async callers reach it through
//! `spawn_blocking`.

mod ledger;
mod records;
mod rows;
mod schema;

use attest_application::StoreError;
use chrono::Utc;
use rows::DbResultExt;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Store and ledger over a single SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Database(format!("{}: {}", parent.display(), e)))?;
        }
        let conn = Connection::open(path).db()?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;",
        )
        .db()?;
        debug!(path = %path.display(), "Opened store");
        Self::init(conn)
    }

    /// A private database that lives as long as the store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().db()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;").db()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        schema::migrate(&conn, &rows::ts(&Utc::now())).db()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Database(format!("store worker failed: {}", e)))?
    }
}
