//! SQLite-backed local storage

use crate::storage::LocalStorage;
use crate::Result;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Origin-scoped key/value table that survives process restarts.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
    origin: String,
}

impl SqliteStorage {
    /// Open or create the storage database at path
    pub fn open(path: impl AsRef<Path>, origin: impl Into<String>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
            origin: origin.into(),
        };

        storage.init_schema()?;

        info!("Opened local storage at {:?} for {}", path.as_ref(), storage.origin);
        Ok(storage)
    }

    /// Open in-memory database (for testing)
    pub fn open_memory(origin: impl Into<String>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
            origin: origin.into(),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS local_storage (
                origin TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (origin, key)
            );
            "#,
        )?;

        debug!("Local storage schema initialized");
        Ok(())
    }
}

impl LocalStorage for SqliteStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();

        let value = conn
            .query_row(
                "SELECT value FROM local_storage WHERE origin = ?1 AND key = ?2",
                params![self.origin, key],
                |row| row.get(0),
            )
            .optional()?;

        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        let now = chrono::Utc::now().timestamp();

        conn.execute(
            "INSERT OR REPLACE INTO local_storage (origin, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![self.origin, key, value, now],
        )?;

        debug!("Stored {} ({} bytes)", key, value.len());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM local_storage WHERE origin = ?1 AND key = ?2",
            params![self.origin, key],
        )?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "DELETE FROM local_storage WHERE origin = ?1",
            params![self.origin],
        )?;
        debug!("Cleared {} key(s) for {}", rows, self.origin);
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM local_storage WHERE origin = ?1",
            params![self.origin],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
