use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::KvStore;
use crate::error::StoreError;
use crate::id::Id;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS records (
    key   BLOB PRIMARY KEY NOT NULL,
    value BLOB NOT NULL
) WITHOUT ROWID;";

/// Persistent [`KvStore`] in a single SQLite table.
///
/// Every `put` is its own implicit transaction, so a record is durable as soon
/// as the call returns.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Opens (or creates) a store file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        info!(path = %path.display(), "Opened SQLite store");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Path of the backing file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Closes the connection, reporting any error SQLite raises on close.
    pub fn close(self) -> Result<(), StoreError> {
        debug!(path = ?self.path, "Closing SQLite store");
        self.conn
            .into_inner()
            .close()
            .map_err(|(_conn, e)| StoreError::from(e))
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &Id) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT value FROM records WHERE key = ?1")?;
        let value = stmt
            .query_row(params![&key.as_bytes()[..]], |row| row.get::<_, Vec<u8>>(0))
            .optional()?;
        Ok(value)
    }

    fn put(&self, key: &Id, value: &[u8]) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "INSERT INTO records (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )?;
        stmt.execute(params![&key.as_bytes()[..], value])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_put_get() {
        let store = SqliteStore::open_in_memory().unwrap();
        let key = Id::generate();
        assert_eq!(store.get(&key).unwrap(), None);

        store.put(&key, b"first").unwrap();
        store.put(&key, b"second").unwrap();
        assert_eq!(store.get(&key).unwrap().as_deref(), Some(&b"second"[..]));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fs.db");
        let key = Id::generate();

        let store = SqliteStore::open(&path).unwrap();
        store.put(&key, &[7u8; 300]).unwrap();
        store.close().unwrap();

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(vec![7u8; 300]));
        assert_eq!(store.path(), Some(path.as_path()));
    }
}
