//! SQLite implementation of the SettingsStore trait.
//!
//! This is the persistent store shared by every peer in the process. It uses
//! rusqlite with bundled SQLite and a WAL journal, so the files on disk are
//! the database plus its `-wal` and `-shm` sidecars.
//!
//! Opening a damaged file does not fail: the schema check is deferred to the
//! first operation, which then reports [`StoreError::Corrupted`] and lets the
//! startup health guard purge the files and [`reopen`](SettingsStore::reopen).

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::SettingsStore;

/// Default file name of the settings database inside the data directory.
pub const SETTINGS_DB_FILE: &str = "settings.db";

/// SQLite-based settings store.
///
/// Thread-safe via internal Mutex.
pub struct SqliteSettingsStore {
    /// The SQLite connection, protected by a mutex.
    inner: Mutex<Inner>,
    /// Backing file, `None` for in-memory databases.
    path: Option<PathBuf>,
}

struct Inner {
    conn: Connection,
    schema_ready: bool,
}

impl Inner {
    fn ensure_schema(&mut self, file_backed: bool) -> Result<()> {
        if self.schema_ready {
            return Ok(());
        }
        if file_backed {
            let mode: String = self.conn.pragma_update_and_check(
                None,
                "journal_mode",
                "WAL",
                |row| row.get(0),
            )?;
            debug!(journal_mode = %mode, "settings store journal mode");
        }
        migration::migrate(&mut self.conn)?;
        self.schema_ready = true;
        Ok(())
    }
}

impl SqliteSettingsStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist. A corrupted
    /// file is tolerated here and surfaces on first use.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut inner = Inner {
            conn: Connection::open(&path)?,
            schema_ready: false,
        };
        match inner.ensure_schema(true) {
            Ok(()) => {}
            Err(err) if err.is_corruption() => {
                warn!(path = %path.display(), error = %err, "settings store is corrupted; deferring to health check");
            }
            Err(err) => return Err(err),
        }

        Ok(Self {
            inner: Mutex::new(inner),
            path: Some(path),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut inner = Inner {
            conn: Connection::open_in_memory()?,
            schema_ready: false,
        };
        inner.ensure_schema(false)?;
        Ok(Self {
            inner: Mutex::new(inner),
            path: None,
        })
    }

    /// The backing database file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Execute an operation on the connection, checking the schema first.
    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("mutex poisoned: {}", e)))?;
        inner.ensure_schema(self.path.is_some())?;
        f(&inner.conn)
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM settings WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now_millis()],
            )?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
            Ok(())
        })
    }

    fn clear(&self) -> Result<()> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM settings", [])?;
            debug!(removed, "cleared settings store");
            Ok(())
        })
    }

    fn reopen(&self) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("mutex poisoned: {}", e)))?;

        // Close the old handle before opening the path again.
        drop(std::mem::replace(&mut inner.conn, Connection::open_in_memory()?));
        inner.conn = match &self.path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        inner.schema_ready = false;
        inner.ensure_schema(self.path.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StoreExt;

    #[test]
    fn test_set_and_get() {
        let store = SqliteSettingsStore::open_memory().unwrap();
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn test_set_overwrites() {
        let store = SqliteSettingsStore::open_memory().unwrap();
        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));
    }

    #[test]
    fn test_remove_and_clear() {
        let store = SqliteSettingsStore::open_memory().unwrap();
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();

        store.remove("a").unwrap();
        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);

        store.clear().unwrap();
        assert_eq!(store.get("b").unwrap(), None);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_DB_FILE);

        {
            let store = SqliteSettingsStore::open(&path).unwrap();
            store.set("k", "v").unwrap();
        }

        let store = SqliteSettingsStore::open(&path).unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn test_probe_leaves_no_key() {
        let store = SqliteSettingsStore::open_memory().unwrap();
        store.probe().unwrap();
        assert_eq!(store.get(crate::traits::HEALTH_CHECK_KEY).unwrap(), None);
    }

    #[test]
    fn test_garbage_file_reports_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_DB_FILE);
        std::fs::write(&path, vec![0xA5u8; 8192]).unwrap();

        let store = SqliteSettingsStore::open(&path).unwrap();
        let err = store.set("k", "v").unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_reopen_after_purge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_DB_FILE);
        std::fs::write(&path, vec![0xA5u8; 8192]).unwrap();

        let store = SqliteSettingsStore::open(&path).unwrap();
        assert!(store.set("k", "v").is_err());

        std::fs::remove_file(&path).unwrap();
        store.reopen().unwrap();
        store.set("k", "v").unwrap();

        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        assert!(path.exists());
    }
}
