//! SQLite connection handle for the relational store

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::StorageError;
use crate::schema::{PRAGMAS, SCHEMA};

/// The relational store: windows, raw-data tracking, ingest state and the
/// normalized preprint tables.
///
/// One connection behind a mutex; every method locks for its whole unit of
/// work so transactions never interleave.
pub struct Db {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Db {
    /// Open or create the database file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// In-memory database (tests).
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, StorageError> {
        conn.execute_batch(PRAGMAS)?;
        conn.execute_batch(SCHEMA)?;
        log::debug!(
            "Opened database {}",
            path.as_deref()
                .map_or_else(|| ":memory:".to_string(), |p| p.display().to_string())
        );
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Acquire the connection lock.
    pub(crate) fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(db: &Db) -> Vec<String> {
        let conn = db.lock_conn().unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type IN ('table', 'view') ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<String>, _>>()
            .unwrap()
    }

    #[test]
    fn schema_creates_tables_and_view() {
        let db = Db::in_memory().unwrap();
        let names = table_names(&db);
        for expected in [
            "contributors",
            "harvest_windows",
            "ingest_failures",
            "ingest_state",
            "preprint_contributors",
            "preprint_subjects",
            "preprints",
            "preprints_fts",
            "preprints_ui",
            "raw_data",
            "subjects",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }

    #[test]
    fn open_creates_parent_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("preprints.db");
        {
            let db = Db::open(&path).unwrap();
            assert_eq!(db.path(), Some(path.as_path()));
        }
        // Schema is idempotent
        let db = Db::open(&path).unwrap();
        assert!(table_names(&db).contains(&"preprints".to_string()));
    }
}
