pub mod schema;

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::StorageError;

/// Shared handle to the SQLite connection.
///
/// Partitions and the pending queue live in the same file and serialize on
/// this one mutex, which gives per-key atomicity for concurrent writers.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Database connection wrapper for the durable store
pub struct Database {
  conn: SharedConnection,
}

impl Database {
  /// Open or create the database at `path`, or at the default location
  pub fn open(path: Option<&Path>) -> Result<Self, StorageError> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent).map_err(|e| StorageError::Location {
          path: parent.display().to_string(),
          source: e,
        })?;
      }
    }

    let conn = Connection::open(&path)?;
    tracing::debug!(path = %path.display(), "opened cache database");

    Self::with_connection(conn)
  }

  /// Open a private in-memory database
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self, StorageError> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self, StorageError> {
    let db = Self {
      conn: Arc::new(Mutex::new(conn)),
    };
    db.run_migrations()?;
    Ok(db)
  }

  /// Get the default database path
  pub fn default_path() -> Result<PathBuf, StorageError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StorageError::Location {
        path: "$XDG_DATA_HOME".to_string(),
        source: std::io::Error::new(
          std::io::ErrorKind::NotFound,
          "could not determine data directory",
        ),
      })?;

    Ok(data_dir.join("swcache").join("cache.db"))
  }

  /// Run database migrations
  fn run_migrations(&self) -> Result<(), StorageError> {
    let conn = lock(&self.conn)?;
    conn.execute_batch(schema::SCHEMA)?;
    Ok(())
  }

  /// Get a shared handle to the connection
  pub fn connection(&self) -> SharedConnection {
    Arc::clone(&self.conn)
  }
}

/// Lock the shared connection, mapping poisoning to a storage error.
pub fn lock(conn: &SharedConnection) -> Result<MutexGuard<'_, Connection>, StorageError> {
  conn.lock().map_err(|_| StorageError::LockPoisoned)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_migrations_are_idempotent() {
    let db = Database::open_in_memory().unwrap();
    db.run_migrations().unwrap();

    let conn = db.connection();
    let conn = lock(&conn).unwrap();
    let tables: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
         AND name IN ('partitions', 'partition_entries', 'pending_actions')",
        [],
        |row| row.get(0),
      )
      .unwrap();
    assert_eq!(tables, 3);
  }

  #[test]
  fn test_open_creates_parent_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");

    Database::open(Some(&path)).unwrap();
    assert!(path.exists());
  }
}
