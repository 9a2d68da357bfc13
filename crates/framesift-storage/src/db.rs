//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access.
//! Configures WAL mode and a busy timeout so several processes can share
//! one database file.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tracing::info;

use framesift_core::error::FramesiftError;

use crate::migrations;

/// Thread-safe SQLite database wrapper.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self, FramesiftError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| FramesiftError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(|e| FramesiftError::Storage(format!("Failed to set pragmas: {}", e)))?;

        // Concurrent registry replicas contend on the lease UPDATE.
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| FramesiftError::Storage(format!("Failed to set busy timeout: {}", e)))?;

        info!("Database opened at {}", path.display());

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, FramesiftError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            FramesiftError::Storage(format!("Failed to open in-memory db: {}", e))
        })?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| FramesiftError::Storage(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// The mutex is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, FramesiftError>
    where
        F: FnOnce(&Connection) -> Result<T, FramesiftError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FramesiftError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a closure with mutable access, for transactions.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, FramesiftError>
    where
        F: FnOnce(&mut Connection) -> Result<T, FramesiftError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| FramesiftError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&mut conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}
