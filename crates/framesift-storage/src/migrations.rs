//! Database schema migrations.
//!
//! Version 1 creates the registry's `workers` table, version 2 the vector
//! store's `frame_embeddings` table. Every database gets both; a role simply
//! leaves the other table empty.

use rusqlite::Connection;
use tracing::info;

use framesift_core::error::FramesiftError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), FramesiftError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| FramesiftError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| FramesiftError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: workers");
    }
    if current_version < 2 {
        apply_v2(conn)?;
        info!("Applied migration v2: frame_embeddings");
    }

    Ok(())
}

/// Version 1: worker records.
fn apply_v1(conn: &Connection) -> Result<(), FramesiftError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS workers (
            id              TEXT PRIMARY KEY NOT NULL,
            endpoint        TEXT NOT NULL,
            state           TEXT NOT NULL DEFAULT 'available'
                            CHECK (state IN ('available', 'busy')),
            last_outcome    TEXT
                            CHECK (last_outcome IS NULL OR last_outcome IN ('success', 'failure')),
            updated_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_workers_state
            ON workers (state, updated_at ASC);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'workers');
        ",
    )
    .map_err(|e| FramesiftError::Storage(format!("Migration v1 failed: {}", e)))
}

/// Version 2: frame embeddings collection.
fn apply_v2(conn: &Connection) -> Result<(), FramesiftError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS frame_embeddings (
            pk              INTEGER PRIMARY KEY AUTOINCREMENT,
            video_id        TEXT NOT NULL CHECK (length(video_id) <= 256),
            frame_path      TEXT NOT NULL CHECK (length(frame_path) <= 512),
            dimensions      INTEGER NOT NULL,
            embedding       BLOB NOT NULL,
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_frame_embeddings_video
            ON frame_embeddings (video_id);

        INSERT INTO schema_migrations (version, name) VALUES (2, 'frame_embeddings');
        ",
    )
    .map_err(|e| FramesiftError::Storage(format!("Migration v2 failed: {}", e)))
}
