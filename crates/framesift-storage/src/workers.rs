//! Worker record store backing the registry.
//!
//! All state changes go through `WorkerState::apply`, and the lease is a
//! compare-and-swap on `state` scoped by worker id, so two callers racing for
//! the same record can never both win, even across processes sharing the
//! database file.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rusqlite::OptionalExtension;
use tracing::debug;

use framesift_core::error::FramesiftError;
use framesift_core::types::{LeaseOutcome, WorkerEvent, WorkerRecord, WorkerState};

use crate::db::Database;

/// Repository for extraction worker records.
#[derive(Debug, Clone)]
pub struct WorkerRepository {
    db: Arc<Database>,
}

impl WorkerRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or update a worker by id. The state always ends up Available
    /// and the endpoint is overwritten.
    pub fn upsert(&self, id: &str, endpoint: &str) -> Result<WorkerRecord, FramesiftError> {
        self.db.with_conn(|conn| {
            let current = current_state(conn, id)?;
            let next = current
                .unwrap_or(WorkerState::Available)
                .apply(WorkerEvent::Register, id)?;

            conn.execute(
                "INSERT INTO workers (id, endpoint, state, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    endpoint = excluded.endpoint,
                    state = excluded.state,
                    updated_at = excluded.updated_at",
                rusqlite::params![id, endpoint, next.as_str(), Utc::now().timestamp()],
            )
            .map_err(|e| FramesiftError::Storage(format!("Failed to upsert worker: {}", e)))?;

            fetch(conn, id)?.ok_or_else(|| FramesiftError::NotFound { id: id.to_string() })
        })
    }

    /// Atomically claim one Available worker.
    ///
    /// Candidates are tried least-recently-updated first. Each claim is a
    /// conditional UPDATE that only succeeds while the row is still
    /// Available; a lost race moves on to the next candidate.
    pub fn lease(&self) -> Result<WorkerRecord, FramesiftError> {
        self.db.with_conn(|conn| {
            let candidates = available_ids(conn)?;

            for id in candidates {
                let next = WorkerState::Available.apply(WorkerEvent::Lease, &id)?;
                let changed = conn
                    .execute(
                        "UPDATE workers SET state = ?1, updated_at = ?2
                         WHERE id = ?3 AND state = ?4",
                        rusqlite::params![
                            next.as_str(),
                            Utc::now().timestamp(),
                            id,
                            WorkerState::Available.as_str(),
                        ],
                    )
                    .map_err(|e| FramesiftError::Storage(format!("Failed to lease worker: {}", e)))?;

                if changed == 1 {
                    return fetch(conn, &id)?
                        .ok_or_else(|| FramesiftError::NotFound { id: id.clone() });
                }
                debug!(worker_id = %id, "Lease lost to a concurrent caller");
            }

            Err(FramesiftError::Capacity)
        })
    }

    /// Return a worker to Available, recording the reported outcome.
    pub fn release(
        &self,
        id: &str,
        outcome: LeaseOutcome,
    ) -> Result<WorkerRecord, FramesiftError> {
        self.db.with_conn(|conn| {
            let current = current_state(conn, id)?
                .ok_or_else(|| FramesiftError::NotFound { id: id.to_string() })?;
            let next = current.apply(WorkerEvent::Release, id)?;

            conn.execute(
                "UPDATE workers SET state = ?1, last_outcome = ?2, updated_at = ?3 WHERE id = ?4",
                rusqlite::params![next.as_str(), outcome.as_str(), Utc::now().timestamp(), id],
            )
            .map_err(|e| FramesiftError::Storage(format!("Failed to release worker: {}", e)))?;

            fetch(conn, id)?.ok_or_else(|| FramesiftError::NotFound { id: id.to_string() })
        })
    }

    /// Find a worker by id.
    pub fn find_by_id(&self, id: &str) -> Result<Option<WorkerRecord>, FramesiftError> {
        self.db.with_conn(|conn| fetch(conn, id))
    }

    /// Snapshot of every worker, ordered by id.
    pub fn list(&self) -> Result<Vec<WorkerRecord>, FramesiftError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, endpoint, state, updated_at FROM workers ORDER BY id ASC")
                .map_err(|e| FramesiftError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| Ok(row_to_record(row)))
                .map_err(|e| FramesiftError::Storage(e.to_string()))?;

            let mut records = Vec::new();
            for row in rows {
                let record = row.map_err(|e| FramesiftError::Storage(e.to_string()))??;
                records.push(record);
            }
            Ok(records)
        })
    }

    /// Outcome most recently reported for a worker, if any.
    pub fn last_outcome(&self, id: &str) -> Result<Option<LeaseOutcome>, FramesiftError> {
        self.db.with_conn(|conn| {
            let value: Option<Option<String>> = conn
                .query_row(
                    "SELECT last_outcome FROM workers WHERE id = ?1",
                    rusqlite::params![id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| FramesiftError::Storage(e.to_string()))?;

            match value {
                None => Err(FramesiftError::NotFound { id: id.to_string() }),
                Some(None) => Ok(None),
                Some(Some(s)) => s.parse().map(Some),
            }
        })
    }
}

fn current_state(
    conn: &rusqlite::Connection,
    id: &str,
) -> Result<Option<WorkerState>, FramesiftError> {
    let state: Option<String> = conn
        .query_row(
            "SELECT state FROM workers WHERE id = ?1",
            rusqlite::params![id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| FramesiftError::Storage(e.to_string()))?;

    state.map(|s| s.parse()).transpose()
}

fn available_ids(conn: &rusqlite::Connection) -> Result<Vec<String>, FramesiftError> {
    let mut stmt = conn
        .prepare(
            "SELECT id FROM workers WHERE state = ?1
             ORDER BY updated_at ASC, id ASC",
        )
        .map_err(|e| FramesiftError::Storage(e.to_string()))?;

    let rows = stmt
        .query_map(rusqlite::params![WorkerState::Available.as_str()], |row| {
            row.get::<_, String>(0)
        })
        .map_err(|e| FramesiftError::Storage(e.to_string()))?;

    rows.collect::<Result<Vec<_>, _>>()
        .map_err(|e| FramesiftError::Storage(e.to_string()))
}

fn fetch(conn: &rusqlite::Connection, id: &str) -> Result<Option<WorkerRecord>, FramesiftError> {
    let result = conn
        .query_row(
            "SELECT id, endpoint, state, updated_at FROM workers WHERE id = ?1",
            rusqlite::params![id],
            |row| Ok(row_to_record(row)),
        )
        .optional()
        .map_err(|e| FramesiftError::Storage(e.to_string()))?;

    result.transpose()
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<WorkerRecord, FramesiftError> {
    let id: String = row
        .get(0)
        .map_err(|e| FramesiftError::Storage(e.to_string()))?;
    let endpoint: String = row
        .get(1)
        .map_err(|e| FramesiftError::Storage(e.to_string()))?;
    let state: String = row
        .get(2)
        .map_err(|e| FramesiftError::Storage(e.to_string()))?;
    let updated_at: i64 = row
        .get(3)
        .map_err(|e| FramesiftError::Storage(e.to_string()))?;

    Ok(WorkerRecord {
        id,
        endpoint,
        state: state.parse()?,
        updated_at: Utc.timestamp_opt(updated_at, 0).single().unwrap_or_default(),
    })
}
