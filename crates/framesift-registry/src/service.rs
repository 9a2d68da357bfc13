//! Registry service: register, lease, release, and list workers.

use std::sync::Arc;

use tracing::{debug, error, info};

use framesift_core::error::FramesiftError;
use framesift_core::types::{LeaseOutcome, WorkerRecord, WorkerState};
use framesift_storage::{Database, WorkerRepository};

/// Central registry of extraction workers.
///
/// Cheap to clone; all clones share one record store.
#[derive(Debug, Clone)]
pub struct Registry {
    workers: WorkerRepository,
}

impl Registry {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            workers: WorkerRepository::new(db),
        }
    }

    /// Register (or re-register) a worker. Always leaves it Available.
    pub fn register(&self, id: &str, endpoint: &str) -> Result<WorkerRecord, FramesiftError> {
        let id = id.trim();
        let endpoint = endpoint.trim();
        if id.is_empty() {
            return Err(FramesiftError::Validation(
                "Worker id must not be empty".to_string(),
            ));
        }
        if endpoint.is_empty() {
            return Err(FramesiftError::Validation(
                "Worker endpoint must not be empty".to_string(),
            ));
        }

        let record = self.workers.upsert(id, endpoint)?;
        info!(worker_id = %record.id, endpoint = %record.endpoint, "Worker registered");
        Ok(record)
    }

    /// Lease one Available worker, marking it Busy.
    pub fn lease(&self) -> Result<WorkerRecord, FramesiftError> {
        match self.workers.lease() {
            Ok(record) => {
                info!(worker_id = %record.id, "Worker leased");
                Ok(record)
            }
            Err(FramesiftError::Capacity) => {
                debug!("Lease requested with no available workers");
                Err(FramesiftError::Capacity)
            }
            Err(e @ FramesiftError::LeaseConflict { .. }) => {
                error!(error = %e, "Lease conflict observed; lease CAS is broken");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Return a worker to Available regardless of outcome.
    pub fn release(&self, id: &str, outcome: LeaseOutcome) -> Result<WorkerRecord, FramesiftError> {
        let before = self
            .workers
            .find_by_id(id)?
            .ok_or_else(|| FramesiftError::NotFound { id: id.to_string() })?;

        let record = self.workers.release(id, outcome)?;
        if before.state == WorkerState::Available {
            debug!(worker_id = %id, "Release of an available worker; nothing to do");
        } else {
            info!(worker_id = %id, outcome = outcome.as_str(), "Worker released");
        }
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<WorkerRecord, FramesiftError> {
        self.workers
            .find_by_id(id)?
            .ok_or_else(|| FramesiftError::NotFound { id: id.to_string() })
    }

    /// Outcome of the worker's most recent lease, if it has reported one.
    pub fn last_outcome(&self, id: &str) -> Result<Option<LeaseOutcome>, FramesiftError> {
        self.workers.last_outcome(id)
    }

    /// Read-only snapshot of every worker.
    pub fn list(&self) -> Result<Vec<WorkerRecord>, FramesiftError> {
        self.workers.list()
    }

    pub fn available_count(&self) -> Result<usize, FramesiftError> {
        Ok(self
            .list()?
            .iter()
            .filter(|r| r.state == WorkerState::Available)
            .count())
    }
}
