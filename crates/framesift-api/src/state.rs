//! Per-role state shared across route handlers.
//!
//! Every state is cheap to clone (`Arc` fields) and carries the role's
//! start time for `/health`.

use std::sync::Arc;
use std::time::Instant;

use framesift_extract::ExtractionWorker;
use framesift_registry::Registry;
use framesift_vector::SearchEngine;

use crate::dispatcher::Dispatcher;

/// Role name and start time reported by `/health`.
#[derive(Debug, Clone, Copy)]
pub struct HealthInfo {
    pub role: &'static str,
    pub start_time: Instant,
}

impl HealthInfo {
    pub fn new(role: &'static str) -> Self {
        Self {
            role,
            start_time: Instant::now(),
        }
    }
}

/// Implemented by every role state so `/health` can be shared.
pub trait RoleState: Clone + Send + Sync + 'static {
    fn health(&self) -> &HealthInfo;
}

#[derive(Clone)]
pub struct RegistryState {
    pub registry: Registry,
    pub health: HealthInfo,
}

impl RegistryState {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            health: HealthInfo::new("registry"),
        }
    }
}

#[derive(Clone)]
pub struct DispatcherState {
    pub dispatcher: Arc<Dispatcher>,
    pub health: HealthInfo,
}

impl DispatcherState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            health: HealthInfo::new("dispatcher"),
        }
    }
}

#[derive(Clone)]
pub struct ExtractorState {
    pub worker: Arc<ExtractionWorker>,
    pub health: HealthInfo,
}

impl ExtractorState {
    pub fn new(worker: Arc<ExtractionWorker>) -> Self {
        Self {
            worker,
            health: HealthInfo::new("extractor"),
        }
    }
}

/// Query role state. `engine` is `None` when the vector store could not be
/// opened; searches then answer 503.
#[derive(Clone)]
pub struct QueryState {
    pub engine: Option<Arc<SearchEngine>>,
    pub unavailable_reason: Arc<str>,
    pub health: HealthInfo,
}

impl QueryState {
    pub fn new(engine: SearchEngine) -> Self {
        Self {
            engine: Some(Arc::new(engine)),
            unavailable_reason: Arc::from(""),
            health: HealthInfo::new("query"),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            engine: None,
            unavailable_reason: Arc::from(reason.into()),
            health: HealthInfo::new("query"),
        }
    }
}

impl RoleState for RegistryState {
    fn health(&self) -> &HealthInfo {
        &self.health
    }
}

impl RoleState for DispatcherState {
    fn health(&self) -> &HealthInfo {
        &self.health
    }
}

impl RoleState for ExtractorState {
    fn health(&self) -> &HealthInfo {
        &self.health
    }
}

impl RoleState for QueryState {
    fn health(&self) -> &HealthInfo {
        &self.health
    }
}
