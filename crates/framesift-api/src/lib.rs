//! Framesift API crate - axum routers for every service role, and the
//! dispatcher that routes video jobs to leased workers.
//!
//! Each role gets its own router and state: the registry, the dispatcher,
//! the extraction worker, and the text query service. All of them serve
//! `GET /health`.

pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use dispatcher::{Dispatcher, HttpJobForwarder, JobForwarder};
pub use error::ApiError;
pub use routes::{dispatcher_router, extractor_router, query_router, registry_router};
pub use state::{DispatcherState, ExtractorState, QueryState, RegistryState};
