//! Route handler functions for all roles.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use framesift_core::error::FramesiftError;
use framesift_core::types::{Assignment, ExtractionJob, LeaseOutcome, SearchHit, WorkerRecord};
use framesift_extract::WorkerPhase;
use framesift_registry::{LeaseResponse, MessageResponse, RegisterRequest, ReleaseRequest};

use crate::error::ApiError;
use crate::state::{DispatcherState, ExtractorState, QueryState, RegistryState, RoleState};

// =============================================================================
// Request / response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub video_uri: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub message: String,
    pub assignment: Assignment,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobAcceptedResponse {
    pub message: String,
    pub job_id: Uuid,
    pub directory: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerStatusResponse {
    pub id: String,
    pub phase: WorkerPhase,
}

/// Query string of the legacy `/update_status` call.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusParams {
    pub extractor_id: String,
    pub status: String,
    #[serde(default)]
    pub outcome: LeaseOutcome,
}

/// One registry record plus the outcome of its latest lease.
#[derive(Debug, Serialize, Deserialize)]
pub struct WorkerDetailResponse {
    #[serde(flatten)]
    pub worker: WorkerRecord,
    pub last_outcome: Option<LeaseOutcome>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TextSearchRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

// =============================================================================
// Shared
// =============================================================================

/// GET /health
pub async fn health<S: RoleState>(State(state): State<S>) -> Json<HealthResponse> {
    let info = state.health();
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: info.start_time.elapsed().as_secs(),
        role: info.role.to_string(),
    })
}

// =============================================================================
// Registry
// =============================================================================

/// POST /register
pub async fn register(
    State(state): State<RegistryState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let record = state.registry.register(&req.id, &req.endpoint)?;
    Ok(Json(MessageResponse {
        message: format!("Worker {} registered", record.id),
    }))
}

/// GET /lease
pub async fn lease(State(state): State<RegistryState>) -> Result<Json<LeaseResponse>, ApiError> {
    let record = state.registry.lease()?;
    Ok(Json(LeaseResponse {
        id: record.id,
        endpoint: record.endpoint,
    }))
}

/// POST /release
pub async fn release(
    State(state): State<RegistryState>,
    Json(req): Json<ReleaseRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let record = state.registry.release(&req.id, req.outcome)?;
    Ok(Json(MessageResponse {
        message: format!("Worker {} is {}", record.id, record.state),
    }))
}

/// POST /update_status?extractor_id=..&status=..
///
/// `available` releases the lease. `busy` is acknowledged without a
/// transition, since only a lease may make a worker Busy.
pub async fn update_status(
    State(state): State<RegistryState>,
    Query(params): Query<UpdateStatusParams>,
) -> Result<Json<MessageResponse>, ApiError> {
    let record = match params.status.trim() {
        "available" => state.registry.release(&params.extractor_id, params.outcome)?,
        "busy" => state.registry.get(&params.extractor_id)?,
        other => {
            return Err(FramesiftError::Validation(format!(
                "Unknown worker status '{}'",
                other
            ))
            .into())
        }
    };
    Ok(Json(MessageResponse {
        message: format!("Worker {} is {}", record.id, record.state),
    }))
}

/// GET /status
pub async fn status(
    State(state): State<RegistryState>,
) -> Result<Json<Vec<WorkerRecord>>, ApiError> {
    Ok(Json(state.registry.list()?))
}

/// GET /status/{id}
pub async fn worker_status(
    State(state): State<RegistryState>,
    Path(id): Path<String>,
) -> Result<Json<WorkerDetailResponse>, ApiError> {
    let worker = state.registry.get(&id)?;
    let last_outcome = state.registry.last_outcome(&id)?;
    Ok(Json(WorkerDetailResponse {
        worker,
        last_outcome,
    }))
}

// =============================================================================
// Dispatcher
// =============================================================================

/// POST /process_video
pub async fn process_video(
    State(state): State<DispatcherState>,
    Json(req): Json<DispatchRequest>,
) -> Result<Json<DispatchResponse>, ApiError> {
    let assignment = state.dispatcher.dispatch(&req.video_uri).await?;
    Ok(Json(DispatchResponse {
        message: "Job dispatched successfully".to_string(),
        assignment,
    }))
}

// =============================================================================
// Extractor
// =============================================================================

/// POST /extract
pub async fn extract(
    State(state): State<ExtractorState>,
    Json(job): Json<ExtractionJob>,
) -> Result<(StatusCode, Json<JobAcceptedResponse>), ApiError> {
    let submitted = state.worker.submit(job)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(JobAcceptedResponse {
            message: "Extraction job started in the background".to_string(),
            job_id: submitted.ticket.job_id,
            directory: submitted.ticket.directory,
        }),
    ))
}

/// GET /state
pub async fn extractor_state(State(state): State<ExtractorState>) -> Json<WorkerStatusResponse> {
    Json(WorkerStatusResponse {
        id: state.worker.id().to_string(),
        phase: state.worker.phase(),
    })
}

// =============================================================================
// Query
// =============================================================================

/// POST /search/text
pub async fn search_text(
    State(state): State<QueryState>,
    Json(req): Json<TextSearchRequest>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    let engine = state.engine.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable(format!(
            "Vector store unavailable: {}",
            state.unavailable_reason
        ))
    })?;

    if req.query.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Field 'query' must not be empty".to_string(),
        ));
    }

    Ok(Json(engine.search_text(&req.query, req.limit).await?))
}
