//! Dispatcher: leases a worker and forwards the job to it.
//!
//! The dispatcher never releases a lease. The worker that accepted the job
//! releases it when extraction ends; a job that could not be forwarded keeps
//! its worker Busy until that worker re-registers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};

use framesift_core::error::FramesiftError;
use framesift_core::types::{Assignment, ExtractionJob};
use framesift_registry::RegistryClient;

/// Delivers a job to a worker endpoint.
#[async_trait]
pub trait JobForwarder: Send + Sync {
    async fn forward(&self, endpoint: &str, job: &ExtractionJob) -> Result<(), FramesiftError>;
}

/// Posts jobs to `<endpoint>/extract`.
#[derive(Debug, Clone)]
pub struct HttpJobForwarder {
    client: Client,
}

impl HttpJobForwarder {
    pub fn new(timeout: Duration) -> Result<Self, FramesiftError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FramesiftError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl JobForwarder for HttpJobForwarder {
    async fn forward(&self, endpoint: &str, job: &ExtractionJob) -> Result<(), FramesiftError> {
        let url = format!("{}/extract", endpoint.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(job)
            .send()
            .await
            .map_err(|e| FramesiftError::Connectivity(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        Err(FramesiftError::Downstream {
            status: status.as_u16(),
            message,
        })
    }
}

/// Routes video jobs to workers leased from the registry.
pub struct Dispatcher {
    registry: Arc<dyn RegistryClient>,
    forwarder: Arc<dyn JobForwarder>,
}

impl Dispatcher {
    pub fn new(registry: Arc<dyn RegistryClient>, forwarder: Arc<dyn JobForwarder>) -> Self {
        Self {
            registry,
            forwarder,
        }
    }

    /// Lease a worker and hand it `video_uri`. Returns as soon as the worker
    /// has accepted the job.
    pub async fn dispatch(&self, video_uri: &str) -> Result<Assignment, FramesiftError> {
        let video_uri = video_uri.trim();
        if video_uri.is_empty() {
            return Err(FramesiftError::Validation(
                "video_uri must not be empty".to_string(),
            ));
        }

        let assignment = self.registry.lease().await?;
        let job = ExtractionJob {
            video_uri: video_uri.to_string(),
        };

        if let Err(e) = self.forwarder.forward(&assignment.endpoint, &job).await {
            warn!(
                worker_id = %assignment.worker_id,
                endpoint = %assignment.endpoint,
                error = %e,
                "Failed to forward job; lease left in place"
            );
            return Err(e);
        }

        info!(
            worker_id = %assignment.worker_id,
            uri = %video_uri,
            "Job dispatched"
        );
        Ok(assignment)
    }
}
