//! Clients for the registry's register/lease/release contract.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use tracing::debug;

use framesift_core::error::FramesiftError;
use framesift_core::types::{Assignment, LeaseOutcome};

use crate::protocol::{LeaseResponse, RegisterRequest, ReleaseRequest};
use crate::service::Registry;

/// The registry operations that dispatchers and workers depend on.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn register(&self, id: &str, endpoint: &str) -> Result<(), FramesiftError>;

    /// Lease one Available worker. `Capacity` when none is free.
    async fn lease(&self) -> Result<Assignment, FramesiftError>;

    async fn release(&self, id: &str, outcome: LeaseOutcome) -> Result<(), FramesiftError>;
}

#[async_trait]
impl RegistryClient for Registry {
    async fn register(&self, id: &str, endpoint: &str) -> Result<(), FramesiftError> {
        Registry::register(self, id, endpoint).map(|_| ())
    }

    async fn lease(&self) -> Result<Assignment, FramesiftError> {
        Registry::lease(self).map(|record| Assignment::from(&record))
    }

    async fn release(&self, id: &str, outcome: LeaseOutcome) -> Result<(), FramesiftError> {
        Registry::release(self, id, outcome).map(|_| ())
    }
}

/// Registry client speaking JSON over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    client: Client,
    base_url: String,
}

impl HttpRegistryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FramesiftError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FramesiftError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn register(&self, id: &str, endpoint: &str) -> Result<(), FramesiftError> {
        let body = RegisterRequest {
            id: id.to_string(),
            endpoint: endpoint.to_string(),
        };
        let response = self
            .client
            .post(self.url("/register"))
            .json(&body)
            .send()
            .await
            .map_err(connectivity)?;

        expect_success(response, id).await.map(|_| ())
    }

    async fn lease(&self) -> Result<Assignment, FramesiftError> {
        let response = self
            .client
            .get(self.url("/lease"))
            .send()
            .await
            .map_err(connectivity)?;

        let response = expect_success(response, "").await?;
        let lease: LeaseResponse = response
            .json()
            .await
            .map_err(|e| FramesiftError::Serialization(format!("Invalid lease response: {}", e)))?;

        debug!(worker_id = %lease.id, "Lease granted by registry");
        Ok(Assignment {
            worker_id: lease.id,
            endpoint: lease.endpoint,
        })
    }

    async fn release(&self, id: &str, outcome: LeaseOutcome) -> Result<(), FramesiftError> {
        let body = ReleaseRequest {
            id: id.to_string(),
            outcome,
        };
        let response = self
            .client
            .post(self.url("/release"))
            .json(&body)
            .send()
            .await
            .map_err(connectivity)?;

        expect_success(response, id).await.map(|_| ())
    }
}

fn connectivity(err: reqwest::Error) -> FramesiftError {
    FramesiftError::Connectivity(err.to_string())
}

/// Map a registry response onto the error taxonomy.
async fn expect_success(response: Response, id: &str) -> Result<Response, FramesiftError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::SERVICE_UNAVAILABLE => Err(FramesiftError::Capacity),
        StatusCode::NOT_FOUND => Err(FramesiftError::NotFound { id: id.to_string() }),
        StatusCode::BAD_REQUEST => Err(FramesiftError::Validation(error_message(response).await)),
        _ => Err(FramesiftError::Downstream {
            status: status.as_u16(),
            message: error_message(response).await,
        }),
    }
}

/// Pull `message` out of an `{error, message}` body, falling back to raw text.
pub(crate) async fn error_message(response: Response) -> String {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use framesift_storage::Database;

    #[tokio::test]
    async fn test_in_process_client_contract() {
        let registry = Registry::new(Arc::new(Database::in_memory().unwrap()));
        let client: Arc<dyn RegistryClient> = Arc::new(registry.clone());

        client.register("w1", "http://w1:9000").await.unwrap();
        let assignment = client.lease().await.unwrap();
        assert_eq!(assignment.worker_id, "w1");
        assert_eq!(assignment.endpoint, "http://w1:9000");

        assert!(matches!(client.lease().await, Err(FramesiftError::Capacity)));

        client.release("w1", LeaseOutcome::Failure).await.unwrap();
        assert!(client.lease().await.is_ok());
    }

    #[tokio::test]
    async fn test_http_client_unreachable_is_connectivity() {
        // Port 9 (discard) on loopback is not listening in test environments.
        let client =
            HttpRegistryClient::new("http://127.0.0.1:9/", Duration::from_millis(500)).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:9");

        let err = client.lease().await.unwrap_err();
        assert!(matches!(err, FramesiftError::Connectivity(_)));
        assert!(err.is_transient());
    }
}
