//! Embedding service trait and implementations.
//!
//! - `HttpEmbeddingService` calls an external model server that embeds
//!   images and text into one shared space. This is the production backend.
//! - `MockEmbedding` provides deterministic hash-based vectors for testing.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use framesift_core::error::FramesiftError;
use framesift_core::types::normalize;

/// Service turning frames and text queries into unit vectors.
///
/// Image and text embeddings must live in the same space so that a text
/// query can be compared against stored frame vectors.
pub trait EmbeddingService: Send + Sync {
    /// Embed the encoded bytes of one image.
    fn embed_image(
        &self,
        image: &[u8],
    ) -> impl Future<Output = Result<Vec<f32>, FramesiftError>> + Send;

    /// Embed a text query.
    fn embed_text(
        &self,
        text: &str,
    ) -> impl Future<Output = Result<Vec<f32>, FramesiftError>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

type BoxedEmbedding<'a> = Pin<Box<dyn Future<Output = Result<Vec<f32>, FramesiftError>> + Send + 'a>>;

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// A blanket implementation is provided so that every `EmbeddingService`
/// automatically implements `DynEmbeddingService`.
pub trait DynEmbeddingService: Send + Sync {
    fn embed_image_boxed<'a>(&'a self, image: &'a [u8]) -> BoxedEmbedding<'a>;

    fn embed_text_boxed<'a>(&'a self, text: &'a str) -> BoxedEmbedding<'a>;

    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_image_boxed<'a>(&'a self, image: &'a [u8]) -> BoxedEmbedding<'a> {
        Box::pin(self.embed_image(image))
    }

    fn embed_text_boxed<'a>(&'a self, text: &'a str) -> BoxedEmbedding<'a> {
        Box::pin(self.embed_text(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

// ---------------------------------------------------------------------------
// HttpEmbeddingService - external model server
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct TextRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Embedding service backed by a model server.
///
/// `POST <url>/embed/image` with the raw image bytes and
/// `POST <url>/embed/text` with `{"text": ...}`; both answer
/// `{"embedding": [f32]}`. Results are re-normalized to unit length.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingService {
    client: Client,
    base_url: String,
    dimensions: usize,
}

impl HttpEmbeddingService {
    pub fn new(base_url: &str, dimensions: usize, timeout: Duration) -> Result<Self, FramesiftError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FramesiftError::Config(format!("Failed to build HTTP client: {}", e)))?;

        info!(url = %base_url, dimensions, "Using HTTP embedding service");
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            dimensions,
        })
    }

    async fn read_embedding(&self, response: reqwest::Response) -> Result<Vec<f32>, FramesiftError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FramesiftError::Downstream {
                status: status.as_u16(),
                message,
            });
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| FramesiftError::Transform(format!("Invalid embedding response: {}", e)))?;

        if body.embedding.len() != self.dimensions {
            return Err(FramesiftError::Transform(format!(
                "Model returned {} dimensions, expected {}",
                body.embedding.len(),
                self.dimensions
            )));
        }

        let mut vector = body.embedding;
        normalize(&mut vector);
        Ok(vector)
    }
}

impl EmbeddingService for HttpEmbeddingService {
    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>, FramesiftError> {
        if image.is_empty() {
            return Err(FramesiftError::Transform("Cannot embed empty image".to_string()));
        }

        let response = self
            .client
            .post(format!("{}/embed/image", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| FramesiftError::Connectivity(e.to_string()))?;

        debug!(bytes = image.len(), "Image embedded");
        self.read_embedding(response).await
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, FramesiftError> {
        if text.trim().is_empty() {
            return Err(FramesiftError::Validation("Cannot embed empty text".to_string()));
        }

        let response = self
            .client
            .post(format!("{}/embed/text", self.base_url))
            .json(&TextRequest { text })
            .send()
            .await
            .map_err(|e| FramesiftError::Connectivity(e.to_string()))?;

        self.read_embedding(response).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// MockEmbedding - deterministic vectors for tests
// ---------------------------------------------------------------------------

/// Deterministic embedding derived from a hash of the input.
///
/// Identical inputs yield identical unit vectors. Text and image inputs with
/// the same bytes map to the same vector, which lets tests search for a
/// frame by its own contents.
#[derive(Debug, Clone)]
pub struct MockEmbedding {
    dimensions: usize,
}

impl Default for MockEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmbedding {
    pub fn new() -> Self {
        Self::with_dimensions(512)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn hash_to_vector(&self, bytes: &[u8]) -> Vec<f32> {
        let mut result = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            let mut hasher = DefaultHasher::new();
            bytes.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }
        normalize(&mut result);
        result
    }
}

impl EmbeddingService for MockEmbedding {
    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>, FramesiftError> {
        if image.is_empty() {
            return Err(FramesiftError::Transform("Cannot embed empty image".to_string()));
        }
        Ok(self.hash_to_vector(image))
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, FramesiftError> {
        if text.trim().is_empty() {
            return Err(FramesiftError::Validation("Cannot embed empty text".to_string()));
        }
        Ok(self.hash_to_vector(text.as_bytes()))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
