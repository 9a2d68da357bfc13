//! Text search over stored frame embeddings.

use std::sync::Arc;

use tracing::debug;

use framesift_core::config::{QueryConfig, VectorConfig};
use framesift_core::error::FramesiftError;
use framesift_core::types::SearchHit;

use crate::embedding::{DynEmbeddingService, EmbeddingService};
use crate::store::VectorStore;

/// Search engine combining query embedding with nearest-neighbor lookup.
///
/// Uses dynamic dispatch (`Box<dyn DynEmbeddingService>`) so that production
/// code can supply `HttpEmbeddingService` while tests use `MockEmbedding`.
pub struct SearchEngine {
    store: Arc<dyn VectorStore>,
    embedder: Box<dyn DynEmbeddingService>,
    default_k: usize,
    max_k: usize,
    nprobe: usize,
}

impl SearchEngine {
    pub fn new(store: Arc<dyn VectorStore>, embedder: impl EmbeddingService + 'static) -> Self {
        Self::new_dyn(store, Box::new(embedder))
    }

    pub fn new_dyn(store: Arc<dyn VectorStore>, embedder: Box<dyn DynEmbeddingService>) -> Self {
        let query = QueryConfig::default();
        Self {
            store,
            embedder,
            default_k: query.top_k,
            max_k: query.max_top_k,
            nprobe: VectorConfig::default().nprobe,
        }
    }

    /// Apply the result-size and search-breadth settings.
    pub fn with_limits(mut self, query: &QueryConfig, vector: &VectorConfig) -> Self {
        self.default_k = query.top_k.max(1);
        self.max_k = query.max_top_k.max(self.default_k);
        self.nprobe = vector.nprobe.max(1);
        self
    }

    /// Embed `query` and return the closest stored frames, nearest first.
    ///
    /// `limit` defaults to the configured top-k and is capped at the
    /// configured maximum.
    pub async fn search_text(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SearchHit>, FramesiftError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(FramesiftError::Validation(
                "Search query must not be empty".to_string(),
            ));
        }
        let k = match limit {
            Some(0) => {
                return Err(FramesiftError::Validation(
                    "Search limit must be at least 1".to_string(),
                ))
            }
            Some(n) => n.min(self.max_k),
            None => self.default_k,
        };

        let vector = self.embedder.embed_text_boxed(query).await?;
        let hits = self.store.search(&vector, k, self.nprobe).await?;
        debug!(k, hits = hits.len(), "Text search complete");
        Ok(hits)
    }
}
