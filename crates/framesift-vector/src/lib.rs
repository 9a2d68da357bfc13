//! Framesift Vector crate - embedding service, vector store, ingestion
//! pipeline, and text search.
//!
//! The ingestion pipeline polls the shared frames root, embeds every frame
//! of each unprocessed directory, writes the vectors to the store in bounded
//! batches, and marks the directory complete. The search engine embeds a
//! text query and returns the nearest stored frames.

pub mod embedding;
pub mod pipeline;
pub mod search;
pub mod store;

pub use embedding::{DynEmbeddingService, EmbeddingService, HttpEmbeddingService, MockEmbedding};
pub use pipeline::{CycleReport, IngestionPipeline, PipelineSettings};
pub use search::SearchEngine;
pub use store::{MemoryVectorStore, SqliteVectorStore, VectorStore};
