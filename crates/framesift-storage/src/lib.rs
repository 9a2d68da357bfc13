//! Framesift Storage crate - SQLite persistence for worker records and embeddings.
//!
//! Provides a WAL-mode SQLite database with migrations, the worker record
//! store backing the registry (including the atomic lease), and the
//! embeddings table backing the durable vector store.

pub mod db;
pub mod embeddings;
pub mod migrations;
pub mod workers;

pub use db::Database;
pub use embeddings::{EmbeddingRepository, StoredEmbedding};
pub use workers::WorkerRepository;
