//! Persistence for the frame embeddings collection.
//!
//! Vectors are stored as little-endian f32 BLOBs. Batches are written in a
//! single transaction, so a batch is either fully durable or absent.

use std::sync::Arc;

use framesift_core::error::FramesiftError;
use framesift_core::types::EmbeddingRecord;

use crate::db::Database;

/// A row read back from the embeddings collection.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEmbedding {
    pub pk: i64,
    pub video_id: String,
    pub frame_path: String,
    pub vector: Vec<f32>,
}

/// Repository for the `frame_embeddings` table.
#[derive(Debug, Clone)]
pub struct EmbeddingRepository {
    db: Arc<Database>,
}

impl EmbeddingRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a batch of records in one transaction, returning their
    /// assigned primary keys in input order.
    pub fn insert_batch(&self, records: &[EmbeddingRecord]) -> Result<Vec<i64>, FramesiftError> {
        self.db.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| FramesiftError::Storage(format!("Failed to begin batch: {}", e)))?;

            let mut keys = Vec::with_capacity(records.len());
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO frame_embeddings (video_id, frame_path, dimensions, embedding)
                         VALUES (?1, ?2, ?3, ?4)",
                    )
                    .map_err(|e| FramesiftError::Storage(e.to_string()))?;

                for record in records {
                    stmt.execute(rusqlite::params![
                        record.video_id,
                        record.frame_path,
                        record.vector.len() as i64,
                        encode_vector(&record.vector),
                    ])
                    .map_err(|e| {
                        FramesiftError::Storage(format!("Failed to insert embedding: {}", e))
                    })?;
                    keys.push(tx.last_insert_rowid());
                }
            }

            tx.commit()
                .map_err(|e| FramesiftError::Storage(format!("Failed to commit batch: {}", e)))?;
            Ok(keys)
        })
    }

    /// Load every stored embedding.
    pub fn load_all(&self) -> Result<Vec<StoredEmbedding>, FramesiftError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT pk, video_id, frame_path, embedding FROM frame_embeddings ORDER BY pk ASC",
                )
                .map_err(|e| FramesiftError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| {
                    let blob: Vec<u8> = row.get(3)?;
                    Ok(StoredEmbedding {
                        pk: row.get(0)?,
                        video_id: row.get(1)?,
                        frame_path: row.get(2)?,
                        vector: decode_vector(&blob),
                    })
                })
                .map_err(|e| FramesiftError::Storage(e.to_string()))?;

            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| FramesiftError::Storage(e.to_string()))
        })
    }

    /// Count stored embeddings.
    pub fn count(&self) -> Result<u64, FramesiftError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM frame_embeddings", [], |row| row.get(0))
                .map_err(|e| FramesiftError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }

}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
