//! Vector store for frame embeddings.
//!
//! `insert` stages records; `flush` is the durability and visibility barrier.
//! Search only ever sees flushed records. Both implementations rank by exact
//! squared L2 distance, so `nprobe` never narrows the result set.

use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use framesift_core::error::FramesiftError;
use framesift_core::types::{EmbeddingRecord, SearchHit};
use framesift_storage::{Database, EmbeddingRepository};

/// Collection of frame embeddings searchable by L2 distance.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Stage records for the next flush.
    async fn insert(&self, records: Vec<EmbeddingRecord>) -> Result<(), FramesiftError>;

    /// Make all staged records durable and searchable. Returns how many were
    /// written.
    async fn flush(&self) -> Result<usize, FramesiftError>;

    /// Nearest `k` flushed records, closest first.
    async fn search(
        &self,
        query: &[f32],
        k: usize,
        nprobe: usize,
    ) -> Result<Vec<SearchHit>, FramesiftError>;

    /// Number of flushed records.
    async fn count(&self) -> Result<usize, FramesiftError>;

    fn dimensions(&self) -> usize;
}

/// Squared Euclidean distance.
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

struct Candidate<'a> {
    pk: i64,
    video_id: &'a str,
    frame_path: &'a str,
    vector: &'a [f32],
}

/// Exact top-k by ascending distance; ties broken by primary key.
fn rank<'a>(
    query: &[f32],
    candidates: impl Iterator<Item = Candidate<'a>>,
    k: usize,
) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = candidates
        .map(|c| SearchHit {
            id: c.pk,
            distance: l2_squared(query, c.vector),
            video_id: c.video_id.to_string(),
            frame_path: c.frame_path.to_string(),
        })
        .collect();

    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
    hits.truncate(k);
    hits
}

fn check_query(query: &[f32], dimensions: usize) -> Result<(), FramesiftError> {
    if query.len() != dimensions {
        return Err(FramesiftError::Validation(format!(
            "query has {} dimensions, expected {}",
            query.len(),
            dimensions
        )));
    }
    Ok(())
}

fn lock_err<T>(e: std::sync::PoisonError<T>) -> FramesiftError {
    FramesiftError::Storage(format!("Lock poisoned: {}", e))
}

// ---------------------------------------------------------------------------
// MemoryVectorStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryInner {
    next_pk: i64,
    pending: Vec<EmbeddingRecord>,
    visible: Vec<(i64, EmbeddingRecord)>,
}

/// In-process store. Nothing survives a restart.
#[derive(Debug, Clone)]
pub struct MemoryVectorStore {
    dimensions: usize,
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryVectorStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            inner: Arc::new(RwLock::new(MemoryInner {
                next_pk: 1,
                ..Default::default()
            })),
        }
    }

    /// Records staged but not yet flushed.
    pub fn pending_len(&self) -> usize {
        self.inner.read().map(|i| i.pending.len()).unwrap_or(0)
    }

    /// Snapshot of flushed records in insertion order.
    pub fn records(&self) -> Vec<EmbeddingRecord> {
        self.inner
            .read()
            .map(|i| i.visible.iter().map(|(_, r)| r.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn insert(&self, records: Vec<EmbeddingRecord>) -> Result<(), FramesiftError> {
        for record in &records {
            record.validate(self.dimensions)?;
        }
        let mut inner = self.inner.write().map_err(lock_err)?;
        inner.pending.extend(records);
        Ok(())
    }

    async fn flush(&self) -> Result<usize, FramesiftError> {
        let mut inner = self.inner.write().map_err(lock_err)?;
        let pending = std::mem::take(&mut inner.pending);
        let written = pending.len();
        for record in pending {
            let pk = inner.next_pk;
            inner.next_pk += 1;
            inner.visible.push((pk, record));
        }
        Ok(written)
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        _nprobe: usize,
    ) -> Result<Vec<SearchHit>, FramesiftError> {
        check_query(query, self.dimensions)?;
        let inner = self.inner.read().map_err(lock_err)?;
        let candidates = inner.visible.iter().map(|(pk, r)| Candidate {
            pk: *pk,
            video_id: &r.video_id,
            frame_path: &r.frame_path,
            vector: &r.vector,
        });
        Ok(rank(query, candidates, k))
    }

    async fn count(&self) -> Result<usize, FramesiftError> {
        Ok(self.inner.read().map_err(lock_err)?.visible.len())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// SqliteVectorStore
// ---------------------------------------------------------------------------

/// Store persisted in the `frame_embeddings` table.
///
/// Each flush is one transaction. A failed flush discards the staged batch,
/// so a later flush never writes more than was inserted since the last one.
/// Search reads the table directly, so a query process sees what a separate
/// ingestion process has flushed.
#[derive(Debug)]
pub struct SqliteVectorStore {
    repo: EmbeddingRepository,
    dimensions: usize,
    pending: Mutex<Vec<EmbeddingRecord>>,
}

impl SqliteVectorStore {
    pub fn new(db: Arc<Database>, dimensions: usize) -> Self {
        Self {
            repo: EmbeddingRepository::new(db),
            dimensions,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Open the store at `path`. Failure to open is reported as
    /// `StoreUnavailable`.
    pub fn open(path: &std::path::Path, dimensions: usize) -> Result<Self, FramesiftError> {
        let db = Database::new(path).map_err(|e| FramesiftError::StoreUnavailable(e.to_string()))?;
        info!(path = %path.display(), dimensions, "Vector store opened");
        Ok(Self::new(Arc::new(db), dimensions))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert(&self, records: Vec<EmbeddingRecord>) -> Result<(), FramesiftError> {
        for record in &records {
            record.validate(self.dimensions)?;
        }
        self.pending.lock().map_err(lock_err)?.extend(records);
        Ok(())
    }

    async fn flush(&self) -> Result<usize, FramesiftError> {
        let batch = std::mem::take(&mut *self.pending.lock().map_err(lock_err)?);
        if batch.is_empty() {
            return Ok(0);
        }

        match self.repo.insert_batch(&batch) {
            Ok(keys) => {
                debug!(count = keys.len(), "Embedding batch flushed");
                Ok(keys.len())
            }
            Err(e) => {
                // The batch is dropped; its frames are re-embedded when the
                // unmarked directory is scanned again.
                warn!(count = batch.len(), error = %e, "Embedding batch discarded");
                Err(e)
            }
        }
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        _nprobe: usize,
    ) -> Result<Vec<SearchHit>, FramesiftError> {
        check_query(query, self.dimensions)?;
        let stored = self.repo.load_all()?;
        let candidates = stored
            .iter()
            .filter(|s| s.vector.len() == self.dimensions)
            .map(|s| Candidate {
                pk: s.pk,
                video_id: &s.video_id,
                frame_path: &s.frame_path,
                vector: &s.vector,
            });
        Ok(rank(query, candidates, k))
    }

    async fn count(&self) -> Result<usize, FramesiftError> {
        Ok(self.repo.count()? as usize)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(video: &str, frame: u32, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            video_id: video.to_string(),
            frame_path: format!("/frames/{}/frame-{:05}.jpg", video, frame),
            vector,
        }
    }

    #[test]
    fn test_l2_squared() {
        assert_eq!(l2_squared(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(l2_squared(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_memory_unflushed_records_are_invisible() {
        let store = MemoryVectorStore::new(2);
        store.insert(vec![record("a", 1, vec![1.0, 0.0])]).await.unwrap();

        assert_eq!(store.pending_len(), 1);
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.search(&[1.0, 0.0], 5, 10).await.unwrap().is_empty());

        assert_eq!(store.flush().await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.search(&[1.0, 0.0], 5, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_search_orders_by_distance() {
        let store = MemoryVectorStore::new(2);
        store
            .insert(vec![
                record("far", 1, vec![-1.0, 0.0]),
                record("near", 1, vec![1.0, 0.0]),
                record("mid", 1, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        store.flush().await.unwrap();

        let hits = store.search(&[1.0, 0.0], 2, 10).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.video_id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert!(hits[0].distance <= hits[1].distance);
        assert_eq!(hits[0].distance, 0.0);
    }

    #[tokio::test]
    async fn test_insert_rejects_wrong_dimensions() {
        let store = MemoryVectorStore::new(3);
        let err = store.insert(vec![record("a", 1, vec![1.0])]).await.unwrap_err();
        assert!(matches!(err, FramesiftError::Validation(_)));
        assert_eq!(store.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_search_rejects_wrong_query_dimensions() {
        let store = MemoryVectorStore::new(3);
        assert!(matches!(
            store.search(&[1.0], 5, 10).await,
            Err(FramesiftError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_sqlite_flush_is_visibility_barrier() {
        let store = SqliteVectorStore::new(Arc::new(Database::in_memory().unwrap()), 2);
        store
            .insert(vec![record("a", 1, vec![0.0, 1.0]), record("a", 2, vec![1.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 0);

        assert_eq!(store.flush().await.unwrap(), 2);
        assert_eq!(store.flush().await.unwrap(), 0);

        let hits = store.search(&[1.0, 0.0], 1, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].frame_path, "/frames/a/frame-00002.jpg");
    }

    fn set_table_parked(db: &Database, parked: bool) {
        let sql = if parked {
            "ALTER TABLE frame_embeddings RENAME TO frame_embeddings_parked"
        } else {
            "ALTER TABLE frame_embeddings_parked RENAME TO frame_embeddings"
        };
        db.with_conn(|conn| {
            conn.execute_batch(sql)
                .map_err(|e| FramesiftError::Storage(e.to_string()))
        })
        .unwrap();
    }

    #[tokio::test]
    async fn test_sqlite_failed_flush_discards_batch() {
        let db = Arc::new(Database::in_memory().unwrap());
        let store = SqliteVectorStore::new(db.clone(), 2);

        set_table_parked(&db, true);
        store
            .insert(vec![record("a", 1, vec![1.0, 0.0]), record("a", 2, vec![0.0, 1.0])])
            .await
            .unwrap();
        assert!(store.flush().await.is_err());
        set_table_parked(&db, false);

        store.insert(vec![record("a", 1, vec![1.0, 0.0])]).await.unwrap();
        assert_eq!(store.flush().await.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_store_visible_to_second_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.db");

        let writer = SqliteVectorStore::open(&path, 2).unwrap();
        let reader = SqliteVectorStore::open(&path, 2).unwrap();

        writer.insert(vec![record("clip", 1, vec![0.6, 0.8])]).await.unwrap();
        assert_eq!(reader.count().await.unwrap(), 0);
        writer.flush().await.unwrap();

        let hits = reader.search(&[0.6, 0.8], 5, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].video_id, "clip");
    }

    #[tokio::test]
    async fn test_sqlite_open_failure_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let err = SqliteVectorStore::open(&blocker.join("vectors.db"), 2).unwrap_err();
        assert!(matches!(err, FramesiftError::StoreUnavailable(_)));
    }
}
