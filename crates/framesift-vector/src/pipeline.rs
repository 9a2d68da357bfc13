//! Framesift ingestion pipeline.
//!
//! Polls the shared frames root for directories without a completion marker,
//! embeds their frames in name order, and writes the vectors to the store in
//! batches of at most `batch_size`. A directory is marked complete only after
//! its last batch has been flushed, so a crash mid-directory leads to a full
//! re-scan on the next cycle (duplicates are accepted).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use framesift_core::config::{expand_home, IngestConfig};
use framesift_core::error::FramesiftError;
use framesift_core::sleep::Sleeper;
use framesift_core::types::EmbeddingRecord;

use crate::embedding::EmbeddingService;
use crate::store::VectorStore;

/// Content written to the completion marker.
const MARKER_CONTENT: &str = "processed";

/// Tunables of the polling loop.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub frames_root: PathBuf,
    pub batch_size: usize,
    pub idle_wait: Duration,
    pub error_backoff: Duration,
    pub marker_name: String,
    /// Lowercase extensions, without the dot.
    pub frame_extensions: Vec<String>,
}

impl PipelineSettings {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            frames_root: expand_home(&config.frames_root),
            batch_size: config.batch_size.max(1),
            idle_wait: Duration::from_secs(config.idle_wait_secs),
            error_backoff: Duration::from_secs(config.error_backoff_secs),
            marker_name: config.marker_name.clone(),
            frame_extensions: config
                .frame_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }
}

/// What one polling cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Directories newly marked complete.
    pub directories_completed: usize,
    pub frames_embedded: usize,
    /// Frames dropped because they could not be read or embedded.
    pub frames_failed: usize,
    /// Insert-and-flush rounds sent to the store.
    pub flushes: usize,
}

impl CycleReport {
    pub fn found_work(&self) -> bool {
        self.directories_completed > 0
    }
}

/// The frame ingestion pipeline.
pub struct IngestionPipeline<E: EmbeddingService> {
    embedder: E,
    store: Arc<dyn VectorStore>,
    sleeper: Arc<dyn Sleeper>,
    settings: PipelineSettings,
}

impl<E: EmbeddingService> IngestionPipeline<E> {
    pub fn new(
        embedder: E,
        store: Arc<dyn VectorStore>,
        sleeper: Arc<dyn Sleeper>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            embedder,
            store,
            sleeper,
            settings,
        }
    }

    /// Poll forever.
    pub async fn run(&self) {
        info!(
            root = %self.settings.frames_root.display(),
            batch_size = self.settings.batch_size,
            "Ingestion pipeline started"
        );
        loop {
            let _ = self.tick().await;
        }
    }

    /// One cycle followed by the sleep it calls for: the idle wait when no
    /// unprocessed directory was found, the error backoff when the cycle
    /// failed, none otherwise.
    pub async fn tick(&self) -> Result<CycleReport, FramesiftError> {
        match self.run_cycle().await {
            Ok(report) => {
                if !report.found_work() {
                    debug!("No new frame directories");
                    self.sleeper.sleep(self.settings.idle_wait).await;
                }
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Ingestion cycle failed");
                self.sleeper.sleep(self.settings.error_backoff).await;
                Err(e)
            }
        }
    }

    /// Process every unmarked directory under the frames root.
    pub async fn run_cycle(&self) -> Result<CycleReport, FramesiftError> {
        let mut report = CycleReport::default();

        for dir in self.pending_directories().await? {
            self.process_directory(&dir, &mut report).await?;
            report.directories_completed += 1;
        }

        Ok(report)
    }

    /// Visible subdirectories without a marker, sorted by name.
    async fn pending_directories(&self) -> Result<Vec<PathBuf>, FramesiftError> {
        let mut entries = tokio::fs::read_dir(&self.settings.frames_root).await?;
        let mut dirs = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let path = entry.path();
            if tokio::fs::try_exists(path.join(&self.settings.marker_name)).await? {
                continue;
            }
            dirs.push(path);
        }

        dirs.sort();
        Ok(dirs)
    }

    async fn process_directory(
        &self,
        dir: &Path,
        report: &mut CycleReport,
    ) -> Result<(), FramesiftError> {
        let video_id = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let frames = self.frame_files(dir).await?;
        info!(video_id = %video_id, frames = frames.len(), "Processing frame directory");

        let mut batch: Vec<EmbeddingRecord> = Vec::with_capacity(self.settings.batch_size);
        for frame in frames {
            match self.embed_frame(&video_id, &frame).await {
                Ok(record) => {
                    batch.push(record);
                    report.frames_embedded += 1;
                }
                Err(e) => {
                    warn!(frame = %frame.display(), error = %e, "Dropping frame");
                    report.frames_failed += 1;
                    continue;
                }
            }

            if batch.len() >= self.settings.batch_size {
                self.flush_batch(std::mem::take(&mut batch)).await?;
                report.flushes += 1;
            }
        }

        if !batch.is_empty() {
            self.flush_batch(batch).await?;
            report.flushes += 1;
        }

        self.write_marker(dir).await?;
        info!(video_id = %video_id, "Frame directory marked complete");
        Ok(())
    }

    /// Frame files of `dir` sorted by name.
    async fn frame_files(&self, dir: &Path) -> Result<Vec<PathBuf>, FramesiftError> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut frames = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_frame = path
                .extension()
                .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
                .is_some_and(|ext| self.settings.frame_extensions.contains(&ext));
            if is_frame && entry.file_type().await?.is_file() {
                frames.push(path);
            }
        }

        frames.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(frames)
    }

    async fn embed_frame(
        &self,
        video_id: &str,
        frame: &Path,
    ) -> Result<EmbeddingRecord, FramesiftError> {
        let bytes = tokio::fs::read(frame).await?;
        let vector = self.embedder.embed_image(&bytes).await?;
        let record = EmbeddingRecord {
            video_id: video_id.to_string(),
            frame_path: frame.to_string_lossy().into_owned(),
            vector,
        };
        record.validate(self.store.dimensions())?;
        Ok(record)
    }

    async fn flush_batch(&self, batch: Vec<EmbeddingRecord>) -> Result<(), FramesiftError> {
        let size = batch.len();
        self.store.insert(batch).await?;
        let written = self.store.flush().await?;
        debug!(size, written, "Batch flushed");
        Ok(())
    }

    /// Write the marker through a temporary file so it appears atomically.
    async fn write_marker(&self, dir: &Path) -> Result<(), FramesiftError> {
        let marker = dir.join(&self.settings.marker_name);
        let tmp = dir.join(format!("{}.tmp", self.settings.marker_name));
        tokio::fs::write(&tmp, MARKER_CONTENT).await?;
        tokio::fs::rename(&tmp, &marker).await?;
        Ok(())
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }
}
