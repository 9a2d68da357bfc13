//! Extraction worker.
//!
//! Accepts one job at a time. Each job extracts frames into a hidden staging
//! directory under the frames root, renames it into place on success, and
//! always reports back to the registry so the worker's lease is returned.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use framesift_core::config::{expand_home, ExtractorConfig};
use framesift_core::error::FramesiftError;
use framesift_core::sleep::Sleeper;
use framesift_core::types::{ExtractionJob, LeaseOutcome};
use framesift_registry::RegistryClient;

use crate::extractor::FrameExtractor;

/// Longest stem kept from the video name.
const MAX_STEM_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub id: String,
    pub advertise_url: String,
    pub frames_root: PathBuf,
    pub sampling_rate: f64,
    pub release_retries: u32,
    pub retry_backoff: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &ExtractorConfig) -> Self {
        Self {
            id: config.id.clone(),
            advertise_url: config.advertise_url.clone(),
            frames_root: expand_home(&config.frames_root),
            sampling_rate: config.sampling_rate,
            release_retries: config.release_retries.max(1),
            retry_backoff: Duration::from_secs(config.retry_backoff_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    Idle,
    Extracting,
}

/// Returned to the submitter as soon as a job is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTicket {
    pub job_id: Uuid,
    /// Name of the frame directory under the frames root.
    pub directory: String,
}

/// An accepted job and the task running it.
#[derive(Debug)]
pub struct SubmittedJob {
    pub ticket: JobTicket,
    /// Resolves to the outcome reported to the registry.
    pub completion: JoinHandle<LeaseOutcome>,
}

/// Clears the busy flag when dropped.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Stateless extraction worker.
pub struct ExtractionWorker {
    settings: WorkerSettings,
    extractor: Arc<dyn FrameExtractor>,
    registry: Arc<dyn RegistryClient>,
    sleeper: Arc<dyn Sleeper>,
    busy: Arc<AtomicBool>,
}

impl ExtractionWorker {
    pub fn new(
        settings: WorkerSettings,
        extractor: Arc<dyn FrameExtractor>,
        registry: Arc<dyn RegistryClient>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            settings,
            extractor,
            registry,
            sleeper,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> &str {
        &self.settings.id
    }

    pub fn phase(&self) -> WorkerPhase {
        if self.busy.load(Ordering::SeqCst) {
            WorkerPhase::Extracting
        } else {
            WorkerPhase::Idle
        }
    }

    /// Register with the registry, retrying while it is unreachable.
    /// Any other failure is returned.
    pub async fn register(&self) -> Result<(), FramesiftError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self
                .registry
                .register(&self.settings.id, &self.settings.advertise_url)
                .await
            {
                Ok(()) => {
                    info!(
                        worker_id = %self.settings.id,
                        endpoint = %self.settings.advertise_url,
                        "Registered with registry"
                    );
                    return Ok(());
                }
                Err(e) if e.is_transient() => {
                    warn!(attempt, error = %e, "Registry unreachable, retrying registration");
                    self.sleeper.sleep(self.settings.retry_backoff).await;
                }
                Err(e) => {
                    error!(error = %e, "Registration rejected");
                    return Err(e);
                }
            }
        }
    }

    /// Accept a job and start it in the background.
    pub fn submit(self: &Arc<Self>, job: ExtractionJob) -> Result<SubmittedJob, FramesiftError> {
        let video_uri = job.video_uri.trim().to_string();
        if video_uri.is_empty() {
            return Err(FramesiftError::Validation(
                "video_uri must not be empty".to_string(),
            ));
        }

        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(FramesiftError::WorkerBusy);
        }
        let guard = BusyGuard(self.busy.clone());

        let ticket = JobTicket {
            job_id: Uuid::new_v4(),
            directory: directory_name(&video_uri),
        };
        info!(
            worker_id = %self.settings.id,
            job_id = %ticket.job_id,
            uri = %video_uri,
            directory = %ticket.directory,
            "Job accepted"
        );

        let worker = Arc::clone(self);
        let directory = ticket.directory.clone();
        let job_id = ticket.job_id;
        let completion = tokio::spawn(async move {
            worker.run_job(guard, job_id, video_uri, directory).await
        });

        Ok(SubmittedJob { ticket, completion })
    }

    async fn run_job(
        &self,
        guard: BusyGuard,
        job_id: Uuid,
        video_uri: String,
        directory: String,
    ) -> LeaseOutcome {
        let outcome = self.extract_into(job_id, &video_uri, &directory).await;

        // Idle again before the registry can hand this worker out.
        drop(guard);
        self.release_with_retry(outcome).await;
        outcome
    }

    async fn extract_into(&self, job_id: Uuid, video_uri: &str, directory: &str) -> LeaseOutcome {
        let staging = self.settings.frames_root.join(format!(".{}.partial", directory));
        let target = self.settings.frames_root.join(directory);

        let extractor = Arc::clone(&self.extractor);
        let uri = video_uri.to_string();
        let rate = self.settings.sampling_rate;
        let out = staging.clone();
        let result = tokio::spawn(async move { extractor.extract(&uri, rate, &out).await }).await;

        let outcome = match result {
            Ok(Ok(frames)) => match tokio::fs::rename(&staging, &target).await {
                Ok(()) => {
                    info!(job_id = %job_id, frames, directory = %directory, "Extraction finished");
                    return LeaseOutcome::Success;
                }
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Failed to publish frame directory");
                    LeaseOutcome::Failure
                }
            },
            Ok(Err(e)) => {
                warn!(job_id = %job_id, error = %e, "Extraction failed");
                LeaseOutcome::Failure
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Extraction task aborted");
                LeaseOutcome::Failure
            }
        };

        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(job_id = %job_id, error = %e, "Failed to remove staging directory");
            }
        }
        outcome
    }

    /// Report `outcome` to the registry. When release keeps failing, the
    /// worker re-registers instead, which also returns it to Available and
    /// retries for as long as the registry is unreachable.
    async fn release_with_retry(&self, outcome: LeaseOutcome) {
        let attempts = self.settings.release_retries.max(1);
        for attempt in 1..=attempts {
            match self.registry.release(&self.settings.id, outcome).await {
                Ok(()) => {
                    info!(worker_id = %self.settings.id, outcome = outcome.as_str(), "Lease released");
                    return;
                }
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(attempt, error = %e, "Release failed, retrying");
                    self.sleeper.sleep(self.settings.retry_backoff).await;
                }
                Err(e) => {
                    warn!(
                        worker_id = %self.settings.id,
                        error = %e,
                        "Release failed, re-registering to return the lease"
                    );
                    break;
                }
            }
        }

        if let Err(e) = self.register().await {
            error!(
                worker_id = %self.settings.id,
                error = %e,
                "Lease could not be returned; worker stays busy in the registry"
            );
        }
    }
}

/// `<sanitized stem>-<uuid>` for the video at `uri`.
pub fn directory_name(uri: &str) -> String {
    format!("{}-{}", sanitized_stem(uri), Uuid::new_v4().simple())
}

fn sanitized_stem(uri: &str) -> String {
    let without_query = uri.split(&['?', '#'][..]).next().unwrap_or(uri);
    let last = without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(without_query);
    let stem = match last.rfind('.') {
        Some(idx) if idx > 0 => &last[..idx],
        _ => last,
    };

    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_LEN)
        .collect();
    let cleaned = cleaned.trim_matches('_').to_string();

    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use framesift_core::sleep::RecordingSleeper;
    use framesift_core::types::Assignment;

    /// Writes `frames` frame files, optionally blocking until notified.
    struct ScriptedExtractor {
        frames: usize,
        gate: Option<Arc<tokio::sync::Notify>>,
    }

    #[async_trait]
    impl FrameExtractor for ScriptedExtractor {
        async fn extract(&self, _uri: &str, _rate: f64, dir: &Path) -> Result<usize, FramesiftError> {
            tokio::fs::create_dir_all(dir).await?;
            for i in 1..=self.frames {
                tokio::fs::write(dir.join(format!("frame-{:05}.jpg", i)), b"jpeg").await?;
            }
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(self.frames)
        }
    }

    struct FailingExtractor;

    #[async_trait]
    impl FrameExtractor for FailingExtractor {
        async fn extract(&self, _uri: &str, _rate: f64, dir: &Path) -> Result<usize, FramesiftError> {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(dir.join("frame-00001.jpg"), b"half").await?;
            Err(FramesiftError::Transform("decoder error".to_string()))
        }
    }

    struct PanickingExtractor;

    #[async_trait]
    impl FrameExtractor for PanickingExtractor {
        async fn extract(&self, _uri: &str, _rate: f64, _dir: &Path) -> Result<usize, FramesiftError> {
            panic!("decoder crashed");
        }
    }

    /// Records calls; the first `unreachable` calls fail with Connectivity.
    #[derive(Default)]
    struct FakeRegistry {
        unreachable: AtomicUsize,
        registrations: Mutex<Vec<(String, String)>>,
        releases: Mutex<Vec<(String, LeaseOutcome)>>,
    }

    impl FakeRegistry {
        fn failing(times: usize) -> Self {
            Self {
                unreachable: AtomicUsize::new(times),
                ..Default::default()
            }
        }

        fn take_failure(&self) -> bool {
            self.unreachable
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl RegistryClient for FakeRegistry {
        async fn register(&self, id: &str, endpoint: &str) -> Result<(), FramesiftError> {
            if self.take_failure() {
                return Err(FramesiftError::Connectivity("refused".to_string()));
            }
            self.registrations
                .lock()
                .unwrap()
                .push((id.to_string(), endpoint.to_string()));
            Ok(())
        }

        async fn lease(&self) -> Result<Assignment, FramesiftError> {
            Err(FramesiftError::Capacity)
        }

        async fn release(&self, id: &str, outcome: LeaseOutcome) -> Result<(), FramesiftError> {
            if self.take_failure() {
                return Err(FramesiftError::Connectivity("refused".to_string()));
            }
            self.releases.lock().unwrap().push((id.to_string(), outcome));
            Ok(())
        }
    }

    fn settings(root: &Path) -> WorkerSettings {
        WorkerSettings {
            id: "extractor-1".to_string(),
            advertise_url: "http://extractor-1:9000".to_string(),
            frames_root: root.to_path_buf(),
            sampling_rate: 0.2,
            release_retries: 3,
            retry_backoff: Duration::from_secs(2),
        }
    }

    fn worker(
        root: &Path,
        extractor: Arc<dyn FrameExtractor>,
        registry: Arc<FakeRegistry>,
        sleeper: Arc<RecordingSleeper>,
    ) -> Arc<ExtractionWorker> {
        Arc::new(ExtractionWorker::new(settings(root), extractor, registry, sleeper))
    }

    fn job(uri: &str) -> ExtractionJob {
        ExtractionJob {
            video_uri: uri.to_string(),
        }
    }

    #[tokio::test]
    async fn test_successful_job_publishes_frames_and_releases() {
        let root = tempfile::tempdir().unwrap();
        let registry = Arc::new(FakeRegistry::default());
        let worker = worker(
            root.path(),
            Arc::new(ScriptedExtractor { frames: 3, gate: None }),
            registry.clone(),
            Arc::new(RecordingSleeper::new()),
        );

        let submitted = worker.submit(job("/videos/Holiday Clip.mp4")).unwrap();
        assert!(submitted.ticket.directory.starts_with("Holiday_Clip-"));
        assert_eq!(submitted.completion.await.unwrap(), LeaseOutcome::Success);

        let dir = root.path().join(&submitted.ticket.directory);
        assert!(dir.join("frame-00003.jpg").exists());
        assert!(!root
            .path()
            .join(format!(".{}.partial", submitted.ticket.directory))
            .exists());
        assert_eq!(
            *registry.releases.lock().unwrap(),
            vec![("extractor-1".to_string(), LeaseOutcome::Success)]
        );
        assert_eq!(worker.phase(), WorkerPhase::Idle);
    }

    #[tokio::test]
    async fn test_failed_job_releases_with_failure_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let registry = Arc::new(FakeRegistry::default());
        let worker = worker(
            root.path(),
            Arc::new(FailingExtractor),
            registry.clone(),
            Arc::new(RecordingSleeper::new()),
        );

        let submitted = worker.submit(job("/videos/a.mp4")).unwrap();
        assert_eq!(submitted.completion.await.unwrap(), LeaseOutcome::Failure);

        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
        assert_eq!(
            *registry.releases.lock().unwrap(),
            vec![("extractor-1".to_string(), LeaseOutcome::Failure)]
        );
    }

    #[tokio::test]
    async fn test_panicking_transform_still_releases() {
        let root = tempfile::tempdir().unwrap();
        let registry = Arc::new(FakeRegistry::default());
        let worker = worker(
            root.path(),
            Arc::new(PanickingExtractor),
            registry.clone(),
            Arc::new(RecordingSleeper::new()),
        );

        let submitted = worker.submit(job("/videos/a.mp4")).unwrap();
        assert_eq!(submitted.completion.await.unwrap(), LeaseOutcome::Failure);
        assert_eq!(registry.releases.lock().unwrap().len(), 1);
        assert_eq!(worker.phase(), WorkerPhase::Idle);
    }

    #[tokio::test]
    async fn test_busy_worker_rejects_second_job() {
        let root = tempfile::tempdir().unwrap();
        let gate = Arc::new(tokio::sync::Notify::new());
        let worker = worker(
            root.path(),
            Arc::new(ScriptedExtractor {
                frames: 1,
                gate: Some(gate.clone()),
            }),
            Arc::new(FakeRegistry::default()),
            Arc::new(RecordingSleeper::new()),
        );

        let first = worker.submit(job("/videos/a.mp4")).unwrap();
        assert_eq!(worker.phase(), WorkerPhase::Extracting);
        assert!(matches!(
            worker.submit(job("/videos/b.mp4")),
            Err(FramesiftError::WorkerBusy)
        ));

        gate.notify_one();
        first.completion.await.unwrap();
        assert!(worker.submit(job("/videos/b.mp4")).is_ok());
    }

    #[tokio::test]
    async fn test_blank_uri_rejected_without_claiming_worker() {
        let root = tempfile::tempdir().unwrap();
        let worker = worker(
            root.path(),
            Arc::new(ScriptedExtractor { frames: 1, gate: None }),
            Arc::new(FakeRegistry::default()),
            Arc::new(RecordingSleeper::new()),
        );
        assert!(matches!(
            worker.submit(job("  ")),
            Err(FramesiftError::Validation(_))
        ));
        assert_eq!(worker.phase(), WorkerPhase::Idle);
    }

    #[tokio::test]
    async fn test_release_retried_on_connectivity_errors() {
        let root = tempfile::tempdir().unwrap();
        let registry = Arc::new(FakeRegistry::failing(2));
        let sleeper = Arc::new(RecordingSleeper::new());
        let worker = worker(
            root.path(),
            Arc::new(ScriptedExtractor { frames: 1, gate: None }),
            registry.clone(),
            sleeper.clone(),
        );

        let submitted = worker.submit(job("/videos/a.mp4")).unwrap();
        submitted.completion.await.unwrap();

        assert_eq!(registry.releases.lock().unwrap().len(), 1);
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(2); 2]);
    }

    #[tokio::test]
    async fn test_exhausted_release_falls_back_to_registration() {
        let root = tempfile::tempdir().unwrap();
        let registry = Arc::new(FakeRegistry::failing(10));
        let sleeper = Arc::new(RecordingSleeper::new());
        let worker = worker(
            root.path(),
            Arc::new(ScriptedExtractor { frames: 1, gate: None }),
            registry.clone(),
            sleeper.clone(),
        );

        let submitted = worker.submit(job("/videos/a.mp4")).unwrap();
        submitted.completion.await.unwrap();

        // Three release attempts, then registration outlasts the other seven failures.
        assert!(registry.releases.lock().unwrap().is_empty());
        assert_eq!(
            *registry.registrations.lock().unwrap(),
            vec![(
                "extractor-1".to_string(),
                "http://extractor-1:9000".to_string()
            )]
        );
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(2); 9]);
        assert_eq!(worker.phase(), WorkerPhase::Idle);
    }

    #[tokio::test]
    async fn test_register_retries_until_registry_answers() {
        let root = tempfile::tempdir().unwrap();
        let registry = Arc::new(FakeRegistry::failing(3));
        let sleeper = Arc::new(RecordingSleeper::new());
        let worker = worker(
            root.path(),
            Arc::new(ScriptedExtractor { frames: 1, gate: None }),
            registry.clone(),
            sleeper.clone(),
        );

        worker.register().await.unwrap();
        assert_eq!(sleeper.calls().len(), 3);
        assert_eq!(
            *registry.registrations.lock().unwrap(),
            vec![(
                "extractor-1".to_string(),
                "http://extractor-1:9000".to_string()
            )]
        );
    }

    #[test]
    fn test_sanitized_stem() {
        assert_eq!(sanitized_stem("/videos/a.mp4"), "a");
        assert_eq!(sanitized_stem("rtsp://cam.local/live/stream1"), "stream1");
        assert_eq!(
            sanitized_stem("https://cdn.example.com/v/My Movie.final.mkv?token=x"),
            "My_Movie_final"
        );
        assert_eq!(sanitized_stem("/videos/.hidden"), "hidden");
        assert_eq!(sanitized_stem("///"), "video");
        assert_eq!(sanitized_stem(&"x".repeat(300)).len(), MAX_STEM_LEN);
    }

    #[test]
    fn test_directory_names_are_unique() {
        let a = directory_name("/videos/a.mp4");
        let b = directory_name("/videos/a.mp4");
        assert_ne!(a, b);
        assert!(a.starts_with("a-"));
        assert_eq!(a.len(), "a-".len() + 32);
    }
}
