use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{FramesiftError, Result};

/// Top-level configuration for every Framesift role.
///
/// Loaded from `~/.framesift/config.toml` by default. A single file can
/// configure the whole deployment; each role reads only its own section and
/// the shared `general`/`vector` sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FramesiftConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub extractor: ExtractorConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

impl FramesiftConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FramesiftConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| FramesiftError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply `FRAMESIFT_*` overrides from the given key/value pairs.
    ///
    /// Unknown keys are ignored. The frame directory override applies to both
    /// the extractor (writer) and the ingest pipeline (reader) so the two
    /// always agree on the shared root.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let value: String = value.into();
            match key.as_ref() {
                "FRAMESIFT_REGISTRY_URL" => {
                    self.dispatcher.registry_url = value.clone();
                    self.extractor.registry_url = value;
                }
                "FRAMESIFT_EXTRACTOR_ID" => self.extractor.id = value,
                "FRAMESIFT_EXTRACTOR_URL" => self.extractor.advertise_url = value,
                "FRAMESIFT_FRAME_DIR" => {
                    self.extractor.frames_root = value.clone();
                    self.ingest.frames_root = value;
                }
                "FRAMESIFT_EMBEDDING_URL" => self.vector.embedding_url = value,
                "FRAMESIFT_DATABASE_URL" => self.registry.database_path = value,
                _ => {}
            }
        }
    }
}

/// Settings shared by every role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Base directory for databases when paths are relative.
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            data_dir: "~/.framesift/data".to_string(),
        }
    }
}

/// Registry service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Listen address.
    pub bind: String,
    /// SQLite file holding the worker records.
    pub database_path: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            database_path: "registry.db".to_string(),
        }
    }
}

/// Dispatcher ("process video" router) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub bind: String,
    pub registry_url: String,
    /// Timeout for each outbound call (lease and forward).
    pub request_timeout_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            registry_url: "http://registry:8000".to_string(),
            request_timeout_secs: 10,
        }
    }
}

/// Extraction worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Unique worker id announced to the registry.
    pub id: String,
    /// Base URL the dispatcher should use to reach this worker.
    pub advertise_url: String,
    pub bind: String,
    pub registry_url: String,
    /// Shared root where frame directories are staged.
    pub frames_root: String,
    /// Sampled frames per second.
    pub sampling_rate: f64,
    /// ffmpeg executable used by the extraction transform.
    pub ffmpeg_path: String,
    /// Release attempts before the worker re-registers to return its lease.
    /// Registration itself retries until the registry answers.
    pub release_retries: u32,
    /// Constant delay between registry retries.
    pub retry_backoff_secs: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            id: "extractor-1".to_string(),
            advertise_url: "http://extractor-1:9000".to_string(),
            bind: "0.0.0.0:9000".to_string(),
            registry_url: "http://registry:8000".to_string(),
            frames_root: "/app/extracted_frames".to_string(),
            sampling_rate: 0.2,
            ffmpeg_path: "ffmpeg".to_string(),
            release_retries: 3,
            retry_backoff_secs: 2,
        }
    }
}

/// Ingestion pipeline (embedder) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Shared root scanned for frame directories.
    pub frames_root: String,
    /// Maximum records per flush.
    pub batch_size: usize,
    /// Sleep after a cycle that found no unprocessed directory.
    pub idle_wait_secs: u64,
    /// Sleep after an unexpected top-level failure.
    pub error_backoff_secs: u64,
    /// Completion marker file name.
    pub marker_name: String,
    /// File extensions treated as frames (lowercase, no dot).
    pub frame_extensions: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            frames_root: "/app/extracted_frames".to_string(),
            batch_size: 100,
            idle_wait_secs: 10,
            error_backoff_secs: 30,
            marker_name: ".processed".to_string(),
            frame_extensions: vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()],
        }
    }
}

/// Vector store and embedding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    /// Embedding dimension, fixed by the embedding transform.
    pub dimensions: usize,
    /// SQLite file holding the embeddings collection.
    pub database_path: String,
    /// Distance metric. Only "l2" is supported.
    pub metric: String,
    /// Build-time breadth of the approximate index.
    pub nlist: usize,
    /// Query-time breadth of the approximate index.
    pub nprobe: usize,
    /// Base URL of the external embedding model server. Empty selects the
    /// deterministic mock embedder.
    pub embedding_url: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            dimensions: 512,
            database_path: "vectors.db".to_string(),
            metric: "l2".to_string(),
            nlist: 128,
            nprobe: 10,
            embedding_url: String::new(),
        }
    }
}

/// Text search service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub bind: String,
    /// Results returned when the request gives no limit.
    pub top_k: usize,
    /// Upper bound on a requested limit.
    pub max_top_k: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8100".to_string(),
            top_k: 5,
            max_top_k: 100,
        }
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// Resolve a database path against the data directory unless it is absolute.
pub fn resolve_in_data_dir(data_dir: &str, path: &str) -> PathBuf {
    let candidate = expand_home(path);
    if candidate.is_absolute() {
        candidate
    } else {
        expand_home(data_dir).join(candidate)
    }
}
