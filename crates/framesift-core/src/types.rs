use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FramesiftError;

// =============================================================================
// Worker lease state
// =============================================================================

/// Lease state of an extraction worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Free to be leased.
    Available,
    /// Leased to exactly one dispatch.
    Busy,
}

/// Events that move a worker between lease states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerEvent {
    Register,
    Lease,
    Release,
}

impl WorkerState {
    /// Apply an event, returning the next state.
    ///
    /// Transition table:
    /// - any       --Register--> Available
    /// - Available --Lease-----> Busy
    /// - Busy      --Lease-----> LeaseConflict
    /// - any       --Release---> Available
    pub fn apply(self, event: WorkerEvent, id: &str) -> Result<WorkerState, FramesiftError> {
        match (self, event) {
            (_, WorkerEvent::Register) => Ok(WorkerState::Available),
            (WorkerState::Available, WorkerEvent::Lease) => Ok(WorkerState::Busy),
            (WorkerState::Busy, WorkerEvent::Lease) => Err(FramesiftError::LeaseConflict {
                id: id.to_string(),
            }),
            (_, WorkerEvent::Release) => Ok(WorkerState::Available),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Available => "available",
            WorkerState::Busy => "busy",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerState {
    type Err = FramesiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(WorkerState::Available),
            "busy" => Ok(WorkerState::Busy),
            other => Err(FramesiftError::Storage(format!(
                "Unknown worker state '{}'",
                other
            ))),
        }
    }
}

/// Outcome a worker reports when it gives its lease back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseOutcome {
    #[default]
    Success,
    Failure,
}

impl LeaseOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseOutcome::Success => "success",
            LeaseOutcome::Failure => "failure",
        }
    }
}

impl FromStr for LeaseOutcome {
    type Err = FramesiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(LeaseOutcome::Success),
            "failure" => Ok(LeaseOutcome::Failure),
            other => Err(FramesiftError::Validation(format!(
                "Unknown lease outcome '{}'",
                other
            ))),
        }
    }
}

// =============================================================================
// Registry records
// =============================================================================

/// A registered extraction worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    /// Globally unique worker id; the sole upsert key.
    pub id: String,
    /// Base URL the dispatcher forwards jobs to.
    pub endpoint: String,
    pub state: WorkerState,
    /// Time of the last state transition.
    pub updated_at: DateTime<Utc>,
}

/// The worker a dispatch was forwarded to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub worker_id: String,
    pub endpoint: String,
}

impl From<&WorkerRecord> for Assignment {
    fn from(record: &WorkerRecord) -> Self {
        Self {
            worker_id: record.id.clone(),
            endpoint: record.endpoint.clone(),
        }
    }
}

/// Job body sent from the dispatcher to a worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionJob {
    pub video_uri: String,
}

// =============================================================================
// Embeddings
// =============================================================================

/// Maximum length in bytes of `EmbeddingRecord::video_id`.
pub const MAX_VIDEO_ID_LEN: usize = 256;
/// Maximum length in bytes of `EmbeddingRecord::frame_path`.
pub const MAX_FRAME_PATH_LEN: usize = 512;

/// One embedded frame, ready for insertion into the vector store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub video_id: String,
    pub frame_path: String,
    pub vector: Vec<f32>,
}

impl EmbeddingRecord {
    /// Check the record against the store schema.
    pub fn validate(&self, dimensions: usize) -> Result<(), FramesiftError> {
        if self.video_id.len() > MAX_VIDEO_ID_LEN {
            return Err(FramesiftError::Validation(format!(
                "video_id exceeds {} bytes",
                MAX_VIDEO_ID_LEN
            )));
        }
        if self.frame_path.len() > MAX_FRAME_PATH_LEN {
            return Err(FramesiftError::Validation(format!(
                "frame_path exceeds {} bytes",
                MAX_FRAME_PATH_LEN
            )));
        }
        if self.vector.len() != dimensions {
            return Err(FramesiftError::Validation(format!(
                "embedding has {} dimensions, expected {}",
                self.vector.len(),
                dimensions
            )));
        }
        Ok(())
    }
}

/// A nearest-neighbor match returned by text search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Store-assigned primary key.
    pub id: i64,
    /// Distance to the query under the index metric (lower is closer).
    pub distance: f32,
    pub video_id: String,
    pub frame_path: String,
}

/// Scale a vector to unit L2 length in place. Zero vectors are left as is.
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in vector.iter_mut() {
            *val /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_resets_any_state() {
        assert_eq!(
            WorkerState::Busy.apply(WorkerEvent::Register, "w1").unwrap(),
            WorkerState::Available
        );
        assert_eq!(
            WorkerState::Available
                .apply(WorkerEvent::Register, "w1")
                .unwrap(),
            WorkerState::Available
        );
    }

    #[test]
    fn test_lease_from_available() {
        assert_eq!(
            WorkerState::Available.apply(WorkerEvent::Lease, "w1").unwrap(),
            WorkerState::Busy
        );
    }

    #[test]
    fn test_lease_from_busy_conflicts() {
        let err = WorkerState::Busy.apply(WorkerEvent::Lease, "w1").unwrap_err();
        assert!(matches!(err, FramesiftError::LeaseConflict { ref id } if id == "w1"));
    }

    #[test]
    fn test_release_is_idempotent() {
        assert_eq!(
            WorkerState::Busy.apply(WorkerEvent::Release, "w1").unwrap(),
            WorkerState::Available
        );
        assert_eq!(
            WorkerState::Available
                .apply(WorkerEvent::Release, "w1")
                .unwrap(),
            WorkerState::Available
        );
    }

    #[test]
    fn test_worker_state_string_roundtrip() {
        for state in [WorkerState::Available, WorkerState::Busy] {
            assert_eq!(state.as_str().parse::<WorkerState>().unwrap(), state);
        }
        assert!("idle".parse::<WorkerState>().is_err());
    }

    #[test]
    fn test_worker_state_serde() {
        let json = serde_json::to_string(&WorkerState::Busy).unwrap();
        assert_eq!(json, "\"busy\"");
    }

    #[test]
    fn test_lease_outcome_parse() {
        assert_eq!("failure".parse::<LeaseOutcome>().unwrap(), LeaseOutcome::Failure);
        assert!("done".parse::<LeaseOutcome>().is_err());
    }

    #[test]
    fn test_embedding_record_validation() {
        let mut record = EmbeddingRecord {
            video_id: "clip_mp4".into(),
            frame_path: "/frames/clip_mp4/frame-00001.jpg".into(),
            vector: vec![0.0; 4],
        };
        assert!(record.validate(4).is_ok());
        assert!(record.validate(8).is_err());

        record.video_id = "v".repeat(MAX_VIDEO_ID_LEN + 1);
        assert!(matches!(
            record.validate(4),
            Err(FramesiftError::Validation(_))
        ));
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0; 3];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0; 3]);
    }
}
