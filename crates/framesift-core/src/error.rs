use thiserror::Error;

/// Top-level error type for Framesift.
///
/// Variants follow the coordination protocol's failure classes: capacity and
/// lease errors come from the registry, transform errors from the external
/// extraction and embedding collaborators, connectivity and downstream errors
/// from peers reached over HTTP. The remaining variants are ambient.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FramesiftError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("No available workers")]
    Capacity,

    #[error("Lease conflict on worker {id}")]
    LeaseConflict { id: String },

    #[error("Worker not found: {id}")]
    NotFound { id: String },

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Downstream error ({status}): {message}")]
    Downstream { status: u16, message: String },

    #[error("Worker is already processing a job")]
    WorkerBusy,

    #[error("Vector store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl FramesiftError {
    /// True for failures a loop should back off on and retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FramesiftError::Connectivity(_)
                | FramesiftError::StoreUnavailable(_)
                | FramesiftError::Io(_)
        )
    }
}

impl From<toml::de::Error> for FramesiftError {
    fn from(err: toml::de::Error) -> Self {
        FramesiftError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for FramesiftError {
    fn from(err: toml::ser::Error) -> Self {
        FramesiftError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for FramesiftError {
    fn from(err: serde_json::Error) -> Self {
        FramesiftError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Framesift operations.
pub type Result<T> = std::result::Result<T, FramesiftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FramesiftError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_error_display_protocol_variants() {
        let cases: Vec<(FramesiftError, &str)> = vec![
            (FramesiftError::Capacity, "No available workers"),
            (
                FramesiftError::LeaseConflict { id: "w1".into() },
                "Lease conflict on worker w1",
            ),
            (
                FramesiftError::NotFound { id: "w9".into() },
                "Worker not found: w9",
            ),
            (
                FramesiftError::Downstream {
                    status: 502,
                    message: "bad gateway".into(),
                },
                "Downstream error (502): bad gateway",
            ),
            (
                FramesiftError::WorkerBusy,
                "Worker is already processing a job",
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FramesiftError = io_err.into();
        assert!(matches!(err, FramesiftError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let err: std::result::Result<toml::Value, _> = toml::from_str("invalid = [[[");
        let err: FramesiftError = err.unwrap_err().into();
        assert!(matches!(err, FramesiftError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let err: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let err: FramesiftError = err.unwrap_err().into();
        assert!(matches!(err, FramesiftError::Serialization(_)));
    }

    #[test]
    fn test_transient_classification() {
        assert!(FramesiftError::Connectivity("refused".into()).is_transient());
        assert!(FramesiftError::StoreUnavailable("closed".into()).is_transient());
        assert!(!FramesiftError::Capacity.is_transient());
        assert!(!FramesiftError::NotFound { id: "x".into() }.is_transient());
        assert!(!FramesiftError::Transform("decode".into()).is_transient());
    }
}
