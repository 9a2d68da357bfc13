//! Request and response bodies of the registry endpoints.

use serde::{Deserialize, Serialize};

use framesift_core::types::LeaseOutcome;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(alias = "extractor_id")]
    pub id: String,
    #[serde(alias = "extractor_url")]
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRequest {
    #[serde(alias = "extractor_id")]
    pub id: String,
    #[serde(default)]
    pub outcome: LeaseOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseResponse {
    pub id: String,
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_accepts_legacy_field_names() {
        let req: RegisterRequest = serde_json::from_str(
            r#"{"extractor_id": "extractor-1", "extractor_url": "http://extractor-1:9000"}"#,
        )
        .unwrap();
        assert_eq!(req.id, "extractor-1");
        assert_eq!(req.endpoint, "http://extractor-1:9000");
    }

    #[test]
    fn test_release_outcome_defaults_to_success() {
        let req: ReleaseRequest = serde_json::from_str(r#"{"id": "w1"}"#).unwrap();
        assert_eq!(req.outcome, LeaseOutcome::Success);

        let req: ReleaseRequest =
            serde_json::from_str(r#"{"id": "w1", "outcome": "failure"}"#).unwrap();
        assert_eq!(req.outcome, LeaseOutcome::Failure);
    }
}
