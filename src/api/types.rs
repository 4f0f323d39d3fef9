//! Request and response DTOs for the HTTP API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on `?limit=` for listings.
pub const MAX_LIST_LIMIT: usize = 1000;

#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
    pub queue: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn limit(&self) -> Option<usize> {
        self.limit.map(|l| l.min(MAX_LIST_LIMIT))
    }
}

/// Error body returned for every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable kind, e.g. `not_found` or `dispatch_failure`.
    pub error: String,
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_capped() {
        assert_eq!(ListQuery { limit: Some(5) }.limit(), Some(5));
        assert_eq!(
            ListQuery {
                limit: Some(1_000_000)
            }
            .limit(),
            Some(MAX_LIST_LIMIT)
        );
        assert_eq!(ListQuery::default().limit(), None);
    }

    #[test]
    fn test_error_response_omits_missing_job_id() {
        let body = ErrorResponse {
            error: "not_found".into(),
            detail: "Job not found".into(),
            job_id: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("job_id").is_none());
    }
}
