//! Mapping from job errors to HTTP responses.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::api::types::ErrorResponse;
use crate::error::{AuthError, JobError};

/// A `JobError` on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub JobError);

impl From<JobError> for ApiError {
    fn from(e: JobError) -> Self {
        ApiError(e)
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError(JobError::Auth(e))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            JobError::Auth(_) => StatusCode::UNAUTHORIZED,
            JobError::NotFound { .. } => StatusCode::NOT_FOUND,
            JobError::Forbidden => StatusCode::FORBIDDEN,
            JobError::InvalidTransition { .. } | JobError::Conflict { .. } => StatusCode::CONFLICT,
            JobError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            JobError::Storage(_) | JobError::Dispatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self.0 {
            JobError::Auth(_) => "authentication_failed",
            JobError::NotFound { .. } => "not_found",
            JobError::Forbidden => "forbidden",
            JobError::InvalidTransition { .. } => "invalid_transition",
            JobError::Conflict { .. } => "conflict",
            JobError::InvalidRequest { .. } => "invalid_request",
            JobError::Storage(_) => "storage_failure",
            JobError::Dispatch { .. } => "dispatch_failure",
        }
    }

    fn detail(&self) -> String {
        match self.0 {
            // Same text whether the job is missing or owned by someone else.
            JobError::NotFound { .. } => "Job not found".to_string(),
            JobError::Auth(_) => "Invalid authentication credentials".to_string(),
            ref other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self.0 {
            JobError::Storage(ref e) => tracing::error!("Request failed with store error: {}", e),
            JobError::Auth(ref e) => tracing::debug!("Rejected credential: {}", e),
            _ => {}
        }

        let body = ErrorResponse {
            error: self.kind().to_string(),
            detail: self.detail(),
            job_id: match self.0 {
                // Reveal the id only where the caller created the job.
                JobError::Dispatch { .. } => self.0.job_id(),
                _ => None,
            },
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
