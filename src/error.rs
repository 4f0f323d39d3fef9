//! Error types for the job manager and its collaborators.

use std::time::Duration;

use uuid::Uuid;

use crate::jobs::{Job, JobStatus};

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Job store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Job store did not respond within {0:?}")]
    Timeout(Duration),
}

impl From<deadpool_postgres::PoolError> for DatabaseError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        DatabaseError::Pool(e.to_string())
    }
}

impl From<refinery::Error> for DatabaseError {
    fn from(e: refinery::Error) -> Self {
        DatabaseError::Migration(e.to_string())
    }
}

/// Work queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Work queue rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Work queue request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Work queue channel closed")]
    Closed,

    #[error("Work queue did not respond within {0:?}")]
    Timeout(Duration),
}

/// Caller authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer credential")]
    MissingCredential,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token has expired")]
    Expired,

    #[error("Token missing subject claim")]
    MissingSubject,

    #[error("No signing key found for kid '{0}'")]
    KeyNotFound(String),

    #[error("Failed to fetch signing keys: {0}")]
    JwksFetch(String),

    #[error("Identity resolution did not finish within {0:?}")]
    Timeout(Duration),
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidSignature => AuthError::InvalidToken("invalid signature".into()),
            _ => AuthError::InvalidToken(e.to_string()),
        }
    }
}

/// Job lifecycle errors.
///
/// `Auth`, `NotFound`, `Storage` and `Dispatch` are the four kinds callers
/// must be able to tell apart; the rest reject a request before any write.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Job {id} not found")]
    NotFound { id: Uuid },

    #[error("Job store failure: {0}")]
    Storage(#[from] DatabaseError),

    /// The job was persisted but could not be enqueued. `job` holds the
    /// compensated (failed) record, or the pending snapshot if the
    /// compensating write did not land.
    #[error("Job created but failed to queue for processing: {source}")]
    Dispatch {
        job: Option<Box<Job>>,
        #[source]
        source: QueueError,
    },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Concurrent status updates kept winning the compare-and-set.
    #[error("Job {id} was modified concurrently, retry the update")]
    Conflict { id: Uuid },

    #[error("Operation requires a service credential")]
    Forbidden,
}

impl JobError {
    /// Id of the job the error refers to, when one exists.
    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            JobError::NotFound { id } | JobError::Conflict { id } => Some(*id),
            JobError::Dispatch { job, .. } => job.as_ref().map(|j| j.id),
            _ => None,
        }
    }
}

/// Result type for job lifecycle operations.
pub type Result<T> = std::result::Result<T, JobError>;
