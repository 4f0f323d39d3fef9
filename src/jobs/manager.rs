//! Job lifecycle manager.
//!
//! Owns the submit-and-dispatch transaction, status updates, and scoped
//! retrieval. Holds no per-request state; everything durable lives in the
//! job store. Collaborators are injected so tests can substitute doubles.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::auth::{IdentityResolver, Principal};
use crate::config::Timeouts;
use crate::db::JobStore;
use crate::error::{AuthError, DatabaseError, JobError, QueueError, Result};
use crate::jobs::state::validate_patch;
use crate::jobs::{
    DispatchMessage, Job, JobPatch, JobScope, JobStatus, JobSubmission, JobSummary, NewJob,
};
use crate::queue::WorkQueue;

/// Diagnostic written to a job whose dispatch failed.
pub const DISPATCH_FAILURE_MESSAGE: &str = "Failed to queue job";

/// Compare-and-set attempts for a status update before giving up.
const MAX_UPDATE_ATTEMPTS: usize = 3;

/// Coordinates the job store, work queue, and identity resolver.
pub struct JobManager {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn WorkQueue>,
    resolver: Arc<dyn IdentityResolver>,
    timeouts: Timeouts,
}

impl JobManager {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn WorkQueue>,
        resolver: Arc<dyn IdentityResolver>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            store,
            queue,
            resolver,
            timeouts,
        }
    }

    pub fn queue(&self) -> &Arc<dyn WorkQueue> {
        &self.queue
    }

    // ==================== Submission ====================

    /// Persist a job, then hand it to the work queue.
    ///
    /// The store write must succeed before anything is enqueued. If the
    /// queue refuses the message the job is marked failed and the error
    /// carries the failed record. A returned job is `pending`, which means
    /// created and enqueued, not started.
    pub async fn submit(&self, submission: JobSubmission, owner: Option<&Principal>) -> Result<Job> {
        let new_job = NewJob::from_submission(submission, owner);
        if new_job.name.is_empty() {
            return Err(JobError::InvalidRequest {
                reason: "name must not be empty".to_string(),
            });
        }

        let job = self
            .store_call(self.store.insert(&new_job))
            .await
            .map_err(|e| {
                tracing::error!(owner = ?new_job.owner, "Failed to persist job: {}", e);
                JobError::Storage(e)
            })?;

        let message = DispatchMessage::start_training(&job);
        match self.queue_call(self.queue.send(&message)).await {
            Ok(()) => {
                tracing::info!(
                    job_id = %job.id,
                    owner = ?job.owner,
                    queue = self.queue.name(),
                    "Job created and queued"
                );
                Ok(job)
            }
            Err(source) => {
                tracing::warn!(job_id = %job.id, "Dispatch failed, marking job failed: {}", source);
                let job = self.compensate(job).await;
                Err(JobError::Dispatch {
                    job: Some(Box::new(job)),
                    source,
                })
            }
        }
    }

    /// Mark a job whose dispatch failed. Returns the best known record.
    ///
    /// The write only lands on a job that is still `pending`; a queue that
    /// delivered despite reporting failure may already have moved it on.
    async fn compensate(&self, job: Job) -> Job {
        let patch = JobPatch::failed(DISPATCH_FAILURE_MESSAGE);
        let scope = JobScope::Unrestricted;
        match self
            .store_call(
                self.store
                    .update(job.id, &patch, &scope, Some(JobStatus::Pending)),
            )
            .await
        {
            Ok(Some(failed)) => failed,
            Ok(None) => match self.store_call(self.store.get(job.id, &scope)).await {
                Ok(Some(current)) => {
                    tracing::info!(
                        job_id = %job.id,
                        status = %current.status,
                        "Job left pending before compensation, keeping its status"
                    );
                    current
                }
                Ok(None) => {
                    tracing::error!(job_id = %job.id, "Job vanished before it could be marked failed");
                    job
                }
                Err(e) => {
                    tracing::error!(job_id = %job.id, "Failed to re-read job after dispatch failure: {}", e);
                    job
                }
            },
            Err(e) => {
                tracing::error!(
                    job_id = %job.id,
                    "Compensating write failed, job left pending without queued work: {}",
                    e
                );
                job
            }
        }
    }

    // ==================== Status updates ====================

    /// Merge a partial update into a job visible in `scope`.
    ///
    /// The write is conditional on the status seen during validation, so a
    /// concurrent transition cannot slip past the state machine. Two
    /// concurrent writes to the same non-status field are last-write-wins.
    pub async fn update_status(&self, id: Uuid, patch: JobPatch, scope: &JobScope) -> Result<Job> {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let current = self.get(id, scope).await?;
            validate_patch(&current, &patch)?;

            let updated = self
                .store_call(self.store.update(id, &patch, scope, Some(current.status)))
                .await?;

            match updated {
                Some(job) => {
                    tracing::info!(
                        job_id = %id,
                        from = %current.status,
                        status = %job.status,
                        "Job updated"
                    );
                    return Ok(job);
                }
                None => {
                    tracing::debug!(job_id = %id, attempt, "Job changed during update, retrying");
                }
            }
        }

        tracing::warn!(job_id = %id, "Giving up on contended job update");
        Err(JobError::Conflict { id })
    }

    // ==================== Retrieval ====================

    /// Fetch a job. Jobs outside `scope` are reported as missing.
    pub async fn get(&self, id: Uuid, scope: &JobScope) -> Result<Job> {
        self.store_call(self.store.get(id, scope))
            .await?
            .ok_or(JobError::NotFound { id })
    }

    /// Jobs visible in `scope`, newest first.
    pub async fn list(&self, scope: &JobScope, limit: Option<usize>) -> Result<Vec<Job>> {
        Ok(self.store_call(self.store.list(scope, limit)).await?)
    }

    /// Bounded reachability check of the job store.
    pub async fn check_store(&self) -> std::result::Result<(), DatabaseError> {
        self.store_call(self.store.ping()).await
    }

    /// Counts by status for jobs visible in `scope`.
    pub async fn summary(&self, scope: &JobScope) -> Result<JobSummary> {
        Ok(self.store_call(self.store.summary(scope)).await?)
    }

    // ==================== Callers ====================

    /// Resolve a credential, failing if it is absent or invalid.
    pub async fn resolve_caller(&self, credential: Option<&str>) -> Result<Principal> {
        let credential = credential.ok_or(AuthError::MissingCredential)?;
        let timeout = self.timeouts.auth;
        let principal = tokio::time::timeout(timeout, self.resolver.resolve(credential))
            .await
            .map_err(|_| AuthError::Timeout(timeout))??;
        Ok(principal)
    }

    /// Resolve a credential, treating any failure as "no caller".
    pub async fn resolve_caller_optional(&self, credential: Option<&str>) -> Option<Principal> {
        credential?;
        match self.resolve_caller(credential).await {
            Ok(principal) => Some(principal),
            Err(e) => {
                tracing::debug!("Ignoring unresolvable credential: {}", e);
                None
            }
        }
    }

    // ==================== Timeouts ====================

    async fn store_call<T, F>(&self, fut: F) -> std::result::Result<T, DatabaseError>
    where
        F: Future<Output = std::result::Result<T, DatabaseError>>,
    {
        bounded(self.timeouts.store, fut, DatabaseError::Timeout).await
    }

    async fn queue_call<T, F>(&self, fut: F) -> std::result::Result<T, QueueError>
    where
        F: Future<Output = std::result::Result<T, QueueError>>,
    {
        bounded(self.timeouts.queue, fut, QueueError::Timeout).await
    }
}

/// Run `fut` with a deadline, mapping expiry into the collaborator's error.
async fn bounded<T, E, F>(
    limit: Duration,
    fut: F,
    on_timeout: impl FnOnce(Duration) -> E,
) -> std::result::Result<T, E>
where
    F: Future<Output = std::result::Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(limit)),
    }
}
