//! Job store abstraction.
//!
//! The manager only talks to `dyn JobStore`; the PostgreSQL store is used
//! in production and the in-memory store backs development runs and tests.

mod memory;
mod postgres;

pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::jobs::{Job, JobPatch, JobScope, JobStatus, JobSummary, NewJob};

/// Durable keyed storage for job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job in `pending` status and return the stored record.
    async fn insert(&self, job: &NewJob) -> Result<Job, DatabaseError>;

    /// Fetch a job if it exists and is visible in `scope`.
    async fn get(&self, id: Uuid, scope: &JobScope) -> Result<Option<Job>, DatabaseError>;

    /// List jobs visible in `scope`, newest first.
    async fn list(&self, scope: &JobScope, limit: Option<usize>)
    -> Result<Vec<Job>, DatabaseError>;

    /// Merge `patch` into a job and refresh `updated_at`.
    ///
    /// When `expected_status` is set the write only lands if the record is
    /// still in that status. Returns `None` when nothing matched (missing,
    /// outside `scope`, or the status moved underneath the caller).
    async fn update(
        &self,
        id: Uuid,
        patch: &JobPatch,
        scope: &JobScope,
        expected_status: Option<JobStatus>,
    ) -> Result<Option<Job>, DatabaseError>;

    /// Count jobs visible in `scope` by status.
    async fn summary(&self, scope: &JobScope) -> Result<JobSummary, DatabaseError>;

    /// Cheap reachability check for health reporting.
    async fn ping(&self) -> Result<(), DatabaseError>;
}
