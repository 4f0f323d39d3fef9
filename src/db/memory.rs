//! In-memory job store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::JobStore;
use crate::error::DatabaseError;
use crate::jobs::{Job, JobPatch, JobScope, JobStatus, JobSummary, NewJob};

/// Job store held in process memory. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryJobStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, Job>,
    /// Latest creation stamp handed out; keeps listing order strict.
    last_created: Option<DateTime<Utc>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub async fn len(&self) -> usize {
        self.inner.read().await.jobs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &NewJob) -> Result<Job, DatabaseError> {
        let mut inner = self.inner.write().await;

        let mut now = Utc::now();
        if let Some(last) = inner.last_created
            && now <= last
        {
            now = last + Duration::microseconds(1);
        }
        inner.last_created = Some(now);

        let record = Job {
            id: Uuid::new_v4(),
            owner: job.owner.clone(),
            name: job.name.clone(),
            model_type: job.model_type.clone(),
            dataset_path: job.dataset_path.clone(),
            hyperparameters: job.hyperparameters.clone(),
            status: JobStatus::Pending,
            dispatch_reference: None,
            error_message: None,
            training_logs: None,
            created_at: now,
            updated_at: now,
        };
        inner.jobs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid, scope: &JobScope) -> Result<Option<Job>, DatabaseError> {
        Ok(self
            .inner
            .read()
            .await
            .jobs
            .get(&id)
            .filter(|job| scope.permits(job.owner.as_deref()))
            .cloned())
    }

    async fn list(
        &self,
        scope: &JobScope,
        limit: Option<usize>,
    ) -> Result<Vec<Job>, DatabaseError> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|job| scope.permits(job.owner.as_deref()))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            jobs.truncate(limit);
        }
        Ok(jobs)
    }

    async fn update(
        &self,
        id: Uuid,
        patch: &JobPatch,
        scope: &JobScope,
        expected_status: Option<JobStatus>,
    ) -> Result<Option<Job>, DatabaseError> {
        let mut inner = self.inner.write().await;
        let Some(job) = inner.jobs.get_mut(&id) else {
            return Ok(None);
        };
        if !scope.permits(job.owner.as_deref()) {
            return Ok(None);
        }
        if let Some(expected) = expected_status
            && job.status != expected
        {
            return Ok(None);
        }

        let now = Utc::now().max(job.updated_at);
        patch.apply_to(job, now);
        Ok(Some(job.clone()))
    }

    async fn summary(&self, scope: &JobScope) -> Result<JobSummary, DatabaseError> {
        let inner = self.inner.read().await;
        let mut summary = JobSummary::default();
        for job in inner
            .jobs
            .values()
            .filter(|job| scope.permits(job.owner.as_deref()))
        {
            summary.add(job.status, 1);
        }
        Ok(summary)
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}
