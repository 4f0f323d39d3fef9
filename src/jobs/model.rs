//! Job records and the inputs that create and mutate them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Principal;
use crate::jobs::JobStatus;

/// Model type used when a submission does not name one.
pub const DEFAULT_MODEL_TYPE: &str = "policy_network";

/// Free-form training parameters, forwarded verbatim to the queue.
pub type Hyperparameters = serde_json::Map<String, serde_json::Value>;

/// A persisted training job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    /// Submitting principal. `None` only for jobs created in the anonymous tier.
    pub owner: Option<String>,
    pub name: String,
    pub model_type: String,
    pub dataset_path: Option<String>,
    pub hyperparameters: Hyperparameters,
    pub status: JobStatus,
    /// Correlation id handed back by the execution backend.
    pub dispatch_reference: Option<String>,
    pub error_message: Option<String>,
    pub training_logs: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A job specification as supplied by a caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobSubmission {
    pub name: String,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub dataset_path: Option<String>,
    #[serde(default)]
    pub hyperparameters: Option<Hyperparameters>,
}

impl JobSubmission {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_model_type(mut self, model_type: impl Into<String>) -> Self {
        self.model_type = Some(model_type.into());
        self
    }

    pub fn with_dataset_path(mut self, path: impl Into<String>) -> Self {
        self.dataset_path = Some(path.into());
        self
    }

    pub fn with_hyperparameters(mut self, params: Hyperparameters) -> Self {
        self.hyperparameters = Some(params);
        self
    }
}

/// Fields written by `JobStore::insert`. The store assigns `id`, `status`
/// (always `pending`) and both timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub owner: Option<String>,
    pub name: String,
    pub model_type: String,
    pub dataset_path: Option<String>,
    pub hyperparameters: Hyperparameters,
}

impl NewJob {
    /// Resolve submission defaults against the submitting principal.
    pub fn from_submission(submission: JobSubmission, owner: Option<&Principal>) -> Self {
        Self {
            owner: owner.map(|p| p.as_str().to_string()),
            name: submission.name.trim().to_string(),
            model_type: submission
                .model_type
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL_TYPE.to_string()),
            dataset_path: submission.dataset_path,
            hyperparameters: submission.hyperparameters.unwrap_or_default(),
        }
    }
}

/// Partial update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPatch {
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default, alias = "modal_call_id")]
    pub dispatch_reference: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub training_logs: Option<String>,
}

impl JobPatch {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// The compensating write applied when dispatch fails.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error_message: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn with_dispatch_reference(mut self, reference: impl Into<String>) -> Self {
        self.dispatch_reference = Some(reference.into());
        self
    }

    pub fn with_training_logs(mut self, logs: impl Into<String>) -> Self {
        self.training_logs = Some(logs.into());
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.dispatch_reference.is_none()
            && self.error_message.is_none()
            && self.training_logs.is_none()
    }

    /// Merge this patch into a record in place, refreshing `updated_at`.
    pub fn apply_to(&self, job: &mut Job, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(ref reference) = self.dispatch_reference {
            job.dispatch_reference = Some(reference.clone());
        }
        if let Some(ref message) = self.error_message {
            job.error_message = Some(message.clone());
        }
        if let Some(ref logs) = self.training_logs {
            job.training_logs = Some(logs.clone());
        }
        job.updated_at = now;
    }
}

/// Which jobs a query may see.
///
/// Every store read and write goes through one of these, so owner-scoped
/// and administrative access share a single code path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobScope {
    /// Only jobs owned by this principal.
    Owner(Principal),
    /// Only jobs without an owner (anonymous tier).
    Unowned,
    /// Every job. Reserved for service credentials.
    Unrestricted,
}

impl JobScope {
    /// Whether a job with the given owner is visible in this scope.
    pub fn permits(&self, owner: Option<&str>) -> bool {
        match self {
            JobScope::Owner(principal) => owner == Some(principal.as_str()),
            JobScope::Unowned => owner.is_none(),
            JobScope::Unrestricted => true,
        }
    }
}

impl std::fmt::Display for JobScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobScope::Owner(p) => write!(f, "owner:{}", p),
            JobScope::Unowned => write!(f, "unowned"),
            JobScope::Unrestricted => write!(f, "unrestricted"),
        }
    }
}

/// Message handed to the work queue for a newly created job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchMessage {
    pub job_id: Uuid,
    pub action: String,
    pub owner: Option<String>,
    pub job_data: DispatchPayload,
}

/// Snapshot of the submitted fields carried in a dispatch message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchPayload {
    pub name: String,
    pub model_type: String,
    pub dataset_path: Option<String>,
    pub hyperparameters: Hyperparameters,
}

impl DispatchMessage {
    pub const START_TRAINING: &'static str = "start_training";

    pub fn start_training(job: &Job) -> Self {
        Self {
            job_id: job.id,
            action: Self::START_TRAINING.to_string(),
            owner: job.owner.clone(),
            job_data: DispatchPayload {
                name: job.name.clone(),
                model_type: job.model_type.clone(),
                dataset_path: job.dataset_path.clone(),
                hyperparameters: job.hyperparameters.clone(),
            },
        }
    }
}

/// Job counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub total: i64,
    pub pending: i64,
    pub training: i64,
    pub completed: i64,
    pub failed: i64,
}

impl JobSummary {
    pub fn add(&mut self, status: JobStatus, count: i64) {
        self.total += count;
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Training => self.training += count,
            JobStatus::Completed => self.completed += count,
            JobStatus::Failed => self.failed += count,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample_job() -> Job {
        let now = Utc::now();
        Job {
            id: Uuid::new_v4(),
            owner: Some("user_1".into()),
            name: "grasp-v1".into(),
            model_type: DEFAULT_MODEL_TYPE.into(),
            dataset_path: None,
            hyperparameters: Hyperparameters::new(),
            status: JobStatus::Pending,
            dispatch_reference: None,
            error_message: None,
            training_logs: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_submission_defaults() {
        let new = NewJob::from_submission(JobSubmission::new("  grasp-v1 "), None);
        assert_eq!(new.name, "grasp-v1");
        assert_eq!(new.model_type, DEFAULT_MODEL_TYPE);
        assert!(new.hyperparameters.is_empty());
        assert!(new.owner.is_none());
    }

    #[test]
    fn test_submission_keeps_owner_and_model_type() {
        let owner = Principal::new("user_1");
        let sub = JobSubmission::new("reach").with_model_type("diffusion_policy");
        let new = NewJob::from_submission(sub, Some(&owner));
        assert_eq!(new.owner.as_deref(), Some("user_1"));
        assert_eq!(new.model_type, "diffusion_policy");
    }

    #[test]
    fn test_patch_only_touches_present_fields() {
        let mut job = sample_job();
        job.dispatch_reference = Some("bk-1".into());
        let before = job.clone();
        let later = before.updated_at + chrono::Duration::seconds(5);

        JobPatch::default()
            .with_training_logs("epoch 1")
            .apply_to(&mut job, later);

        assert_eq!(job.status, before.status);
        assert_eq!(job.dispatch_reference, before.dispatch_reference);
        assert_eq!(job.error_message, before.error_message);
        assert_eq!(job.training_logs.as_deref(), Some("epoch 1"));
        assert_eq!(job.updated_at, later);
    }

    #[test]
    fn test_patch_accepts_legacy_field_name() {
        let patch: JobPatch =
            serde_json::from_str(r#"{"status":"training","modal_call_id":"fc-9"}"#).unwrap();
        assert_eq!(patch.status, Some(JobStatus::Training));
        assert_eq!(patch.dispatch_reference.as_deref(), Some("fc-9"));
    }

    #[test]
    fn test_scope_permits() {
        let owner = JobScope::Owner(Principal::new("u1"));
        assert!(owner.permits(Some("u1")));
        assert!(!owner.permits(Some("u2")));
        assert!(!owner.permits(None));

        assert!(JobScope::Unowned.permits(None));
        assert!(!JobScope::Unowned.permits(Some("u1")));

        assert!(JobScope::Unrestricted.permits(None));
        assert!(JobScope::Unrestricted.permits(Some("u2")));
    }

    #[test]
    fn test_dispatch_message_snapshot() {
        let mut job = sample_job();
        job.hyperparameters
            .insert("lr".into(), serde_json::json!(0.001));
        let msg = DispatchMessage::start_training(&job);

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["job_id"], serde_json::json!(job.id));
        assert_eq!(value["action"], "start_training");
        assert_eq!(value["owner"], "user_1");
        assert_eq!(value["job_data"]["name"], "grasp-v1");
        assert_eq!(value["job_data"]["hyperparameters"]["lr"], 0.001);
    }

    #[test]
    fn test_summary_add() {
        let mut summary = JobSummary::default();
        summary.add(JobStatus::Pending, 2);
        summary.add(JobStatus::Failed, 1);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.failed, 1);
    }
}
