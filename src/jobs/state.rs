//! Job status state machine.
//!
//! ```text
//!   pending ──► training ──► completed
//!      │            │
//!      └────────────┴──────► failed
//! ```
//!
//! `completed` and `failed` are terminal.

use serde::{Deserialize, Serialize};

use crate::error::JobError;
use crate::jobs::{Job, JobPatch};

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Training,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Training,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Training => "training",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether a job may move from `self` to `target`.
    ///
    /// Re-reporting the current status is accepted. Skips forward are
    /// allowed (`pending -> failed`, `pending -> completed`); nothing leaves
    /// a terminal state and nothing moves backwards.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        if *self == target {
            return true;
        }
        match self {
            JobStatus::Pending => true,
            JobStatus::Training => target.is_terminal(),
            JobStatus::Completed | JobStatus::Failed => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "training" => Ok(JobStatus::Training),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(format!(
                "invalid job status '{}', expected 'pending', 'training', 'completed', or 'failed'",
                s
            )),
        }
    }
}

/// Check a patch against the current record before it is written.
pub fn validate_patch(current: &Job, patch: &JobPatch) -> Result<(), JobError> {
    if patch.is_empty() {
        return Err(JobError::InvalidRequest {
            reason: "update contains no fields".to_string(),
        });
    }

    let target = patch.status.unwrap_or(current.status);
    if !current.status.can_transition_to(target) {
        return Err(JobError::InvalidTransition {
            from: current.status,
            to: target,
        });
    }

    if let Some(ref message) = patch.error_message {
        if target != JobStatus::Failed {
            return Err(JobError::InvalidRequest {
                reason: format!("error_message can only be set on a failed job, not {}", target),
            });
        }
        if message.trim().is_empty() {
            return Err(JobError::InvalidRequest {
                reason: "error_message must not be empty".to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::jobs::Hyperparameters;

    fn job_in(status: JobStatus) -> Job {
        let now = Utc::now();
        Job {
            id: Uuid::new_v4(),
            owner: None,
            name: "j".into(),
            model_type: "policy_network".into(),
            dataset_path: None,
            hyperparameters: Hyperparameters::new(),
            status,
            dispatch_reference: None,
            error_message: None,
            training_logs: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_forward_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Training));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Training.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Training.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [JobStatus::Completed, JobStatus::Failed] {
            assert!(terminal.is_terminal());
            for target in JobStatus::ALL {
                assert_eq!(terminal.can_transition_to(target), target == terminal);
            }
        }
    }

    #[test]
    fn test_no_backward_move() {
        assert!(!JobStatus::Training.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn test_parse_roundtrip() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>(), Ok(status));
        }
        assert!("running".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_resurrection_rejected() {
        let job = job_in(JobStatus::Completed);
        let err = validate_patch(&job, &JobPatch::status(JobStatus::Training)).unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidTransition {
                from: JobStatus::Completed,
                to: JobStatus::Training
            }
        ));
    }

    #[test]
    fn test_logs_on_terminal_job_allowed() {
        let job = job_in(JobStatus::Completed);
        let patch = JobPatch::default().with_training_logs("final metrics");
        assert!(validate_patch(&job, &patch).is_ok());
    }

    #[test]
    fn test_error_message_requires_failed() {
        let job = job_in(JobStatus::Training);
        let patch = JobPatch::default().with_error_message("oom");
        assert!(matches!(
            validate_patch(&job, &patch),
            Err(JobError::InvalidRequest { .. })
        ));

        let patch = JobPatch::failed("oom");
        assert!(validate_patch(&job, &patch).is_ok());
    }

    #[test]
    fn test_empty_patch_rejected() {
        let job = job_in(JobStatus::Pending);
        assert!(matches!(
            validate_patch(&job, &JobPatch::default()),
            Err(JobError::InvalidRequest { .. })
        ));
    }
}
