//! Job lifecycle types
//!
//! A job is one user-submitted file moving through the pipeline. Its status is a
//! closed enum; every legal move between statuses is listed in
//! [`JobStatus::allowed_predecessors`], so stores can apply a transition as a
//! single conditional update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{DomainError, Result};
use crate::events::JobCreatedEvent;

/// Lifecycle status of a job
///
/// `Pending` is set at creation and `Chunking` once every chunk of the job has
/// been published. `Running`, `Completed` and `Failed` are driven by
/// downstream services and only accepted here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Chunking,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Every status, in lifecycle order
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Chunking,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Chunking => "CHUNKING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    /// Statuses a job may hold immediately before moving to `self`.
    ///
    /// `Chunking -> Chunking` is legal: a redelivered job-created event re-runs
    /// the whole split and publishes the same chunks again.
    pub fn allowed_predecessors(&self) -> &'static [JobStatus] {
        match self {
            JobStatus::Pending => &[],
            JobStatus::Chunking => &[JobStatus::Pending, JobStatus::Chunking],
            JobStatus::Running => &[JobStatus::Chunking],
            JobStatus::Completed => &[JobStatus::Running],
            JobStatus::Failed => &[JobStatus::Pending, JobStatus::Chunking, JobStatus::Running],
        }
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        next.allowed_predecessors().contains(self)
    }

    /// Validate a move from `self` to `next`, returning `next` on success
    pub fn transition(self, next: JobStatus) -> Result<JobStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::UnknownStatus(s.to_string()))
    }
}

/// Durable job record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub user_id: String,
    /// Object-store key of the uploaded source file
    pub file_key: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker; rows are never physically removed
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Build a freshly created job in `Pending` status
    pub fn pending(job_id: Uuid, user_id: impl Into<String>, file_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            user_id: user_id.into(),
            file_key: file_key.into(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// The event announcing this job to the chunker
    pub fn created_event(&self) -> JobCreatedEvent {
        JobCreatedEvent {
            job_id: self.job_id,
            user_id: self.user_id.clone(),
            file_key: self.file_key.clone(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!(matches!(
            "chunking".parse::<JobStatus>(),
            Err(DomainError::UnknownStatus(_))
        ));
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let json = serde_json::to_string(&JobStatus::Chunking).unwrap();
        assert_eq!(json, "\"CHUNKING\"");
    }

    #[test]
    fn test_forward_transitions() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Chunking));
        assert!(JobStatus::Chunking.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn test_redelivery_keeps_chunking_legal() {
        assert_eq!(
            JobStatus::Chunking.transition(JobStatus::Chunking),
            Ok(JobStatus::Chunking)
        );
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Chunking));
        assert!(!JobStatus::Chunking.can_transition_to(JobStatus::Pending));

        for terminal in [JobStatus::Completed, JobStatus::Failed] {
            assert!(terminal.is_terminal());
            for next in JobStatus::ALL {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }

        let err = JobStatus::Completed.transition(JobStatus::Chunking).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidTransition {
                from: JobStatus::Completed,
                to: JobStatus::Chunking
            }
        );
    }

    #[test]
    fn test_pending_job_and_created_event() {
        let id = Uuid::new_v4();
        let job = Job::pending(id, "user-1", format!("jobs/{}/data.csv", id));

        assert_eq!(job.status, JobStatus::Pending);
        assert!(!job.is_deleted());

        let event = job.created_event();
        assert_eq!(event.job_id, id);
        assert_eq!(event.user_id, "user-1");
        assert_eq!(event.file_key, job.file_key);
    }
}
