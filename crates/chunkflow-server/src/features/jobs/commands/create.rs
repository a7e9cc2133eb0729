//! Create job command
//!
//! Registers a job for an uploaded file and announces it to the chunker.
//! Steps run strictly in order and each one gates the next: upload the
//! source, insert the `PENDING` row, cache the status, publish the event.

use chrono::{DateTime, Utc};
use chunkflow_common::{keys, Job, JobStatus};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::bus::{
    self,
    retry::{publish_with_retry, RetryError},
    BusError,
};
use crate::cache::CacheError;
use crate::db::JobStoreError;

use super::super::JobsState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobCommand {
    pub file_name: String,
    pub user_id: String,
    #[serde(skip)]
    pub content: Vec<u8>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub file_key: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Job> for CreateJobResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.job_id,
            status: job.status,
            file_key: job.file_key.clone(),
            created_at: job.created_at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CreateJobError {
    #[error("User id is required")]
    UserRequired,
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),
    #[error("File content is required and cannot be empty")]
    ContentRequired,
    #[error("Failed to store source file: {0}")]
    Storage(#[source] anyhow::Error),
    #[error("Failed to persist job: {0}")]
    Persistence(#[from] JobStoreError),
    #[error("Failed to cache job status: {0}")]
    Cache(#[from] CacheError),
    #[error("Failed to encode job-created event: {0}")]
    Encode(#[source] BusError),
    #[error("Failed to publish job-created event: {0}")]
    Publish(#[source] BusError),
    #[error("Job creation cancelled while retrying publish")]
    Cancelled,
}

impl From<RetryError> for CreateJobError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::Cancelled { .. } => CreateJobError::Cancelled,
            RetryError::Exhausted { source, .. } => CreateJobError::Publish(source),
        }
    }
}

impl CreateJobError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CreateJobError::UserRequired
                | CreateJobError::InvalidFileName(_)
                | CreateJobError::ContentRequired
        )
    }
}

impl CreateJobCommand {
    pub fn validate(&self) -> Result<(), CreateJobError> {
        if self.user_id.trim().is_empty() {
            return Err(CreateJobError::UserRequired);
        }
        if let Err(e) = keys::validate_file_name(&self.file_name) {
            return Err(CreateJobError::InvalidFileName(e.to_string()));
        }
        if self.content.is_empty() {
            return Err(CreateJobError::ContentRequired);
        }
        Ok(())
    }
}

#[instrument(skip(state, command), fields(file_name = %command.file_name, user_id = %command.user_id, size = command.content.len()))]
pub async fn handle(
    state: &JobsState,
    command: CreateJobCommand,
) -> Result<CreateJobResponse, CreateJobError> {
    command.validate()?;

    let job_id = Uuid::new_v4();
    let file_key = keys::source_file_key(job_id, &command.file_name)
        .map_err(|e| CreateJobError::InvalidFileName(e.to_string()))?;

    state
        .storage
        .put(&file_key, command.content, command.content_type.as_deref())
        .await
        .map_err(CreateJobError::Storage)?;

    let job = Job::pending(job_id, command.user_id, file_key);
    state.jobs.create(&job).await?;

    state.progress.set_job_status(job_id, job.status).await?;

    let payload = bus::encode(&job.created_event()).map_err(CreateJobError::Encode)?;
    let attempts = publish_with_retry(
        state.publisher.as_ref(),
        &state.job_created_routing_key,
        &payload,
        &state.retry,
        &state.shutdown,
    )
    .await?;

    info!(job_id = %job_id, attempts, "Job created");

    Ok(CreateJobResponse::from(&job))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::features::jobs::test_support::TestJobs;
    use crate::db::JobRepository;
    use chunkflow_common::JobCreatedEvent;

    fn command(file_name: &str, content: &[u8]) -> CreateJobCommand {
        CreateJobCommand {
            file_name: file_name.to_string(),
            user_id: "user-123".to_string(),
            content: content.to_vec(),
            content_type: Some("text/csv".to_string()),
        }
    }

    #[test]
    fn test_validation() {
        assert!(command("data.csv", b"a,b\n").validate().is_ok());
        assert!(matches!(
            command("data.csv", b"").validate(),
            Err(CreateJobError::ContentRequired)
        ));
        assert!(matches!(
            command("", b"x").validate(),
            Err(CreateJobError::InvalidFileName(_))
        ));
        assert!(matches!(
            command("../data.csv", b"x").validate(),
            Err(CreateJobError::InvalidFileName(_))
        ));

        let mut anonymous = command("data.csv", b"x");
        anonymous.user_id = " ".to_string();
        assert!(matches!(anonymous.validate(), Err(CreateJobError::UserRequired)));
    }

    #[tokio::test]
    async fn test_creates_job_in_order() {
        let t = TestJobs::new();
        let response = handle(&t.state, command("data.csv", b"1,2\n3,4\n")).await.unwrap();

        assert_eq!(response.status, JobStatus::Pending);
        assert_eq!(response.file_key, format!("jobs/{}/data.csv", response.job_id));
        assert_eq!(t.storage.get(&response.file_key).unwrap(), b"1,2\n3,4\n");

        let stored = t.jobs.get_by_id(response.job_id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Pending);
        assert_eq!(stored.user_id, "user-123");

        assert_eq!(
            t.state.progress.job_status(response.job_id).await.unwrap(),
            Some(JobStatus::Pending)
        );

        let published = t.publisher.published_to("jobs.created");
        assert_eq!(published.len(), 1);
        let event: JobCreatedEvent = published[0].decode().unwrap();
        assert_eq!(event.job_id, response.job_id);
        assert_eq!(event.file_key, response.file_key);
    }

    #[tokio::test]
    async fn test_storage_failure_leaves_no_job() {
        let t = TestJobs::new();
        t.storage.fail_puts_after(0);

        let err = handle(&t.state, command("data.csv", b"x")).await.unwrap_err();
        assert!(matches!(err, CreateJobError::Storage(_)));
        assert!(t.jobs.is_empty());
        assert!(t.publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_stops_before_cache_and_publish() {
        let t = TestJobs::new();
        t.jobs.set_fail_writes(true);

        let err = handle(&t.state, command("data.json", b"[1]")).await.unwrap_err();
        assert!(matches!(err, CreateJobError::Persistence(_)));
        assert_eq!(t.storage.put_log().len(), 1);
        assert!(t.publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_cache_failure_aborts_before_publish() {
        let t = TestJobs::new();
        t.cache.set_fail_writes(true);

        let err = handle(&t.state, command("data.csv", b"x")).await.unwrap_err();
        assert!(matches!(err, CreateJobError::Cache(_)));
        assert_eq!(t.jobs.len(), 1);
        assert!(t.publisher.attempt_times().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_exhaustion_leaves_pending_job() {
        let t = TestJobs::new();
        t.publisher.fail_next(usize::MAX);

        let err = handle(&t.state, command("data.csv", b"x")).await.unwrap_err();
        assert!(matches!(err, CreateJobError::Publish(_)));
        assert_eq!(t.publisher.attempt_times().len(), 5);
        assert_eq!(t.jobs.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_publish_backoff() {
        let t = TestJobs::new();
        t.publisher.fail_next(usize::MAX);
        t.state.shutdown.cancel();

        let err = handle(&t.state, command("data.csv", b"x")).await.unwrap_err();
        assert!(matches!(err, CreateJobError::Cancelled));
        assert_eq!(t.publisher.attempt_times().len(), 1);
    }
}
