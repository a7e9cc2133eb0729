//! In-process job repository for tests

use async_trait::async_trait;
use chrono::Utc;
use chunkflow_common::{Job, JobStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::{JobRepository, JobStoreError, JobStoreResult};

/// Jobs in a `HashMap`, applying the same transition rules as PostgreSQL
#[derive(Clone, Default)]
pub struct MemoryJobRepository {
    jobs: Arc<Mutex<HashMap<Uuid, Job>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `create` and `update_status` fail until reset
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn insert(&self, job: Job) {
        self.lock().insert(job.job_id, job);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Job>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_writable(&self) -> JobStoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(JobStoreError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn create(&self, job: &Job) -> JobStoreResult<()> {
        self.check_writable()?;
        let mut jobs = self.lock();
        if jobs.contains_key(&job.job_id) {
            return Err(JobStoreError::Duplicate(job.job_id));
        }
        jobs.insert(job.job_id, job.clone());
        Ok(())
    }

    async fn get_by_id(&self, job_id: Uuid) -> JobStoreResult<Job> {
        self.lock()
            .get(&job_id)
            .filter(|job| !job.is_deleted())
            .cloned()
            .ok_or(JobStoreError::NotFound(job_id))
    }

    async fn update_status(&self, job_id: Uuid, status: JobStatus) -> JobStoreResult<Job> {
        self.check_writable()?;
        let mut jobs = self.lock();
        let job = jobs
            .get_mut(&job_id)
            .filter(|job| !job.is_deleted())
            .ok_or(JobStoreError::NotFound(job_id))?;

        job.status = job
            .status
            .transition(status)
            .map_err(|source| JobStoreError::InvalidTransition { job_id, source })?;
        job.updated_at = Utc::now();

        Ok(job.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_advance() {
        let repo = MemoryJobRepository::new();
        let job = Job::pending(Uuid::new_v4(), "u", "jobs/x/data.csv");
        repo.create(&job).await.unwrap();

        assert!(matches!(
            repo.create(&job).await,
            Err(JobStoreError::Duplicate(_))
        ));

        let updated = repo.update_status(job.job_id, JobStatus::Chunking).await.unwrap();
        assert_eq!(updated.status, JobStatus::Chunking);

        // Redelivery re-applies CHUNKING
        assert!(repo.update_status(job.job_id, JobStatus::Chunking).await.is_ok());
    }

    #[tokio::test]
    async fn test_illegal_transition_leaves_status() {
        let repo = MemoryJobRepository::new();
        let job = Job::pending(Uuid::new_v4(), "u", "k");
        repo.create(&job).await.unwrap();

        let err = repo.update_status(job.job_id, JobStatus::Completed).await.unwrap_err();
        assert!(matches!(err, JobStoreError::InvalidTransition { .. }));
        assert_eq!(repo.get_by_id(job.job_id).await.unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_soft_deleted_job_is_invisible() {
        let repo = MemoryJobRepository::new();
        let mut job = Job::pending(Uuid::new_v4(), "u", "k");
        job.deleted_at = Some(Utc::now());
        repo.insert(job.clone());

        assert!(matches!(
            repo.get_by_id(job.job_id).await,
            Err(JobStoreError::NotFound(_))
        ));
        assert!(matches!(
            repo.update_status(job.job_id, JobStatus::Chunking).await,
            Err(JobStoreError::NotFound(_))
        ));
    }
}
