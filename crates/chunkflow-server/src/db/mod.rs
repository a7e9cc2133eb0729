//! Relational job store
//!
//! The use cases talk to [`JobRepository`]; [`jobs::PgJobRepository`] is the
//! PostgreSQL implementation and [`memory::MemoryJobRepository`] the test one.

use async_trait::async_trait;
use chunkflow_common::{DomainError, Job, JobStatus};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::DatabaseConfig;

pub mod jobs;
pub mod memory;

#[derive(Error, Debug)]
pub enum JobStoreError {
    #[error("Database query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Job '{0}' not found")]
    NotFound(Uuid),

    #[error("Job '{0}' already exists")]
    Duplicate(Uuid),

    /// The stored status does not allow the requested move
    #[error("Job '{job_id}': {source}")]
    InvalidTransition {
        job_id: Uuid,
        #[source]
        source: DomainError,
    },

    #[error("Stored job is malformed: {0}")]
    Corrupt(DomainError),

    /// Failure injected by the in-memory store
    #[error("Job store unavailable: {0}")]
    Unavailable(String),
}

impl JobStoreError {
    pub fn invalid_transition(job_id: Uuid, from: JobStatus, to: JobStatus) -> Self {
        Self::InvalidTransition {
            job_id,
            source: DomainError::InvalidTransition { from, to },
        }
    }
}

pub type JobStoreResult<T> = Result<T, JobStoreError>;

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new job row
    async fn create(&self, job: &Job) -> JobStoreResult<()>;

    /// Fetch a live (not soft-deleted) job
    async fn get_by_id(&self, job_id: Uuid) -> JobStoreResult<Job>;

    /// Move a job to `status` if the transition table allows it from the
    /// currently stored status. The check and the write are one atomic step.
    async fn update_status(&self, job_id: Uuid, status: JobStatus) -> JobStoreResult<Job>;
}

pub async fn create_pool(config: &DatabaseConfig) -> JobStoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect(&config.url)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database connection pool created"
    );

    Ok(pool)
}

pub async fn health_check(pool: &PgPool) -> JobStoreResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(JobStoreError::from)
}
