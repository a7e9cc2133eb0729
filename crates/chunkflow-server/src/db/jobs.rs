//! PostgreSQL-backed job repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chunkflow_common::{Job, JobStatus};
use sqlx::PgPool;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{JobRepository, JobStoreError, JobStoreResult};

const JOB_COLUMNS: &str = "job_id, user_id, file_key, status, created_at, updated_at, deleted_at";

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    job_id: Uuid,
    user_id: String,
    file_key: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = JobStoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            job_id: row.job_id,
            user_id: row.user_id,
            file_key: row.file_key,
            status: row.status.parse().map_err(JobStoreError::Corrupt)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(Clone)]
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_status(&self, job_id: Uuid) -> JobStoreResult<Option<JobStatus>> {
        let status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM jobs WHERE job_id = $1 AND deleted_at IS NULL",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        status
            .map(|s| s.parse().map_err(JobStoreError::Corrupt))
            .transpose()
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    #[instrument(skip(self, job), fields(job_id = %job.job_id))]
    async fn create(&self, job: &Job) -> JobStoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (job_id, user_id, file_key, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(job.job_id)
        .bind(&job.user_id)
        .bind(&job.file_key)
        .bind(job.status.as_str())
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!("Job row inserted");
                Ok(())
            },
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(JobStoreError::Duplicate(job.job_id))
            },
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn get_by_id(&self, job_id: Uuid) -> JobStoreResult<Job> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE job_id = $1 AND deleted_at IS NULL",
            JOB_COLUMNS
        );

        sqlx::query_as::<_, JobRow>(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(JobStoreError::NotFound(job_id))?
            .try_into()
    }

    #[instrument(skip(self), fields(status = %status))]
    async fn update_status(&self, job_id: Uuid, status: JobStatus) -> JobStoreResult<Job> {
        let predecessors: Vec<&str> = status
            .allowed_predecessors()
            .iter()
            .map(JobStatus::as_str)
            .collect();

        let sql = format!(
            r#"
            UPDATE jobs
            SET status = $2, updated_at = NOW()
            WHERE job_id = $1 AND deleted_at IS NULL AND status = ANY($3)
            RETURNING {}
            "#,
            JOB_COLUMNS
        );

        let updated = sqlx::query_as::<_, JobRow>(&sql)
            .bind(job_id)
            .bind(status.as_str())
            .bind(predecessors)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(row) => row.try_into(),
            None => match self.current_status(job_id).await? {
                Some(current) => Err(JobStoreError::invalid_transition(job_id, current, status)),
                None => Err(JobStoreError::NotFound(job_id)),
            },
        }
    }
}
