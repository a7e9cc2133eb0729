//! Progress cache
//!
//! Ephemeral key/value projection of job status and per-chunk publication
//! state. Reads here are advisory: the cache may lag or lose entries, and
//! nothing in the pipeline depends on it for correctness except status
//! queries, which read only from here.

use async_trait::async_trait;
use chunkflow_common::{keys, JobStatus};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

pub mod memory;
pub mod redis;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache command failed: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Cache entry '{key}' holds an unexpected value '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Minimal key/value contract the tracker needs
#[async_trait]
pub trait ProgressCache: Send + Sync {
    /// Write `value`, expiring after `ttl` when given
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()>;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Every key matching a glob `pattern` (`*` wildcards)
    async fn scan_keys(&self, pattern: &str) -> CacheResult<Vec<String>>;
}

/// `(completed, total)` chunk counts of one job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct JobProgress {
    pub completed: usize,
    pub total: usize,
}

/// Typed view over a [`ProgressCache`] using the shared key conventions
#[derive(Clone)]
pub struct ProgressTracker {
    cache: Arc<dyn ProgressCache>,
    status_ttl: Option<Duration>,
    progress_ttl: Option<Duration>,
}

impl ProgressTracker {
    pub fn new(
        cache: Arc<dyn ProgressCache>,
        status_ttl: Option<Duration>,
        progress_ttl: Option<Duration>,
    ) -> Self {
        Self {
            cache,
            status_ttl,
            progress_ttl,
        }
    }

    #[instrument(skip(self))]
    pub async fn set_job_status(&self, job_id: Uuid, status: JobStatus) -> CacheResult<()> {
        self.cache
            .set(&keys::job_status_cache_key(job_id), status.as_str(), self.status_ttl)
            .await
    }

    /// Cached status, or `None` when the entry is missing or expired
    #[instrument(skip(self))]
    pub async fn job_status(&self, job_id: Uuid) -> CacheResult<Option<JobStatus>> {
        let key = keys::job_status_cache_key(job_id);
        match self.cache.get(&key).await? {
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| CacheError::InvalidValue { key, value }),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn mark_chunk_published(&self, job_id: Uuid, chunk_index: usize) -> CacheResult<()> {
        self.cache
            .set(
                &keys::chunk_progress_key(job_id, chunk_index),
                keys::CHUNK_PUBLISHED,
                self.progress_ttl,
            )
            .await
    }

    /// Count chunk entries of a job by key scan.
    ///
    /// Entries that vanish between the scan and the read still count toward
    /// `total`; the result is a snapshot, not a consistent read.
    #[instrument(skip(self))]
    pub async fn job_progress(&self, job_id: Uuid) -> CacheResult<JobProgress> {
        let chunk_keys = self
            .cache
            .scan_keys(&keys::chunk_progress_pattern(job_id))
            .await?;

        let mut progress = JobProgress {
            completed: 0,
            total: chunk_keys.len(),
        };

        for key in &chunk_keys {
            match self.cache.get(key).await {
                Ok(Some(value)) if value == keys::CHUNK_PUBLISHED => progress.completed += 1,
                Ok(_) => {},
                Err(e) => debug!(key = %key, error = %e, "Skipping unreadable progress entry"),
            }
        }

        Ok(progress)
    }
}
