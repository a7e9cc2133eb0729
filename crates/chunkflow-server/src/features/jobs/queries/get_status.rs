//! Job status query
//!
//! Status is read from the progress cache only. A job whose cache entry has
//! expired is reported as not found even if its row still exists.

use chunkflow_common::{keys, JobStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::instrument;
use uuid::Uuid;

use crate::cache::CacheError;

use super::super::JobsState;

/// Lifetime of the presigned result URL
pub const RESULT_URL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetStatusQuery {
    pub job_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetStatusResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GetStatusError {
    #[error("Job '{0}' not found")]
    NotFound(Uuid),
    #[error("Failed to read job status: {0}")]
    Cache(#[from] CacheError),
    #[error("Failed to sign result URL: {0}")]
    Storage(#[source] anyhow::Error),
}

#[instrument(skip(state))]
pub async fn handle(
    state: &JobsState,
    query: GetStatusQuery,
) -> Result<GetStatusResponse, GetStatusError> {
    let status = state
        .progress
        .job_status(query.job_id)
        .await?
        .ok_or(GetStatusError::NotFound(query.job_id))?;

    let result_url = if status == JobStatus::Completed {
        let url = state
            .storage
            .presigned_get_url(&keys::result_key(query.job_id), RESULT_URL_TTL)
            .await
            .map_err(GetStatusError::Storage)?;
        Some(url)
    } else {
        None
    };

    Ok(GetStatusResponse {
        job_id: query.job_id,
        status,
        result_url,
    })
}
