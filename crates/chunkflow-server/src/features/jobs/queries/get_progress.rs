use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::cache::CacheError;

use super::super::JobsState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetProgressQuery {
    pub job_id: Uuid,
}

/// Chunk counts from a key scan; both are zero for unknown jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetProgressResponse {
    pub job_id: Uuid,
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum GetProgressError {
    #[error("Failed to scan job progress: {0}")]
    Cache(#[from] CacheError),
}

#[instrument(skip(state))]
pub async fn handle(
    state: &JobsState,
    query: GetProgressQuery,
) -> Result<GetProgressResponse, GetProgressError> {
    let progress = state.progress.job_progress(query.job_id).await?;

    Ok(GetProgressResponse {
        job_id: query.job_id,
        completed: progress.completed,
        total: progress.total,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::features::jobs::test_support::TestJobs;
    use chunkflow_common::keys;

    #[tokio::test]
    async fn test_counts_published_chunks() {
        let t = TestJobs::new();
        let job_id = Uuid::new_v4();
        t.state.progress.mark_chunk_published(job_id, 0).await.unwrap();
        t.state.progress.mark_chunk_published(job_id, 1).await.unwrap();
        t.cache.insert(&keys::chunk_progress_key(job_id, 2), "UPLOADING");
        t.state.progress.mark_chunk_published(Uuid::new_v4(), 0).await.unwrap();

        let response = handle(&t.state, GetProgressQuery { job_id }).await.unwrap();
        assert_eq!((response.completed, response.total), (2, 3));
    }

    #[tokio::test]
    async fn test_unknown_job_has_no_progress() {
        let t = TestJobs::new();
        let response = handle(&t.state, GetProgressQuery { job_id: Uuid::new_v4() })
            .await
            .unwrap();
        assert_eq!((response.completed, response.total), (0, 0));
    }
}
