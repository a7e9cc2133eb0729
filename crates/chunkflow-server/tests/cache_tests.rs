//! Redis progress cache integration tests
//!
//! Skipped unless `REDIS_URL` is set.

use chunkflow_common::JobStatus;
use chunkflow_server::cache::{redis::RedisCache, ProgressCache, ProgressTracker};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

async fn setup_cache() -> Option<RedisCache> {
    let url = std::env::var("REDIS_URL").ok()?;
    Some(RedisCache::connect(&url).await.expect("Failed to connect to Redis"))
}

#[tokio::test]
async fn test_status_round_trip_with_ttl() {
    let Some(cache) = setup_cache().await else {
        return;
    };
    let tracker = ProgressTracker::new(Arc::new(cache), Some(Duration::from_secs(60)), None);
    let job_id = Uuid::new_v4();

    assert_eq!(tracker.job_status(job_id).await.unwrap(), None);
    tracker.set_job_status(job_id, JobStatus::Pending).await.unwrap();
    assert_eq!(tracker.job_status(job_id).await.unwrap(), Some(JobStatus::Pending));
}

#[tokio::test]
async fn test_progress_scan_counts_published_chunks() {
    let Some(cache) = setup_cache().await else {
        return;
    };
    let tracker = ProgressTracker::new(Arc::new(cache.clone()), None, Some(Duration::from_secs(60)));
    let job_id = Uuid::new_v4();

    for index in 0..250 {
        tracker.mark_chunk_published(job_id, index).await.unwrap();
    }
    cache
        .set(&format!("job:{}:chunk:250", job_id), "PENDING", Some(Duration::from_secs(60)))
        .await
        .unwrap();

    let progress = tracker.job_progress(job_id).await.unwrap();
    assert_eq!(progress.completed, 250);
    assert_eq!(progress.total, 251);
}
