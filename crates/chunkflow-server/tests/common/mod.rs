//! Shared fixtures for chunkflow integration tests
//!
//! [`Harness`] wires the gateway state and the chunker use case over the same
//! in-memory adapters, so a job created through the ingress path can be fed
//! straight into the chunker.

#![allow(dead_code)]

use chunkflow_common::JobCreatedEvent;
use chunkflow_server::{
    bus::{memory::MemoryPublisher, retry::RetryPolicy},
    cache::{memory::MemoryCache, ProgressTracker},
    chunker::ChunkerUseCase,
    db::memory::MemoryJobRepository,
    features::JobsState,
    storage::memory::MemoryStorage,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const JOB_CREATED: &str = "jobs.created";
pub const CHUNK_READY: &str = "jobs.chunks";

pub struct Harness {
    pub jobs: MemoryJobRepository,
    pub storage: MemoryStorage,
    pub cache: MemoryCache,
    pub publisher: MemoryPublisher,
    pub state: JobsState,
    pub chunker: ChunkerUseCase,
}

impl Harness {
    pub fn new(chunk_size: usize) -> Self {
        let jobs = MemoryJobRepository::new();
        let storage = MemoryStorage::new();
        let cache = MemoryCache::new();
        let publisher = MemoryPublisher::new();

        let progress = ProgressTracker::new(
            Arc::new(cache.clone()),
            Some(Duration::from_secs(3600)),
            None,
        );

        let state = JobsState {
            jobs: Arc::new(jobs.clone()),
            storage: Arc::new(storage.clone()),
            progress: progress.clone(),
            publisher: Arc::new(publisher.clone()),
            job_created_routing_key: JOB_CREATED.to_string(),
            retry: RetryPolicy::default(),
            shutdown: CancellationToken::new(),
        };

        let chunker = ChunkerUseCase::new(
            Arc::new(jobs.clone()),
            Arc::new(storage.clone()),
            Arc::new(publisher.clone()),
            progress,
            CHUNK_READY,
            chunk_size,
        );

        Self {
            jobs,
            storage,
            cache,
            publisher,
            state,
            chunker,
        }
    }

    /// The job-created events published so far, decoded
    pub fn job_created_events(&self) -> Vec<JobCreatedEvent> {
        self.publisher
            .published_to(JOB_CREATED)
            .iter()
            .map(|message| message.decode().expect("job-created event decodes"))
            .collect()
    }
}

/// `n` CSV rows `i,sensor-i,20.5`, newline terminated
pub fn csv_rows(n: usize) -> String {
    (0..n).map(|i| format!("{},sensor-{},20.5\n", i, i)).collect()
}

/// A JSON array of `n` reading objects
pub fn json_records(n: usize) -> String {
    let items: Vec<String> = (0..n)
        .map(|i| format!(r#"{{"id":{},"temperature":21.{},"humidity":40}}"#, i, i % 10))
        .collect();
    format!("[{}]", items.join(","))
}
