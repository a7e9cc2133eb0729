//! Chunking use case
//!
//! Turns one job-created event into an ordered run of uploaded chunks, one
//! chunk-ready event per chunk, and a `CHUNKING` job status.
//!
//! Processing is not idempotent: handling the same event twice re-uploads
//! every chunk under the same keys and publishes every chunk-ready event
//! again. Consumers of chunk-ready events de-duplicate on
//! `(job_id, chunk_index)`.

use chunkflow_common::{Chunk, JobCreatedEvent, JobStatus};
use std::io::BufReader;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::io::SyncIoBridge;
use tracing::{debug, info, instrument, warn};

use crate::bus::{self, BusError, MessagePublisher};
use crate::cache::ProgressTracker;
use crate::db::{JobRepository, JobStoreError};
use crate::storage::ObjectStore;

pub mod split;

pub use split::{FileFormat, SplitError};

#[derive(Error, Debug)]
pub enum ChunkerError {
    #[error("Failed to open source file '{key}': {source}")]
    Storage {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to parse source file: {0}")]
    Parse(#[source] SplitError),

    #[error("Failed to read source file: {0}")]
    Read(#[source] SplitError),

    #[error("Failed to upload chunk {index}: {source}")]
    Upload {
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to publish chunk {index}: {source}")]
    Publish {
        index: usize,
        #[source]
        source: BusError,
    },

    #[error("Failed to update job status: {0}")]
    Persistence(#[from] JobStoreError),

    #[error("Split task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ChunkerError {
    /// Whether handling the same event again is certain to fail the same way
    pub fn is_permanent(&self) -> bool {
        match self {
            ChunkerError::UnsupportedFormat(_) | ChunkerError::Parse(_) => true,
            ChunkerError::Persistence(e) => matches!(
                e,
                JobStoreError::InvalidTransition { .. }
                    | JobStoreError::NotFound(_)
                    | JobStoreError::Corrupt(_)
            ),
            _ => false,
        }
    }
}

impl From<SplitError> for ChunkerError {
    fn from(err: SplitError) -> Self {
        if err.is_io() {
            ChunkerError::Read(err)
        } else {
            ChunkerError::Parse(err)
        }
    }
}

/// Outcome of one successful run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingReport {
    pub format: FileFormat,
    pub chunks: usize,
}

#[derive(Clone)]
pub struct ChunkerUseCase {
    jobs: Arc<dyn JobRepository>,
    storage: Arc<dyn ObjectStore>,
    publisher: Arc<dyn MessagePublisher>,
    progress: ProgressTracker,
    chunk_ready_routing_key: String,
    chunk_size: usize,
}

impl ChunkerUseCase {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        storage: Arc<dyn ObjectStore>,
        publisher: Arc<dyn MessagePublisher>,
        progress: ProgressTracker,
        chunk_ready_routing_key: impl Into<String>,
        chunk_size: usize,
    ) -> Self {
        Self {
            jobs,
            storage,
            publisher,
            progress,
            chunk_ready_routing_key: chunk_ready_routing_key.into(),
            chunk_size,
        }
    }

    /// Split, upload and announce every chunk of the job's source file, then
    /// mark the job `CHUNKING`.
    ///
    /// The first failing upload or publish aborts the run; chunks before it
    /// stay uploaded and announced.
    #[instrument(skip(self, event), fields(job_id = %event.job_id, file_key = %event.file_key))]
    pub async fn process_job(&self, event: &JobCreatedEvent) -> Result<ChunkingReport, ChunkerError> {
        info!("Processing job");

        let reader = self
            .storage
            .get_reader(&event.file_key)
            .await
            .map_err(|source| ChunkerError::Storage {
                key: event.file_key.clone(),
                source,
            })?;

        let format = FileFormat::detect(&event.file_key)
            .ok_or_else(|| ChunkerError::UnsupportedFormat(event.file_key.clone()))?;

        let chunk_size = self.chunk_size;
        let bridge = SyncIoBridge::new(reader);
        let payloads = tokio::task::spawn_blocking(move || {
            format.split(BufReader::new(bridge), chunk_size)
        })
        .await??;

        debug!(?format, chunks = payloads.len(), "Source split");

        let total = payloads.len();
        for (index, payload) in payloads.into_iter().enumerate() {
            let chunk = Chunk::new(event.job_id, index);

            self.storage
                .put(&chunk.payload_key, payload, Some(format.content_type()))
                .await
                .map_err(|source| ChunkerError::Upload { index, source })?;

            bus::publish_json(
                self.publisher.as_ref(),
                &self.chunk_ready_routing_key,
                &chunk.ready_event(),
            )
            .await
            .map_err(|source| ChunkerError::Publish { index, source })?;

            if let Err(e) = self.progress.mark_chunk_published(event.job_id, index).await {
                warn!(chunk_index = index, error = %e, "Failed to record chunk progress");
            }
        }

        self.jobs
            .update_status(event.job_id, JobStatus::Chunking)
            .await?;

        if let Err(e) = self
            .progress
            .set_job_status(event.job_id, JobStatus::Chunking)
            .await
        {
            warn!(error = %e, "Failed to mirror CHUNKING status into cache");
        }

        info!(chunks = total, "Job chunked");

        Ok(ChunkingReport {
            format,
            chunks: total,
        })
    }
}
