//! Jobs feature
//!
//! Ingress side of the pipeline: create a job from an uploaded file and
//! read back its status and chunk progress.

pub mod commands;
pub mod queries;
pub mod routes;

pub use routes::jobs_routes;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::bus::{retry::RetryPolicy, MessagePublisher};
use crate::cache::ProgressTracker;
use crate::db::JobRepository;
use crate::storage::ObjectStore;

/// Collaborators shared by every jobs handler
#[derive(Clone)]
pub struct JobsState {
    pub jobs: Arc<dyn JobRepository>,
    pub storage: Arc<dyn ObjectStore>,
    pub progress: ProgressTracker,
    pub publisher: Arc<dyn MessagePublisher>,
    pub job_created_routing_key: String,
    pub retry: RetryPolicy,
    /// Cancelled on shutdown; aborts publish backoff waits
    pub shutdown: CancellationToken,
}
