//! Chunkflow Common Library
//!
//! Domain types, key conventions, and logging shared by the chunkflow
//! gateway and chunker processes.
//!
//! # Overview
//!
//! - **Jobs**: [`Job`] and the closed [`JobStatus`] lifecycle with its
//!   transition table
//! - **Events**: wire messages exchanged over the bus ([`JobCreatedEvent`],
//!   [`ChunkReadyEvent`])
//! - **Keys**: deterministic object-store and cache key derivation
//! - **Logging**: tracing subscriber initialisation for every binary
//!
//! # Example
//!
//! ```
//! use chunkflow_common::{keys, JobStatus};
//! use uuid::Uuid;
//!
//! let job_id = Uuid::new_v4();
//! assert_eq!(keys::chunk_payload_key(job_id, 3), format!("jobs/{}/chunks/3", job_id));
//! assert!(JobStatus::Pending.can_transition_to(JobStatus::Chunking));
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod events;
pub mod job;
pub mod keys;
pub mod logging;

// Re-export commonly used types
pub use error::{DomainError, Result};
pub use events::{Chunk, ChunkReadyEvent, JobCreatedEvent, ENCRYPTED_FIELDS};
pub use job::{Job, JobStatus};
