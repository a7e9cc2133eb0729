//! Bus messages
//!
//! Both events travel as flat JSON objects with snake_case field names.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::keys;

/// Fields of every chunk that downstream consumers must encrypt
pub const ENCRYPTED_FIELDS: [&str; 2] = ["temperature", "humidity"];

/// Announces a newly registered job to the chunker.
///
/// Produced once per job by the gateway, consumed at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCreatedEvent {
    pub job_id: Uuid,
    pub user_id: String,
    pub file_key: String,
}

/// One bounded slice of a job's source file.
///
/// Identity is `(job_id, chunk_index)`; indices are dense from 0 in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub job_id: Uuid,
    pub chunk_index: usize,
    pub payload_key: String,
    pub encrypt_fields: Vec<String>,
}

impl Chunk {
    pub fn new(job_id: Uuid, chunk_index: usize) -> Self {
        Self {
            job_id,
            chunk_index,
            payload_key: keys::chunk_payload_key(job_id, chunk_index),
            encrypt_fields: ENCRYPTED_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn ready_event(&self) -> ChunkReadyEvent {
        ChunkReadyEvent::from(self)
    }
}

/// Announces an uploaded chunk. Published at least once per chunk, so
/// consumers de-duplicate on `(job_id, chunk_index)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkReadyEvent {
    pub job_id: Uuid,
    pub chunk_index: usize,
    pub payload_key: String,
    pub encrypt_fields: Vec<String>,
}

impl From<&Chunk> for ChunkReadyEvent {
    fn from(chunk: &Chunk) -> Self {
        Self {
            job_id: chunk.job_id,
            chunk_index: chunk.chunk_index,
            payload_key: chunk.payload_key.clone(),
            encrypt_fields: chunk.encrypt_fields.clone(),
        }
    }
}
