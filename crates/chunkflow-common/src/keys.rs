//! Deterministic key derivation for the object store and progress cache

use uuid::Uuid;

use crate::error::{DomainError, Result};

/// Cache value recorded once a chunk's ready event is on the bus
pub const CHUNK_PUBLISHED: &str = "PUBLISHED";

/// Longest accepted source file name, in characters
pub const MAX_FILE_NAME_LEN: usize = 255;

/// Object-store key of a job's uploaded source file: `jobs/<id>/<file name>`.
///
/// The name must be a single path segment.
pub fn source_file_key(job_id: Uuid, file_name: &str) -> Result<String> {
    validate_file_name(file_name)?;
    Ok(format!("jobs/{}/{}", job_id, file_name))
}

pub fn validate_file_name(file_name: &str) -> Result<()> {
    let trimmed = file_name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::InvalidFileName("file name is empty".to_string()));
    }
    if file_name.chars().count() > MAX_FILE_NAME_LEN {
        return Err(DomainError::InvalidFileName(format!(
            "file name exceeds {} characters",
            MAX_FILE_NAME_LEN
        )));
    }
    if file_name.contains('/') || file_name.contains('\\') || file_name == "." || file_name == ".." {
        return Err(DomainError::InvalidFileName(format!(
            "'{}' is not a single path segment",
            file_name
        )));
    }
    Ok(())
}

/// Object-store key of chunk `index`: `jobs/<id>/chunks/<index>`
pub fn chunk_payload_key(job_id: Uuid, index: usize) -> String {
    format!("jobs/{}/chunks/{}", job_id, index)
}

/// Well-known key of a completed job's result document
pub fn result_key(job_id: Uuid) -> String {
    format!("jobs/{}/result.pdf", job_id)
}

pub fn job_status_cache_key(job_id: Uuid) -> String {
    format!("job_status:{}", job_id)
}

pub fn chunk_progress_key(job_id: Uuid, index: usize) -> String {
    format!("job:{}:chunk:{}", job_id, index)
}

/// Scan pattern matching every chunk progress key of a job
pub fn chunk_progress_pattern(job_id: Uuid) -> String {
    format!("job:{}:chunk:*", job_id)
}
