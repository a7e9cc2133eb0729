//! Error types for chunkflow domain values

use thiserror::Error;

use crate::job::JobStatus;

/// Result type alias for domain operations
pub type Result<T> = std::result::Result<T, DomainError>;

/// Errors raised while interpreting or mutating domain values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Unknown job status: {0}")]
    UnknownStatus(String),

    #[error("Illegal job status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Invalid file name: {0}")]
    InvalidFileName(String),
}
