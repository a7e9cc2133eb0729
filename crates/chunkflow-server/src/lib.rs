//! Chunkflow Server Library
//!
//! Asynchronous job-chunking pipeline: a gateway accepts CSV/JSON uploads
//! and registers jobs, and a chunker worker splits each job's file into
//! bounded chunks that are stored and announced on the message bus.
//!
//! # Overview
//!
//! - **Gateway** (`chunkflow-server`): create jobs, query status and chunk
//!   progress over HTTP
//! - **Chunker** (`chunkflow-chunker`): consume job-created events, split,
//!   upload and announce chunks, advance the job to `CHUNKING`
//!
//! # Collaborators
//!
//! Every external system sits behind a trait with an S3/PostgreSQL/Redis/AMQP
//! implementation and an in-memory one for tests:
//!
//! - [`storage::ObjectStore`]
//! - [`db::JobRepository`]
//! - [`cache::ProgressCache`]
//! - [`bus::MessagePublisher`]

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod api;
pub mod app;
pub mod bus;
pub mod cache;
pub mod chunker;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod middleware;
pub mod signal;
pub mod storage;

pub use config::Config;
pub use error::AppError;
