//! Feature slices of the gateway API
//!
//! Each feature is a vertical slice with `commands/` for writes,
//! `queries/` for reads and a `routes.rs` wiring them to HTTP.

pub mod jobs;

use axum::{extract::DefaultBodyLimit, Router};

pub use jobs::JobsState;

/// API router with every feature mounted, ready to nest under `/api/v1`
pub fn router(state: JobsState, max_upload_bytes: usize) -> Router<()> {
    Router::new()
        .merge(jobs::jobs_routes())
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}
