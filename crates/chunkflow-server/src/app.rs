//! Gateway router assembly

use anyhow::Result;
use axum::{middleware::from_fn_with_state, response::IntoResponse, Router};

use crate::config::Config;
use crate::error::AppError;
use crate::features::{self, JobsState};
use crate::middleware::{self, auth::require_identity, rate_limit::with_rate_limit};

/// API routes under `/api/v1`, behind identity and per-client rate limiting,
/// wrapped in CORS and request tracing.
///
/// `public` routes (health) are served alongside without identity or limits.
pub fn build_router(state: JobsState, config: &Config, public: Router) -> Result<Router> {
    let api = features::router(state, config.server.max_upload_bytes)
        .layer(from_fn_with_state(config.auth.clone(), require_identity));
    let api = with_rate_limit(api, &config.rate_limit)?;

    Ok(public
        .nest("/api/v1", api)
        .fallback(not_found)
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors)))
}

async fn not_found() -> impl IntoResponse {
    AppError::NotFound("No such route".to_string())
}
