//! Liveness endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::AppError;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

pub fn health_routes() -> Router<PgPool> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(pool): State<PgPool>) -> Result<Json<HealthResponse>, AppError> {
    crate::db::health_check(&pool).await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        AppError::Unavailable("database unreachable".to_string())
    })?;

    Ok(Json(HealthResponse {
        status: "healthy",
        database: "connected",
    }))
}
