//! API response envelopes
//!
//! Success bodies are `{ "success": true, "data": ... }`; failures are
//! `{ "success": false, "error": { "code", "message" } }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope() {
        let value = serde_json::to_value(ApiResponse::success(json!({ "job_id": "abc" }))).unwrap();
        assert_eq!(value, json!({ "success": true, "data": { "job_id": "abc" } }));
    }

    #[test]
    fn test_error_envelope() {
        let value = serde_json::to_value(ErrorResponse::new("NOT_FOUND", "Job not found")).unwrap();
        assert_eq!(
            value,
            json!({
                "success": false,
                "error": { "code": "NOT_FOUND", "message": "Job not found" }
            })
        );
    }
}
