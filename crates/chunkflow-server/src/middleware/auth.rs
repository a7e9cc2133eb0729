//! Stub identity middleware
//!
//! Any request carrying an `Authorization` header is accepted as the
//! configured stub user. Token verification is not performed.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::config::AuthConfig;
use crate::error::AppError;

/// Identity attached to authenticated requests as an extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

pub async fn require_identity(
    State(config): State<AuthConfig>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let has_credentials = request
        .headers()
        .get(header::AUTHORIZATION)
        .is_some_and(|value| !value.is_empty());

    if !has_credentials {
        return Err(AppError::Unauthorized(
            "Missing Authorization header".to_string(),
        ));
    }

    request.extensions_mut().insert(AuthenticatedUser {
        user_id: config.stub_user_id,
    });

    Ok(next.run(request).await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::StatusCode,
        routing::get,
        Extension, Router,
    };
    use tower::ServiceExt;

    fn app() -> Router {
        let config = AuthConfig {
            stub_user_id: "user-123".to_string(),
        };
        Router::new()
            .route(
                "/whoami",
                get(|Extension(user): Extension<AuthenticatedUser>| async move { user.user_id }),
            )
            .layer(axum::middleware::from_fn_with_state(config, require_identity))
    }

    #[tokio::test]
    async fn test_missing_header_is_unauthorized() {
        let response = app()
            .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_header_yields_stub_user() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header(header::AUTHORIZATION, "Bearer anything")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"user-123");
    }
}
