//! Gateway router tests
//!
//! Drive the fully assembled router (identity, rate limiting, CORS, tracing)
//! with `tower::ServiceExt::oneshot` over in-memory collaborators.

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use chunkflow_server::{app::build_router, config::Config};
use common::{csv_rows, Harness};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

const BOUNDARY: &str = "chunkflow-api-test";

fn app(h: &Harness, config: &Config) -> Router {
    build_router(h.state.clone(), config, Router::new()).unwrap()
}

fn upload(file_name: &str, content: &str, authorized: bool) -> Request<Body> {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\r\n{content}\r\n--{b}--\r\n",
        b = BOUNDARY,
    );
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/jobs")
        .header("x-forwarded-for", "192.0.2.10")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if authorized {
        builder = builder.header(header::AUTHORIZATION, "Bearer test");
    }
    builder.body(Body::from(body)).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-forwarded-for", "192.0.2.10")
        .header(header::AUTHORIZATION, "Bearer test")
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_unauthenticated_upload_is_rejected() {
    let h = Harness::new(10);
    let response = app(&h, &Config::default())
        .oneshot(upload("data.csv", "1,2", false))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert!(h.jobs.is_empty());
}

#[tokio::test]
async fn test_upload_uses_stub_identity() {
    let h = Harness::new(10);
    let mut config = Config::default();
    config.auth.stub_user_id = "user-789".to_string();

    let response = app(&h, &config)
        .oneshot(upload("data.csv", "1,2", true))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let events = h.job_created_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].user_id, "user-789");
}

#[tokio::test]
async fn test_full_flow_over_http() {
    let h = Harness::new(10);
    let router = app(&h, &Config::default());

    let response = router
        .clone()
        .oneshot(upload("data.csv", &csv_rows(25), true))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    let job_id = body["data"]["job_id"].as_str().unwrap().to_string();

    let response = router
        .clone()
        .oneshot(get(&format!("/api/v1/jobs/{}/status", job_id)))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["data"]["status"], "PENDING");

    let event = h.job_created_events().pop().unwrap();
    h.chunker.process_job(&event).await.unwrap();

    let response = router
        .clone()
        .oneshot(get(&format!("/api/v1/jobs/{}/status", job_id)))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["data"]["status"], "CHUNKING");

    let response = router
        .oneshot(get(&format!("/api/v1/jobs/{}/progress", job_id)))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"]["completed"], 3);
    assert_eq!(body["data"]["total"], 3);
}

#[tokio::test]
async fn test_unknown_job_status_is_not_found() {
    let h = Harness::new(10);
    let response = app(&h, &Config::default())
        .oneshot(get(&format!("/api/v1/jobs/{}/status", Uuid::new_v4())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_route_uses_error_envelope() {
    let h = Harness::new(10);
    let response = app(&h, &Config::default())
        .oneshot(get("/api/v2/nothing"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_rate_limit_applies_per_client() {
    let h = Harness::new(10);
    let mut config = Config::default();
    config.rate_limit.requests_per_second = 1;
    config.rate_limit.burst_size = 2;
    let router = app(&h, &config);

    let uri = format!("/api/v1/jobs/{}/progress", Uuid::new_v4());
    for _ in 0..2 {
        let response = router.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = router.oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let h = Harness::new(10);
    let mut config = Config::default();
    config.server.max_upload_bytes = 64;

    let response = app(&h, &config)
        .oneshot(upload("data.csv", &csv_rows(100), true))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    assert!(h.jobs.is_empty());
}
