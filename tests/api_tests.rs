//! Integration tests for the session-scoped JSON API, exercised through a
//! real `axum` router via `tower::ServiceExt::oneshot`.
//!
//! These only cover the boundary behaviour that doesn't require a live
//! storage backend or metadata provider: routing, precondition mapping,
//! and the envelope/flatten shapes. Scenario coverage for the
//! scan/classify/materialize pipeline itself lives next to the
//! [`mediatree::orchestrator`] implementation, where an in-memory
//! `StorageClient` double can be swapped in directly.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use mediatree::config::Config;
use mediatree::state::AppState;
use std::sync::Arc;
use tower::ServiceExt;

fn spawn_app() -> Router {
    let state = Arc::new(AppState::new(Config::default(), None));
    mediatree::api::router(state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = spawn_app();

    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn metrics_endpoint_is_served() {
    let app = spawn_app();

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn scan_without_connected_source_returns_conflict() {
    let app = spawn_app();
    let session_id = uuid::Uuid::new_v4();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/session/{session_id}/scan"))
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["success"], serde_json::json!(false));
    assert!(body["error"].as_str().unwrap().contains("scan"));
}

#[tokio::test]
async fn classify_without_scanned_inventory_returns_conflict() {
    let app = spawn_app();
    let session_id = uuid::Uuid::new_v4();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/session/{session_id}/classify"))
                .header("content-type", "application/json")
                .body(Body::from(serde_json::json!({ "rules": [] }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn list_files_on_unknown_session_is_not_found() {
    // Unlike `scan`/`classify`, which implicitly create a session on
    // first touch, `list_files` is read-only and 404s on a session id
    // that was never touched by a mutating operation.
    let app = spawn_app();
    let session_id = uuid::Uuid::new_v4();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/session/{session_id}/files"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_files_after_scan_returns_empty_page() {
    // Touching the session via `scan` lazily creates it even though the
    // scan itself fails its precondition (no connected source); the
    // session now exists, so `list_files` returns an empty page instead
    // of 404.
    let app = spawn_app();
    let session_id = uuid::Uuid::new_v4();

    let _ = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/session/{session_id}/scan"))
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/session/{session_id}/files"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["files"], serde_json::json!([]));
    assert_eq!(body["data"]["total_matching"], serde_json::json!(0));
}

#[tokio::test]
async fn cancel_on_unknown_session_is_not_found() {
    let app = spawn_app();
    let session_id = uuid::Uuid::new_v4();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/session/{session_id}/cancel"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_after_scan_touches_the_session() {
    let app = spawn_app();
    let session_id = uuid::Uuid::new_v4();

    let _ = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/session/{session_id}/scan"))
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/session/{session_id}/cancel"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["message"], serde_json::json!("Cancellation requested"));
}

#[tokio::test]
async fn malformed_connect_body_is_a_client_error() {
    let app = spawn_app();
    let session_id = uuid::Uuid::new_v4();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/session/{session_id}/connect-source"))
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    // Missing the required `url` field fails JSON extraction before the
    // handler runs at all.
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
