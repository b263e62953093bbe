//! HTTP surface exposing every orchestrator operation as `axum` JSON
//! endpoints. Session-scoped operations live under
//! `/api/session/{id}/...`; metadata lookups are session-independent and
//! live under `/api/metadata/...`.

use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod error;
mod observability;
mod session;
mod types;

pub use error::ApiError;
pub use types::ApiResponse;

use crate::state::AppState;

async fn healthz() -> &'static str {
    "ok"
}

fn session_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{id}/connect-source", post(session::connect_source))
        .route("/{id}/connect-target", post(session::connect_target))
        .route("/{id}/config", put(session::set_user_config))
        .route("/{id}/scan", post(session::scan))
        .route("/{id}/files", get(session::list_files))
        .route("/{id}/classify", post(session::classify))
        .route("/{id}/organize", post(session::organize))
        .route("/{id}/generate-strm", post(session::generate_strm))
        .route("/{id}/retry-failed", post(session::retry_failed))
        .route("/{id}/cancel", post(session::cancel))
}

fn metadata_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/search", get(session::lookup_metadata))
        .route("/{series_id}", get(session::metadata_details))
}

#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config.server.cors_allowed_origins.clone();

    let cors_layer = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    let api_router = Router::new()
        .nest("/session", session_router())
        .nest("/metadata", metadata_router());

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(observability::get_metrics))
        .nest("/api", api_router)
        .with_state(state)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::security_headers_middleware))
        .layer(middleware::from_fn(observability::logging_middleware))
}
