//! Session-keyed JSON endpoints under `/api/session/{id}/...`. Each
//! handler is a thin translation layer: deserialize the body/query, call
//! the matching [`Orchestrator`] method, wrap the `(message, delta)` pair
//! in [`ApiResponse`].

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::classifier::MappingRule;
use crate::domain::{Kind, NamingLanguage, SeriesId, SessionId};
use crate::orchestrator::{FileFilter, FilesPage, ScanRequest};
use crate::session::UserConfigUpdate;
use crate::state::AppState;

use super::{ApiError, ApiResponse};

#[derive(Debug, Serialize)]
pub struct OpResponse<T> {
    pub message: String,
    #[serde(flatten)]
    pub delta: T,
}

#[derive(Debug, Deserialize)]
pub struct ConnectBody {
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub target_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectTargetBody {
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub target_path: String,
}

pub async fn connect_source(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
    Json(body): Json<ConnectBody>,
) -> Result<Json<ApiResponse<OpResponse<crate::orchestrator::ConnectionDelta>>>, ApiError> {
    let (message, delta) = state
        .orchestrator
        .connect_source(session_id, body.url, body.username, body.password, body.target_path)
        .await?;
    Ok(Json(ApiResponse::success(OpResponse { message, delta })))
}

pub async fn connect_target(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
    Json(body): Json<ConnectTargetBody>,
) -> Result<Json<ApiResponse<OpResponse<crate::orchestrator::ConnectionDelta>>>, ApiError> {
    let (message, delta) = state
        .orchestrator
        .connect_target(session_id, body.url, body.username, body.password, body.target_path)
        .await?;
    Ok(Json(ApiResponse::success(OpResponse { message, delta })))
}

pub async fn set_user_config(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
    Json(update): Json<UserConfigUpdate>,
) -> Result<Json<ApiResponse<OpResponse<crate::orchestrator::UserConfigDelta>>>, ApiError> {
    let (message, delta) = state.orchestrator.set_user_config(session_id, update).await?;
    Ok(Json(ApiResponse::success(OpResponse { message, delta })))
}

#[derive(Debug, Deserialize, Default)]
pub struct ScanBody {
    pub path: Option<String>,
    #[serde(default = "default_true")]
    pub recursive: bool,
    pub max_files: Option<usize>,
    pub max_depth: Option<u32>,
    pub scan_delay_s: Option<f64>,
}

fn default_true() -> bool {
    true
}

pub async fn scan(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
    Json(body): Json<ScanBody>,
) -> Result<Json<ApiResponse<OpResponse<crate::orchestrator::ScanDelta>>>, ApiError> {
    let request = ScanRequest {
        path: body.path,
        recursive: body.recursive,
        max_files: body.max_files,
        max_depth: body.max_depth,
        scan_delay_s: body.scan_delay_s,
    };
    let (message, delta) = state.orchestrator.scan(session_id, request).await?;
    Ok(Json(ApiResponse::success(OpResponse { message, delta })))
}

#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    #[serde(default)]
    pub filter: FileFilter,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub pattern: Option<String>,
}

fn default_limit() -> usize {
    100
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<ApiResponse<FilesPage>>, ApiError> {
    let page = state
        .orchestrator
        .list_files(session_id, query.filter, query.offset, query.limit, query.pattern)
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

#[derive(Debug, Deserialize)]
pub struct ClassifyBody {
    pub rules: Vec<MappingRule>,
}

pub async fn classify(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
    Json(body): Json<ClassifyBody>,
) -> Result<Json<ApiResponse<OpResponse<crate::orchestrator::ClassifyDelta>>>, ApiError> {
    let (message, delta) = state.orchestrator.classify(session_id, body.rules).await?;
    Ok(Json(ApiResponse::success(OpResponse { message, delta })))
}

#[derive(Debug, Deserialize, Default)]
pub struct NamingLanguageBody {
    pub naming_language: Option<NamingLanguage>,
}

pub async fn organize(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
    Json(body): Json<NamingLanguageBody>,
) -> Result<Json<ApiResponse<OpResponse<crate::orchestrator::MaterializeDelta>>>, ApiError> {
    let (message, delta) = state.orchestrator.organize(session_id, body.naming_language).await?;
    Ok(Json(ApiResponse::success(OpResponse { message, delta })))
}

pub async fn generate_strm(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
    Json(body): Json<NamingLanguageBody>,
) -> Result<Json<ApiResponse<OpResponse<crate::orchestrator::MaterializeDelta>>>, ApiError> {
    let (message, delta) = state
        .orchestrator
        .generate_strm(session_id, body.naming_language)
        .await?;
    Ok(Json(ApiResponse::success(OpResponse { message, delta })))
}

pub async fn retry_failed(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<ApiResponse<OpResponse<crate::orchestrator::RetryDelta>>>, ApiError> {
    let (message, delta) = state.orchestrator.retry_failed(session_id).await?;
    Ok(Json(ApiResponse::success(OpResponse { message, delta })))
}

#[derive(Debug, Serialize)]
pub struct MessageOnly {
    pub message: String,
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<SessionId>,
) -> Result<Json<ApiResponse<MessageOnly>>, ApiError> {
    let message = state.orchestrator.cancel(session_id).await?;
    Ok(Json(ApiResponse::success(MessageOnly { message })))
}

#[derive(Debug, Deserialize)]
pub struct MetadataSearchQuery {
    pub query: String,
    pub kind: Kind,
}

pub async fn lookup_metadata(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MetadataSearchQuery>,
) -> Result<Json<ApiResponse<Vec<crate::metadata::SearchHit>>>, ApiError> {
    let hits = state.orchestrator.lookup_metadata(&query.query, query.kind).await?;
    Ok(Json(ApiResponse::success(hits)))
}

#[derive(Debug, Deserialize)]
pub struct MetadataDetailsQuery {
    pub kind: Kind,
}

pub async fn metadata_details(
    State(state): State<Arc<AppState>>,
    Path(series_id): Path<String>,
    Query(query): Query<MetadataDetailsQuery>,
) -> Result<Json<ApiResponse<crate::metadata::SeriesDetails>>, ApiError> {
    let series_id = SeriesId::new(series_id);
    let details = state
        .orchestrator
        .get_metadata_details(&series_id, query.kind)
        .await?;
    Ok(Json(ApiResponse::success(details)))
}
