//! HTTP server: the live guide page plus the image-store API.
//!
//! ## Routes
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /` | Guide page, live mode (polls `/api/status`) |
//! | `GET /images/{filename}` | Asset bytes |
//! | `POST /api/save-image` | Store a base64 image, re-encoding for compressed targets |
//! | `POST /api/convert-to-webp` | Convert one stored image into another |
//! | `GET /api/check-image/{filename}` | `{exists}` |
//! | `GET /api/status` | Snapshot of the [`StatusBoard`] |
//! | `GET /api/health` | `{status: "ok"}` |
//!
//! Errors are JSON `{"error": message}` with a matching status code.
//!
//! Codec and filesystem work runs on the blocking pool. The status board is
//! fed from the pipeline's event channel by a plain thread (see [`track`]);
//! handlers only ever take short read locks on it.

use crate::acquire::{EventKind, PipelineEvent};
use crate::assets::{AssetError, AssetStore};
use crate::config::GuideConfig;
use crate::guide::load_guide;
use crate::imaging::{CodecError, ImageCodec, RustCodec, TargetFormat};
use crate::output;
use crate::render::{RenderOptions, render_guide};
use crate::types::{AssetDescriptor, AssetStatus};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path as UrlPath, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{info, warn};

/// Log lines kept on the board; older lines are dropped.
const LOG_CAPACITY: usize = 200;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<AssetError> for ApiError {
    fn from(e: AssetError) -> Self {
        match e {
            AssetError::InvalidFilename(_) => Self::BadRequest(e.to_string()),
            AssetError::Io(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<CodecError> for ApiError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::MissingSource(_) => Self::NotFound(e.to_string()),
            _ => Self::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(e.to_string())
    }
}

// ============================================================================
// Status board
// ============================================================================

/// Server-side projection of the pipeline event stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusBoard {
    pub running: bool,
    pub statuses: BTreeMap<String, AssetStatus>,
    pub log: Vec<String>,
}

impl StatusBoard {
    pub fn new(descriptors: &[AssetDescriptor]) -> Self {
        Self {
            running: false,
            statuses: descriptors
                .iter()
                .map(|d| (d.filename.clone(), AssetStatus::Unknown))
                .collect(),
            log: Vec::new(),
        }
    }

    pub fn apply(&mut self, event: &PipelineEvent) {
        if let EventKind::Status { to, .. } = event.kind {
            self.statuses.insert(event.filename.clone(), to);
        }
        self.log.extend(output::format_acquire_event(event));
        if self.log.len() > LOG_CAPACITY {
            let excess = self.log.len() - LOG_CAPACITY;
            self.log.drain(..excess);
        }
    }
}

/// Feed `events` into `board` until the sender hangs up.
///
/// Marks the board running for the duration. Blocks; run it on its own thread.
pub fn track(board: &RwLock<StatusBoard>, events: Receiver<PipelineEvent>) {
    if let Ok(mut b) = board.write() {
        b.running = true;
    }
    for event in events {
        for line in output::format_acquire_event(&event) {
            info!("{}", line);
        }
        if let Ok(mut b) = board.write() {
            b.apply(&event);
        }
    }
    if let Ok(mut b) = board.write() {
        b.running = false;
    }
}

// ============================================================================
// Application state and router
// ============================================================================

pub struct AppState {
    pub store: AssetStore,
    pub codec: RustCodec,
    pub config: GuideConfig,
    /// Content directory; the guide is reloaded on every page request.
    pub source: PathBuf,
    pub board: Arc<RwLock<StatusBoard>>,
}

impl AppState {
    pub fn new(config: GuideConfig, store: AssetStore, source: impl Into<PathBuf>) -> Self {
        let codec = RustCodec::new(crate::imaging::Quality::new(config.images.quality));
        let board = Arc::new(RwLock::new(StatusBoard::new(&config.assets)));
        Self {
            store,
            codec,
            config,
            source: source.into(),
            board,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.server.body_limit_mb * 1024 * 1024;
    Router::new()
        .route("/", get(index))
        .route("/images/{filename}", get(serve_image))
        .route("/api/save-image", post(save_image))
        .route("/api/convert-to-webp", post(convert_image))
        .route("/api/check-image/{filename}", get(check_image))
        .route("/api/status", get(status))
        .route("/api/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: Arc<AppState>, host: &str, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(state)).await
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveImageRequest {
    filename: Option<String>,
    base64_data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConvertRequest {
    source_filename: Option<String>,
    target_filename: Option<String>,
}

fn required(field: Option<String>, name: &str) -> Result<String, ApiError> {
    field
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("missing field: {name}")))
}

/// Accepts bare base64 or a `data:` URI.
fn decode_payload(data: &str) -> Result<Vec<u8>, ApiError> {
    let encoded = match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    };
    STANDARD
        .decode(encoded.trim())
        .map_err(|e| ApiError::BadRequest(format!("invalid base64 data: {e}")))
}

async fn index(State(state): State<Arc<AppState>>) -> Result<Html<String>, ApiError> {
    let page = tokio::task::spawn_blocking(move || {
        let guide = load_guide(&state.source).map_err(|e| ApiError::Internal(e.to_string()))?;
        let chapters: Vec<_> = guide.chapters.iter().collect();
        let markup = render_guide(
            &guide,
            &chapters,
            &state.config,
            &state.store,
            &RenderOptions::served(),
        );
        Ok::<_, ApiError>(markup.into_string())
    })
    .await??;
    Ok(Html(page))
}

async fn serve_image(
    State(state): State<Arc<AppState>>,
    UrlPath(filename): UrlPath<String>,
) -> Result<Response, ApiError> {
    let path = state.store.path(&filename)?;
    if !state.store.exists(&filename) {
        return Err(ApiError::NotFound(format!("image not found: {filename}")));
    }
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let mime = TargetFormat::from_path(&path)
        .map(|f| f.mime_type())
        .unwrap_or("application/octet-stream");
    Ok((
        [
            (header::CONTENT_TYPE, mime),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        bytes,
    )
        .into_response())
}

async fn save_image(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SaveImageRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let filename = required(request.filename, "filename")?;
    let data = required(request.base64_data, "base64Data")?;
    let bytes = decode_payload(&data)?;
    let target = state.store.path(&filename)?;

    let worker = state.clone();
    let name = filename.clone();
    let written = tokio::task::spawn_blocking(move || {
        // only compressed web targets are re-encoded; anything else is stored as sent
        let stored = match TargetFormat::from_path(&target) {
            Some(format) if format.is_compressed() => worker.codec.encode_for(&bytes, &target)?,
            _ => bytes,
        };
        worker.store.write(&name, &stored)?;
        Ok::<_, ApiError>(stored.len())
    })
    .await??;

    info!(filename = %filename, bytes = written, "image saved");
    Ok(Json(json!({ "success": true })))
}

async fn convert_image(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ConvertRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload?;
    let source_name = required(request.source_filename, "sourceFilename")?;
    let target_name = required(request.target_filename, "targetFilename")?;
    let source = state.store.path(&source_name)?;
    let target = state.store.path(&target_name)?;
    if !state.store.exists(&source_name) {
        return Err(ApiError::NotFound(format!(
            "source image not found: {source_name}"
        )));
    }

    let worker = state.clone();
    tokio::task::spawn_blocking(move || worker.codec.convert(&source, &target)).await??;

    info!(source = %source_name, target = %target_name, "image converted");
    Ok(Json(json!({ "success": true })))
}

async fn check_image(
    State(state): State<Arc<AppState>>,
    UrlPath(filename): UrlPath<String>,
) -> Json<Value> {
    Json(json!({ "exists": state.store.exists(&filename) }))
}

async fn status(State(state): State<Arc<AppState>>) -> Result<Json<StatusBoard>, ApiError> {
    let board = state
        .board
        .read()
        .map_err(|_| ApiError::Internal("status board unavailable".to_string()))?;
    Ok(Json(board.clone()))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
