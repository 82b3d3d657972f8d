//! The thin HTTP control surface: start/stop/status for camera video
//! sessions and independent face-recognition sessions.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use common::validation::{safe_unix_timestamp, validate_uri};
use frame_extraction::SessionSpec;
use scheduler::session_ids;
use serde::Serialize;
use tracing::info;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/streams/start/:camera_id", post(start_stream))
        .route("/streams/stop/:session_id", post(stop_stream))
        .route("/streams/status/:session_id", get(stream_status))
        .route("/streams/active", get(list_active))
        .route("/streams/cleanup", post(cleanup))
        .route("/face-recognition/camera/:camera_id/start", post(start_face_recognition))
        .route("/face-recognition/camera/:camera_id/stop", post(stop_face_recognition))
        .route("/face-recognition/camera/:camera_id/status", get(face_recognition_status))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Plain-text Prometheus exposition, concatenating each crate's own registry.
async fn metrics() -> String {
    [frame_extraction::metrics::render(), face_index::metrics::render(), recognition_worker::metrics::render()].concat()
}

#[derive(Debug, Serialize)]
struct StreamStatusResponse {
    is_active: bool,
    stream_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct SessionSummary {
    session_id: String,
    is_active: bool,
    frames_buffered: usize,
    last_frame_age_secs: u64,
}

async fn camera_and_url(state: &AppState, camera_id: i64) -> Result<(common::domain::Camera, String), ApiError> {
    let camera = state
        .camera_repo()
        .get(camera_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("camera {camera_id} not found")))?;
    let url = camera.effective_stream_url(state.camera_username(), state.camera_password());
    validate_uri(&url, "stream_url").map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok((camera, url))
}

async fn start_stream(
    State(state): State<AppState>,
    Path(camera_id): Path<i64>,
) -> Result<Json<StreamStatusResponse>, ApiError> {
    let (camera, rtsp_url) = camera_and_url(&state, camera_id).await?;
    let epoch_ms = safe_unix_timestamp() as i64 * 1000;
    let session_id = format!("adhoc-{camera_id}-{epoch_ms}");

    let spec = SessionSpec {
        session_id: session_id.clone(),
        camera_id: camera.id,
        organization_id: camera.organization_id,
        rtsp_url: rtsp_url.clone(),
        interval_sec: state.frame_interval_secs(),
    };
    state.session_manager().start(spec).await.map_err(|e| ApiError::Internal(e.to_string()))?;
    state.remember_session_url(session_id, rtsp_url.clone()).await;

    info!(camera_id, "started adhoc stream session");
    Ok(Json(StreamStatusResponse { is_active: true, stream_url: Some(rtsp_url) }))
}

/// Idempotent: stopping an unknown session is still a success.
async fn stop_stream(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.session_manager().stop(&session_id).await.ok();
    state.forget_session_url(&session_id).await;
    Ok(Json(serde_json::json!({ "stopped": true })))
}

async fn stream_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<StreamStatusResponse>, ApiError> {
    let is_active = state.session_manager().is_active(&session_id).await;
    let stream_url = state.session_url(&session_id).await;
    Ok(Json(StreamStatusResponse { is_active, stream_url }))
}

async fn list_active(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    let sessions = state.session_manager().list_active().await;
    Json(
        sessions
            .into_iter()
            .map(|s| SessionSummary {
                session_id: s.session_id,
                is_active: matches!(s.state, frame_extraction::SessionState::Starting | frame_extraction::SessionState::Running),
                frames_buffered: s.frames_buffered,
                last_frame_age_secs: s.last_frame_age_secs,
            })
            .collect(),
    )
}

/// Best-effort bulk stop: every active session is stopped, failures are
/// swallowed rather than aborting the sweep partway through.
async fn cleanup(State(state): State<AppState>) -> Json<serde_json::Value> {
    let sessions = state.session_manager().list_active().await;
    let mut stopped = 0usize;
    for s in &sessions {
        if state.session_manager().stop(&s.session_id).await.is_ok() {
            stopped += 1;
        }
    }
    Json(serde_json::json!({ "stopped": stopped, "total": sessions.len() }))
}

async fn start_face_recognition(
    State(state): State<AppState>,
    Path(camera_id): Path<i64>,
) -> Result<Json<StreamStatusResponse>, ApiError> {
    let (camera, rtsp_url) = camera_and_url(&state, camera_id).await?;
    let epoch_ms = safe_unix_timestamp() as i64 * 1000;
    let (_, session_id) = session_ids(0, camera_id, epoch_ms);

    let spec = SessionSpec {
        session_id: session_id.clone(),
        camera_id: camera.id,
        organization_id: camera.organization_id,
        rtsp_url: rtsp_url.clone(),
        interval_sec: state.frame_interval_secs(),
    };
    state.session_manager().start(spec).await.map_err(|e| ApiError::Internal(e.to_string()))?;
    state.remember_face_recognition_session(camera_id, session_id).await;

    Ok(Json(StreamStatusResponse { is_active: true, stream_url: Some(rtsp_url) }))
}

async fn stop_face_recognition(
    State(state): State<AppState>,
    Path(camera_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(session_id) = state.take_face_recognition_session(camera_id).await {
        state.session_manager().stop(&session_id).await.ok();
    }
    Ok(Json(serde_json::json!({ "stopped": true })))
}

async fn face_recognition_status(
    State(state): State<AppState>,
    Path(camera_id): Path<i64>,
) -> Result<Json<StreamStatusResponse>, ApiError> {
    let Some(session_id) = state.face_recognition_session(camera_id).await else {
        return Ok(Json(StreamStatusResponse { is_active: false, stream_url: None }));
    };
    let is_active = state.session_manager().is_active(&session_id).await;
    Ok(Json(StreamStatusResponse { is_active, stream_url: None }))
}
