//! API Routes

use std::convert::Infallible;

use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tracing::info;

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::pipeline::{multipart, CameraState};
use crate::store::{EventStore, QrEvent};
use crate::utils::epoch_seconds;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/health", get(health_check))
        .route("/camera/status", get(camera_status))
        // Camera control
        .route("/camera/start", get(start_camera))
        .route("/camera/stop", get(stop_camera))
        // Video
        .route("/camera/stream", get(video_stream))
        .route("/video_feed", get(video_feed))
        .route("/camera/frame", get(single_frame))
        // Decoded history
        .route("/api/qr_data", get(list_qr_data))
        .route("/api/last_qr", get(last_qr))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": epoch_seconds(),
    }))
}

async fn camera_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.status().await)
}

async fn start_camera(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.service.initialize().await?;
    state.service.start().await?;
    Ok(Json(json!({
        "status": "started",
        "message": "Camera initialized successfully",
    })))
}

async fn stop_camera(State(state): State<AppState>) -> impl IntoResponse {
    state.service.stop().await;
    Json(json!({
        "status": "stopped",
        "message": "Camera stopped",
    }))
}

/// Attach to the running stream; the body is empty when the camera is not streaming
async fn video_stream(State(state): State<AppState>) -> Response {
    multipart_response(&state).await
}

/// Like `/camera/stream`, but brings the camera up first when it is idle
async fn video_feed(State(state): State<AppState>) -> ApiResult<Response> {
    if state.service.state().await != CameraState::Streaming {
        info!("Stream requested on idle camera, starting it");
        state.service.initialize().await?;
        state.service.start().await?;
    }
    Ok(multipart_response(&state).await)
}

async fn multipart_response(state: &AppState) -> Response {
    let subscription = state.service.subscribe().await;

    let parts = async_stream::stream! {
        if let Some(mut subscription) = subscription {
            while let Some(jpeg) = subscription.next().await {
                yield Ok::<_, Infallible>(multipart::part(&jpeg));
            }
        }
    };

    (
        [(header::CONTENT_TYPE, multipart::CONTENT_TYPE)],
        Body::from_stream(parts),
    )
        .into_response()
}

async fn single_frame(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.service.snapshot().await?))
}

async fn list_qr_data(State(state): State<AppState>) -> ApiResult<Json<Vec<QrEvent>>> {
    let store = state.service.store().clone();
    let events = blocking(move || store.read_all()).await??;
    Ok(Json(events))
}

async fn last_qr(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let store = state.service.store().clone();
    let last = blocking(move || store.read_last()).await??;
    Ok(Json(json!({
        "data": last.map(|event| event.data).unwrap_or_default(),
    })))
}

/// Run file I/O off the async workers
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}
