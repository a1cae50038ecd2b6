//! JSON error responses for the HTTP boundary

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::capture::CameraError;
use crate::pipeline::CycleError;
use crate::store::StorageError;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Camera could not be opened or started
    #[error("Failed to initialize camera: {0}")]
    Camera(#[from] CameraError),

    /// Single frame capture failed
    #[error("Failed to capture frame: {0}")]
    Capture(#[from] CycleError),

    /// Event log unreadable or corrupt
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self {
            ApiError::Camera(_) => "CAMERA_ERROR",
            ApiError::Capture(_) => "CAPTURE_ERROR",
            ApiError::Storage(_) => "STORAGE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        };
        tracing::warn!(error = %self, code, "Request failed");

        let body = Json(json!({
            "status": "error",
            "error": code,
            "message": self.to_string(),
        }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}
