//! HTTP boundary: camera control, the multipart stream and the decoded-code history

mod error;
mod routes;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;

use std::future::Future;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::pipeline::CameraService;
use crate::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub service: CameraService,
}

impl AppState {
    pub fn new(service: CameraService) -> Self {
        Self { service }
    }
}

/// Full application router with tracing and optional CORS
pub fn app(state: AppState, config: &ServerConfig) -> Router {
    let router = create_router(state).layer(TraceLayer::new_for_http());
    if config.enable_cors {
        // Dashboard front-ends are served from other origins
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Serve until `shutdown` resolves
pub async fn serve(
    state: AppState,
    config: &ServerConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app(state, config))
        .with_graceful_shutdown(shutdown)
        .await
}
