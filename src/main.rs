//! qrcam: live camera QR scanner served over HTTP

use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::{eyre::WrapErr, Result};
use tracing::{info, warn};

use qrcam::capture::V4l2Opener;
use qrcam::detect::RqrrDecoder;
use qrcam::store::JsonFileStore;
use qrcam::web::{self, AppState};
use qrcam::{CameraService, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "qrcam=info,tower_http=info".into()),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("qrcam launching...");

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("QRCAM_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("qrcam.toml"));
    let config = Config::load(&config_path)
        .wrap_err_with(|| format!("loading configuration from {}", config_path.display()))?;
    info!(
        config = %config_path.display(),
        device = %config.capture.device_node(),
        events = %config.storage.path.display(),
        persist = config.pipeline.persist_events,
        "Configuration loaded"
    );

    let store = Arc::new(JsonFileStore::new(&config.storage.path));
    let server = config.server.clone();
    let service = CameraService::new(config, V4l2Opener, RqrrDecoder, store);

    web::serve(
        AppState::new(service.clone()),
        &server,
        shutdown_signal(service.clone()),
    )
    .await
    .wrap_err("HTTP server failed")?;

    service.join().await;
    info!("qrcam shutting down");
    Ok(())
}

/// Resolves on ctrl-c after stopping the camera, which also ends open streams
async fn shutdown_signal(service: CameraService) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
    service.stop().await;
}
