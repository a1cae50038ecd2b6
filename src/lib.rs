pub mod capture;
pub mod classify;
pub mod dedup;
pub mod detect;
pub mod pipeline;
pub mod store;
pub mod utils;
pub mod web;

use std::path::{Path, PathBuf};

use capture::frame::PixelFormat;
use serde::{Deserialize, Serialize};

pub use capture::Frame;
pub use pipeline::{CameraService, CameraState};

/// Environment prefix for configuration overrides, e.g. `QRCAM_CAPTURE__DEVICE_INDEX=1`
pub const ENV_PREFIX: &str = "QRCAM";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub device_index: u32,
    /// Explicit device node, takes precedence over `device_index`
    pub device_path: Option<String>,
    /// Scan /dev/video* for the first usable device instead
    pub auto_detect: bool,
    // Resolution and rate are hints; the driver may pick something else.
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub frame_interval_ms: u64,
    pub jpeg_quality: u8,
    /// Frames buffered per stream consumer before it starts skipping
    pub broadcast_capacity: usize,
    pub persist_events: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub enable_cors: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            device_path: None,
            auto_detect: false,
            width: 640,
            height: 480,
            fps: 15,
            format: PixelFormat::Mjpeg,
            buffer_count: 4,
        }
    }
}

impl CaptureConfig {
    /// Device node this configuration points at
    pub fn device_node(&self) -> String {
        match &self.device_path {
            Some(path) => path.clone(),
            None => format!("/dev/video{}", self.device_index),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 33, // ~30fps ceiling
            jpeg_quality: 80,
            broadcast_capacity: 4,
            persist_events: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("qr_data.json"),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".into(),
            enable_cors: true,
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then `QRCAM_*` environment variables.
    ///
    /// A missing file is not an error; every field falls back to its default.
    pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_original_service() {
        let config = Config::default();
        assert_eq!(config.capture.width, 640);
        assert_eq!(config.capture.height, 480);
        assert_eq!(config.capture.fps, 15);
        assert_eq!(config.capture.device_node(), "/dev/video0");
        assert_eq!(config.pipeline.frame_interval_ms, 33);
        assert!(config.pipeline.persist_events);
        assert_eq!(config.storage.path, PathBuf::from("qr_data.json"));
        assert_eq!(config.server.bind, "0.0.0.0:8000");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.capture.device_index, 0);
        assert_eq!(config.pipeline.jpeg_quality, 80);
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qrcam.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[capture]\ndevice_index = 2\nformat = \"Yuyv4\"").unwrap();
        writeln!(file, "[pipeline]\npersist_events = false").unwrap();
        drop(file);

        let config = Config::load(&path).unwrap();
        assert_eq!(config.capture.device_index, 2);
        assert_eq!(config.capture.format, PixelFormat::Yuyv4);
        assert_eq!(config.capture.width, 640);
        assert!(!config.pipeline.persist_events);
        assert_eq!(config.capture.device_node(), "/dev/video2");
    }

    #[test]
    fn device_path_override_wins() {
        let capture = CaptureConfig {
            device_path: Some("/dev/video7".into()),
            device_index: 3,
            ..Default::default()
        };
        assert_eq!(capture.device_node(), "/dev/video7");
    }
}
