//! Device-facing seam of the pipeline: something that opens a camera and hands out frames

use thiserror::Error;

use crate::capture::frame::{Frame, PixelFormat};
use crate::CaptureConfig;

/// Failure to open or configure a capture device
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("capture device {0} not found")]
    NotFound(String),

    #[error("capture device {0} is busy (already opened elsewhere)")]
    Busy(String),

    #[error("device {device} does not support {what}")]
    Unsupported { device: String, what: String },

    #[error("camera is not initialized")]
    NotInitialized,

    #[error("failed to open {device}: {source}")]
    Io {
        device: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to read or decode a single frame; ends the current stream session
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture device is closed")]
    Closed,

    #[error("camera is not streaming")]
    NotStreaming,

    #[error("device read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not decode {format:?} frame: {reason}")]
    Decode { format: PixelFormat, reason: String },
}

/// An open camera handle
///
/// `capture` blocks until the driver delivers a frame. `release` must be idempotent:
/// the pipeline calls it on stop, on capture failure and again on drop.
pub trait FrameSource: Send {
    fn capture(&mut self) -> Result<Frame, CaptureError>;

    fn release(&mut self);

    fn is_open(&self) -> bool;
}

/// Opens frame sources; the pipeline holds at most one opened source at a time
pub trait SourceOpener: Send + Sync {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CameraError>;
}

impl<F> SourceOpener for F
where
    F: Fn(&CaptureConfig) -> Result<Box<dyn FrameSource>, CameraError> + Send + Sync,
{
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CameraError> {
        self(config)
    }
}
