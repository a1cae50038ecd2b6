//! V4L2 capture with memory-mapped driver buffers

use std::io;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::frame::{Frame, FrameMetadata, PixelFormat};
use crate::capture::source::{CameraError, CaptureError, FrameSource, SourceOpener};
use crate::utils;
use crate::CaptureConfig;

/// V4L2 camera handle
pub struct V4l2Capture {
    device: Option<Device>,
    stream: Option<MmapStream<'static>>,
    path: String,
    width: u32,
    height: u32,
    format: PixelFormat,
    buffer_count: u32,
    sequence: u64,
}

impl V4l2Capture {
    /// Open and configure the device; does not start streaming yet
    #[instrument(skip(config), fields(device = %path))]
    pub fn new(path: &str, config: &CaptureConfig) -> Result<Self, CameraError> {
        info!("Initializing V4L2 capture");

        let device = Device::with_path(path).map_err(|e| map_open_error(path, e))?;

        let caps = device.query_caps().map_err(|e| map_open_error(path, e))?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CameraError::Unsupported {
                device: path.to_string(),
                what: "video capture".into(),
            });
        }

        let mut fmt = device.format().map_err(|e| map_open_error(path, e))?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = match config.format {
            PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
            PixelFormat::Yuyv4 => FourCC::new(b"YUYV"),
            PixelFormat::Rgb24 => FourCC::new(b"RGB3"),
            PixelFormat::Bgr24 => FourCC::new(b"BGR3"),
        };

        // The driver answers with what it actually picked
        let applied = device.set_format(&fmt).map_err(|e| map_open_error(path, e))?;
        let format = pixel_format_of(applied.fourcc).ok_or_else(|| CameraError::Unsupported {
            device: path.to_string(),
            what: format!("pixel format {}", applied.fourcc),
        })?;
        if applied.width != config.width || applied.height != config.height {
            warn!(
                requested_width = config.width,
                requested_height = config.height,
                width = applied.width,
                height = applied.height,
                "Driver adjusted capture resolution"
            );
        }

        // Frame rate is a hint only
        if let Err(e) = device.set_params(&Parameters::with_fps(config.fps)) {
            debug!(error = %e, fps = config.fps, "Driver rejected frame rate hint");
        }

        Ok(Self {
            device: Some(device),
            stream: None,
            path: path.to_string(),
            width: applied.width,
            height: applied.height,
            format,
            buffer_count: config.buffer_count.max(1),
            sequence: 0,
        })
    }

    /// Start streaming with memory-mapped buffers
    pub fn start_stream(&mut self) -> Result<(), CameraError> {
        let device = self.device.as_ref().ok_or(CameraError::NotInitialized)?;

        let stream = MmapStream::with_buffers(device, Type::VideoCapture, self.buffer_count)
            .map_err(|e| map_open_error(&self.path, e))?;

        self.stream = Some(stream);
        info!(
            device = %self.path,
            "Capture stream started with {} buffers",
            self.buffer_count
        );
        Ok(())
    }
}

impl FrameSource for V4l2Capture {
    #[instrument(skip(self), fields(device = %self.path))]
    fn capture(&mut self) -> Result<Frame, CaptureError> {
        let timestamp = Instant::now();

        let stream = self.stream.as_mut().ok_or(CaptureError::Closed)?;

        // Blocks until the driver dequeues a buffer
        let (buf, meta) = stream.next()?;

        // MJPEG buffers are padded past the payload
        let used = (meta.bytesused as usize).min(buf.len());
        let used = if used == 0 { buf.len() } else { used };
        let data = Bytes::copy_from_slice(&buf[..used]);

        self.sequence += 1;

        let frame_meta = Arc::new(FrameMetadata {
            sequence: self.sequence,
            width: self.width,
            height: self.height,
            format: self.format,
        });

        Ok(Frame {
            data,
            meta: frame_meta,
            timestamp,
        })
    }

    fn release(&mut self) {
        if self.stream.take().is_some() || self.device.is_some() {
            info!(device = %self.path, frames = self.sequence, "Releasing capture device");
        }
        self.device = None;
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for V4l2Capture {
    fn drop(&mut self) {
        self.release();
    }
}

/// Opens V4L2 devices according to the capture configuration
#[derive(Debug, Default, Clone, Copy)]
pub struct V4l2Opener;

impl SourceOpener for V4l2Opener {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CameraError> {
        let mut config = config.clone();
        let path = if config.auto_detect {
            let found = utils::auto_detect_device()?;
            config.format = found.format;
            found.path
        } else {
            config.device_node()
        };

        let mut capture = V4l2Capture::new(&path, &config)?;
        capture.start_stream()?;
        Ok(Box::new(capture))
    }
}

fn pixel_format_of(fourcc: FourCC) -> Option<PixelFormat> {
    match &fourcc.repr {
        b"MJPG" => Some(PixelFormat::Mjpeg),
        b"YUYV" => Some(PixelFormat::Yuyv4),
        b"RGB3" => Some(PixelFormat::Rgb24),
        b"BGR3" => Some(PixelFormat::Bgr24),
        _ => None,
    }
}

fn map_open_error(path: &str, e: io::Error) -> CameraError {
    match e.raw_os_error() {
        Some(code) if code == nix::errno::Errno::EBUSY as i32 => CameraError::Busy(path.to_string()),
        Some(code) if code == nix::errno::Errno::ENOENT as i32 => {
            CameraError::NotFound(path.to_string())
        }
        _ => CameraError::Io {
            device: path.to_string(),
            source: e,
        },
    }
}
