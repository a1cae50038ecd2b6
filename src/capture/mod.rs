pub mod decoder;
pub mod frame;
pub mod source;
pub mod v4l2;

pub use frame::Frame;
pub use frame::PixelFormat;
pub use source::{CameraError, CaptureError, FrameSource, SourceOpener};
pub use v4l2::{V4l2Capture, V4l2Opener};
