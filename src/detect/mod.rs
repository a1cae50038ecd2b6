//! QR detection capability consumed by the pipeline

pub mod grid;

use image::RgbImage;
use serde::Serialize;

pub use grid::RqrrDecoder;

/// Pixel position in frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A decoded code and its outline, corners in detection order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCode {
    pub payload: String,
    pub corners: Vec<Point>,
}

/// Finds at most one QR code per frame. Implementations keep no state between calls.
pub trait QrDecoder: Send + Sync {
    fn detect(&self, frame: &RgbImage) -> Option<DecodedCode>;
}
