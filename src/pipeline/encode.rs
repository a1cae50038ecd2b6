use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageError, RgbImage};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("JPEG encoding failed: {0}")]
pub struct EncodeError(#[from] ImageError);

/// Encode an RGB frame as a baseline JPEG
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Bytes, EncodeError> {
    let mut out = Vec::with_capacity((frame.width() * frame.height() / 4) as usize);
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode(
        frame.as_raw(),
        frame.width(),
        frame.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(Bytes::from(out))
}
