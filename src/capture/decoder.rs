use image::RgbImage;
use jpeg_decoder::{Decoder, PixelFormat as JpegPixelFormat};

use super::frame::{Frame, PixelFormat};
use super::source::CaptureError;

/// Decode a captured frame into a packed RGB raster
pub fn decode_frame(frame: &Frame) -> Result<RgbImage, CaptureError> {
    let format = frame.meta.format;
    let fail = |reason: String| CaptureError::Decode { format, reason };

    match format {
        PixelFormat::Mjpeg => {
            let mut decoder = Decoder::new(&frame.data[..]);
            let pixels = decoder.decode().map_err(|e| fail(e.to_string()))?;
            let info = decoder
                .info()
                .ok_or_else(|| fail("missing JPEG header".into()))?;
            let rgb = match info.pixel_format {
                JpegPixelFormat::RGB24 => pixels,
                JpegPixelFormat::L8 => pixels.iter().flat_map(|&l| [l, l, l]).collect(),
                other => return Err(fail(format!("unsupported JPEG layout {:?}", other))),
            };
            RgbImage::from_raw(info.width as u32, info.height as u32, rgb)
                .ok_or_else(|| fail("decoded size mismatch".into()))
        }
        PixelFormat::Rgb24 => packed(frame, frame.data.to_vec()).ok_or_else(|| fail(short(frame))),
        PixelFormat::Bgr24 => {
            let mut data = frame.data.to_vec();
            for px in data.chunks_exact_mut(3) {
                px.swap(0, 2);
            }
            packed(frame, data).ok_or_else(|| fail(short(frame)))
        }
        PixelFormat::Yuyv4 => {
            let expected = (frame.meta.width * frame.meta.height * 2) as usize;
            if frame.data.len() < expected {
                return Err(fail(short(frame)));
            }
            packed(frame, yuyv_to_rgb(&frame.data[..expected])).ok_or_else(|| fail(short(frame)))
        }
    }
}

fn packed(frame: &Frame, mut data: Vec<u8>) -> Option<RgbImage> {
    data.truncate((frame.meta.width * frame.meta.height * 3) as usize);
    RgbImage::from_raw(frame.meta.width, frame.meta.height, data)
}

fn short(frame: &Frame) -> String {
    format!(
        "{} bytes is too short for {}x{}",
        frame.data.len(),
        frame.meta.width,
        frame.meta.height
    )
}

/// YUYV 4:2:2 to RGB24, BT.601 limited range
fn yuyv_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 2 * 3);
    for chunk in data.chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&yuv_pixel(y0, u, v));
        rgb.extend_from_slice(&yuv_pixel(y1, u, v));
    }
    rgb
}

fn yuv_pixel(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e),
        clamp(298 * c - 100 * d - 208 * e),
        clamp(298 * c + 516 * d),
    ]
}
