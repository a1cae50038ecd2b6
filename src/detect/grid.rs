use image::RgbImage;
use tracing::trace;

use super::{DecodedCode, Point, QrDecoder};

/// QR decoder backed by rqrr's grid detector
#[derive(Debug, Default, Clone, Copy)]
pub struct RqrrDecoder;

impl QrDecoder for RqrrDecoder {
    fn detect(&self, frame: &RgbImage) -> Option<DecodedCode> {
        let (width, height) = frame.dimensions();
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
                luma(frame.get_pixel(x as u32, y as u32).0)
            });

        let grids = prepared.detect_grids();
        let grid = grids.first()?;

        let (_meta, payload) = match grid.decode() {
            Ok(decoded) => decoded,
            Err(e) => {
                trace!(error = %e, "Found grid but could not decode it");
                return None;
            }
        };
        if payload.is_empty() {
            return None;
        }

        let corners = grid.bounds.iter().map(|p| Point::new(p.x, p.y)).collect();
        Some(DecodedCode { payload, corners })
    }
}

/// ITU-R BT.601 luma, integer approximation
fn luma([r, g, b]: [u8; 3]) -> u8 {
    ((r as u32 * 77 + g as u32 * 150 + b as u32 * 29) >> 8) as u8
}
