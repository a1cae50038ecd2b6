//! Detection overlay: outline, label box and payload text drawn in place

use image::{Rgb, RgbImage};

use super::font::{self, GLYPH_HEIGHT, GLYPH_WIDTH};
use crate::detect::{DecodedCode, Point};

pub const OUTLINE: Rgb<u8> = Rgb([0, 255, 0]);
pub const LABEL_TEXT: Rgb<u8> = Rgb([0, 0, 0]);
pub const OUTLINE_THICKNESS: i32 = 3;

/// Horizontal space reserved per payload character
pub const CHAR_ADVANCE: i32 = 12;
const GLYPH_SCALE: i32 = 2;
// Label box spans (x0, y0 - 35) .. (x0 + 12 * len, y0 - 5) above the first corner
const LABEL_TOP: i32 = 35;
const LABEL_BOTTOM: i32 = 5;
const TEXT_BASELINE: i32 = 10;

pub fn annotate(frame: &mut RgbImage, code: &DecodedCode) {
    let corners = &code.corners;
    for (i, &from) in corners.iter().enumerate() {
        let to = corners[(i + 1) % corners.len()];
        draw_line(frame, from, to, OUTLINE_THICKNESS, OUTLINE);
    }

    let Some(&anchor) = corners.first() else {
        return;
    };
    let chars = code.payload.chars().count() as i32;
    fill_rect(
        frame,
        Point::new(anchor.x, anchor.y - LABEL_TOP),
        Point::new(anchor.x + chars * CHAR_ADVANCE, anchor.y - LABEL_BOTTOM),
        OUTLINE,
    );
    draw_text(
        frame,
        Point::new(anchor.x, anchor.y - TEXT_BASELINE),
        &code.payload,
        LABEL_TEXT,
    );
}

fn put(frame: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < frame.width() && (y as u32) < frame.height() {
        frame.put_pixel(x as u32, y as u32, color);
    }
}

/// Bresenham line stamped with a square brush
fn draw_line(frame: &mut RgbImage, from: Point, to: Point, thickness: i32, color: Rgb<u8>) {
    let lo = -(thickness - 1) / 2;
    let hi = lo + thickness;

    let (mut x, mut y) = (from.x, from.y);
    let dx = (to.x - from.x).abs();
    let dy = -(to.y - from.y).abs();
    let sx = if from.x < to.x { 1 } else { -1 };
    let sy = if from.y < to.y { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        for oy in lo..hi {
            for ox in lo..hi {
                put(frame, x + ox, y + oy, color);
            }
        }
        if x == to.x && y == to.y {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Filled rectangle, corners inclusive, clipped to the frame
fn fill_rect(frame: &mut RgbImage, a: Point, b: Point, color: Rgb<u8>) {
    let x0 = a.x.min(b.x).max(0);
    let y0 = a.y.min(b.y).max(0);
    let x1 = a.x.max(b.x).min(frame.width() as i32 - 1);
    let y1 = a.y.max(b.y).min(frame.height() as i32 - 1);
    for y in y0..=y1 {
        for x in x0..=x1 {
            frame.put_pixel(x as u32, y as u32, color);
        }
    }
}

/// Text whose bottom row sits on `baseline.y`
fn draw_text(frame: &mut RgbImage, baseline: Point, text: &str, color: Rgb<u8>) {
    let top = baseline.y - GLYPH_HEIGHT as i32 * GLYPH_SCALE;
    for (i, c) in text.chars().enumerate() {
        let left = baseline.x + i as i32 * CHAR_ADVANCE;
        let glyph = font::glyph(c);
        for col in 0..GLYPH_WIDTH {
            for row in 0..GLYPH_HEIGHT {
                if !font::lit(glyph, col, row) {
                    continue;
                }
                for sy in 0..GLYPH_SCALE {
                    for sx in 0..GLYPH_SCALE {
                        put(
                            frame,
                            left + col as i32 * GLYPH_SCALE + sx,
                            top + row as i32 * GLYPH_SCALE + sy,
                            color,
                        );
                    }
                }
            }
        }
    }
}
