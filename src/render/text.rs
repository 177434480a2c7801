use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::{debug, info, warn};

/// Fonts tried when no font is configured, per platform
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// 3x5 bitmaps for digits, used when no font could be loaded
const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b010, 0b010, 0b010],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];
const MINUS: [u8; 5] = [0b000, 0b000, 0b111, 0b000, 0b000];

/// Text drawing for panel titles, labels and callouts
///
/// The font is resolved once at startup. Without a usable font, titles and
/// labels are skipped and numbers fall back to a built-in digit bitmap, so
/// numeric callouts always render.
#[derive(Clone, Default)]
pub struct TextRenderer {
    font: Option<FontArc>,
}

impl TextRenderer {
    /// Load `path`, or the first available system font when `None`
    pub fn load(path: Option<&Path>) -> Self {
        let candidates: Vec<PathBuf> = match path {
            Some(p) => vec![p.to_path_buf()],
            None => SYSTEM_FONTS.iter().map(PathBuf::from).collect(),
        };

        for candidate in &candidates {
            let Ok(bytes) = std::fs::read(candidate) else {
                continue;
            };
            match FontArc::try_from_vec(bytes) {
                Ok(font) => {
                    info!("Using font {:?}", candidate);
                    return Self { font: Some(font) };
                }
                Err(e) => debug!("Font {:?} unusable: {}", candidate, e),
            }
        }

        warn!("No usable font found; titles and labels will not be drawn");
        Self::without_font()
    }

    /// Renderer that only draws numbers with the built-in bitmap
    pub fn without_font() -> Self {
        Self { font: None }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Width and height of `text` at `size` pixels
    pub fn measure(&self, text: &str, size: f32) -> (u32, u32) {
        match &self.font {
            Some(font) => text_size(PxScale::from(size), font, text),
            None if is_numeric(text) => {
                let cell = bitmap_cell(size);
                (text.chars().count() as u32 * cell * 4, cell * 5)
            }
            None => (0, 0),
        }
    }

    /// Draw `text` with its top-left corner at (`x`, `y`)
    pub fn draw(&self, image: &mut RgbImage, text: &str, x: i32, y: i32, size: f32, color: [u8; 3]) {
        match &self.font {
            Some(font) => draw_text_mut(image, Rgb(color), x, y, PxScale::from(size), font, text),
            None if is_numeric(text) => draw_bitmap_number(image, text, x, y, size, color),
            None => {}
        }
    }

    /// Draw `text` centred horizontally on `cx`
    pub fn draw_centered(&self, image: &mut RgbImage, text: &str, cx: i32, y: i32, size: f32, color: [u8; 3]) {
        let (w, _) = self.measure(text, size);
        self.draw(image, text, cx - w as i32 / 2, y, size, color);
    }
}

fn is_numeric(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit() || c == '-')
}

fn bitmap_cell(size: f32) -> u32 {
    ((size / 5.0).round() as u32).max(1)
}

fn draw_bitmap_number(image: &mut RgbImage, text: &str, x: i32, y: i32, size: f32, color: [u8; 3]) {
    let cell = bitmap_cell(size);
    for (i, c) in text.chars().enumerate() {
        let rows = match c.to_digit(10) {
            Some(d) => DIGITS[d as usize],
            None => MINUS,
        };
        let left = x + (i as u32 * cell * 4) as i32;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..3 {
                if bits & (0b100 >> col) != 0 {
                    let rect = Rect::at(left + (col * cell) as i32, y + (row as u32 * cell) as i32)
                        .of_size(cell, cell);
                    draw_filled_rect_mut(image, rect, Rgb(color));
                }
            }
        }
    }
}
