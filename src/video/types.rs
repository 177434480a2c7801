use image::{imageops, ImageBuffer, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// A single video frame
///
/// A thin wrapper around an RGB image buffer. Decoded input frames and
/// rendered output frames both use it.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let buffer = ImageBuffer::from_pixel(width, height, Rgb(color));
        Self { buffer }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    /// Raw packed RGB24 bytes, row-major
    pub fn as_rgb_bytes(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data).map(|buffer| Self { buffer })
    }

    /// Scale to fit inside `width` x `height`, keeping the aspect ratio
    pub fn fit_within(&self, width: u32, height: u32) -> RgbImage {
        let scale = (width as f64 / self.width() as f64).min(height as f64 / self.height() as f64);
        let w = ((self.width() as f64 * scale).round() as u32).clamp(1, width.max(1));
        let h = ((self.height() as f64 * scale).round() as u32).clamp(1, height.max(1));
        if (w, h) == self.dimensions() {
            self.buffer.clone()
        } else {
            imageops::resize(&self.buffer, w, h, imageops::FilterType::Triangle)
        }
    }

    /// Save the frame as a PNG file
    pub fn save_png<P: AsRef<std::path::Path>>(&self, path: P) -> std::result::Result<(), image::ImageError> {
        self.buffer.save(path)
    }
}

/// Native properties of an input video
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frame_count: usize,
    pub duration: f64,
}

impl VideoMetadata {
    /// Bytes of one packed RGB24 frame
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Output video parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputParams {
    /// Output frame rate; the input video's rate when unset
    pub fps: Option<f64>,

    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,

    /// Video codec to use for output
    pub codec: String,

    /// Target bitrate in kbit/s
    pub bitrate_kbps: u32,

    /// Pixel format of the encoded stream
    pub pixel_format: String,

    /// Title written into the container metadata
    pub title: String,
}

impl Default for OutputParams {
    fn default() -> Self {
        Self {
            fps: None,
            width: 1920,
            height: 1080,
            codec: "libx264".to_string(),
            bitrate_kbps: 8000,
            pixel_format: "yuv420p".to_string(),
            title: "Flight Data Visualization".to_string(),
        }
    }
}

impl OutputParams {
    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(fps) = self.fps {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(ConfigError::InvalidValue {
                    key: "output.fps".to_string(),
                    value: fps.to_string(),
                }.into());
            }
        }

        // yuv420p needs even dimensions
        if self.width < 64 || self.height < 64 || self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(ConfigError::InvalidValue {
                key: "output.resolution".to_string(),
                value: format!("{}x{}", self.width, self.height),
            }.into());
        }

        if self.codec.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "output.codec".to_string(),
                value: self.codec.clone(),
            }.into());
        }

        if self.bitrate_kbps == 0 {
            return Err(ConfigError::InvalidValue {
                key: "output.bitrate_kbps".to_string(),
                value: self.bitrate_kbps.to_string(),
            }.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_bytes_roundtrip() {
        let frame = Frame::new_filled(4, 2, [10, 20, 30]);
        assert_eq!(frame.as_rgb_bytes().len(), 24);

        let copy = Frame::from_rgb_bytes(4, 2, frame.as_rgb_bytes().to_vec()).unwrap();
        assert_eq!(copy, frame);
        assert!(Frame::from_rgb_bytes(4, 2, vec![0; 5]).is_none());
    }

    #[test]
    fn test_fit_within_keeps_aspect() {
        let frame = Frame::new_filled(1920, 1080, [1, 2, 3]);
        let fitted = frame.fit_within(640, 640);
        assert_eq!(fitted.dimensions(), (640, 360));

        let portrait = Frame::new_filled(1080, 1920, [1, 2, 3]);
        assert_eq!(portrait.fit_within(640, 640).dimensions(), (360, 640));
    }

    #[test]
    fn test_output_params_validation() {
        assert!(OutputParams::default().validate().is_ok());

        let odd = OutputParams { width: 1921, ..Default::default() };
        assert!(odd.validate().is_err());

        let zero_fps = OutputParams { fps: Some(0.0), ..Default::default() };
        assert!(zero_fps.validate().is_err());
    }
}
