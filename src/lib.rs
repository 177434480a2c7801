//! # Flight-Sync
//!
//! Synchronize a high-rate flight telemetry log with the onboard video and
//! render both into a single multi-panel visualization video.
//!
//! The log is loaded as a time-ordered store, a sync plan fixes the output
//! frame grid, every channel is resampled onto that grid and each output frame
//! is composed from the current sample, its trailing history and the matching
//! video frame before being streamed into the encoder.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flight_sync::{Config, SyncEngine};
//!
//! # fn main() -> anyhow::Result<()> {
//! let engine = SyncEngine::new(Config::default())?;
//! let report = engine.run("flight_log.csv", "flight.mp4", "synchronized.mp4")?;
//! println!("{} frames written", report.frames_written);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`telemetry`] - CSV loading and channel classification
//! - [`sync`] - Sync planning and resampling onto the output grid
//! - [`video`] - Input decoding and output encoding through ffmpeg
//! - [`render`] - Panels and frame composition
//! - [`pipeline`] - The end-to-end run
//! - [`config`] - Configuration management
//!
//! ## Custom Panels
//!
//! Panels implement the [`Panel`](render::Panel) trait and return a fresh
//! image for every frame:
//!
//! ```rust,no_run
//! use flight_sync::render::{FrameContext, Panel, PanelEnv, PanelImage};
//! use image::{Rgb, RgbImage};
//!
//! struct AltitudePanel;
//!
//! impl Panel for AltitudePanel {
//!     fn name(&self) -> &str {
//!         "altitude"
//!     }
//!
//!     fn channels(&self) -> Vec<&str> {
//!         vec!["pos_z"]
//!     }
//!
//!     fn render(&self, ctx: &FrameContext<'_>, size: (u32, u32), _env: &PanelEnv) -> PanelImage {
//!         let shade = ctx.sample.number("pos_z").map_or(0, |z| (z * 100.0).clamp(0.0, 255.0) as u8);
//!         PanelImage {
//!             image: RgbImage::from_pixel(size.0, size.1, Rgb([shade, shade, shade])),
//!             placeholder: false,
//!         }
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod sync;
pub mod telemetry;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    error::{Result, SyncError, Warning},
    pipeline::{RunReport, SyncEngine},
    sync::{plan, resample, ResampledSeries, SyncPlan},
    telemetry::{TelemetryLoader, TimeSeriesStore},
};
