//! # Render Module
//!
//! Turns one resampled sample, its trailing history and the matching video
//! frame into a composite multi-panel image.
//!
//! Each panel implements [`Panel`] and draws into its own fresh image; the
//! [`FrameCompositor`] lays them out on a 3x3 grid. Drawing goes through
//! `imageproc` primitives over `image` buffers, text through `ab_glyph`.

pub mod canvas;
pub mod compositor;
pub mod panels;
pub mod text;

pub use compositor::{FrameCompositor, GridSpec, RenderedFrame};
pub use panels::{
    DetectionPanel, FrameContext, Panel, PanelEnv, PanelImage, TimeSeriesPanel, Trace, TrailPanel,
    VideoPanel,
};
pub use text::TextRenderer;
