//! # Video Module
//!
//! Decoding of the input video ([`MediaSource`]) and streaming of rendered
//! frames into the output file ([`StreamEncoder`]). Both sides talk to an
//! external `ffmpeg` through raw RGB24 pipes.

pub mod encoder;
pub mod source;
pub mod types;

pub use encoder::{EncodedVideo, FrameSink, StreamEncoder};
pub use source::{DecodeMode, FfmpegSource, FrameCursor, MediaSource, MemorySource};
pub use types::{Frame, OutputParams, VideoMetadata};
