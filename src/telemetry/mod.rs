//! # Telemetry Module
//!
//! Loads the high-rate flight log and holds it as a time-ordered store.
//! Each column is classified once, by name, into a [`ChannelKind`] that later
//! fixes how it is resampled.

pub mod loader;
pub mod types;

pub use loader::TelemetryLoader;
pub use types::{
    ChannelKind, ChannelTable, RawChannel, TelemetrySample, TimeSeriesStore, ELAPSED_TIME,
    TIMESTAMP,
};
