//! # Synchronization Module
//!
//! Establishes the common time base of log and video ([`plan`]) and puts the
//! log onto the output frame grid ([`resample`]).
//!
//! ```rust
//! use flight_sync::sync::{plan, resample};
//! use flight_sync::telemetry::TelemetryLoader;
//!
//! # fn main() -> flight_sync::Result<()> {
//! let csv = "elapsed_time,timestamp,pos_x\n0.0,a,0.0\n1.0,b,1.0\n";
//! let store = TelemetryLoader::default().load_from_reader(csv.as_bytes(), "inline")?;
//!
//! let plan = plan(store.duration(), 30.0, 300, 30.0)?;
//! let resampled = resample(&store, &plan)?;
//! assert_eq!(resampled.series.len(), 30);
//! # Ok(())
//! # }
//! ```

pub mod planner;
pub mod resampler;

pub use planner::{plan, SyncPlan};
pub use resampler::{
    resample, ChannelValues, HistoryWindow, ResampledChannel, ResampledSeries, Resampled,
    SampleValue, SampleView,
};
