//! # Pipeline Module
//!
//! The end-to-end run: prepare (load, plan, resample) then render (decode,
//! compose, encode) one frame at a time.

pub mod engine;

pub use engine::{Prepared, Progress, ProgressCallback, RunReport, SyncEngine};
