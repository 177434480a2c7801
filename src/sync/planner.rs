use serde::Serialize;
use tracing::info;

use crate::error::{PlanError, Result};

/// Common time base of the telemetry log and the video
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SyncPlan {
    /// Seconds covered by the telemetry log
    pub source_duration: f64,

    /// Native video duration in seconds
    pub video_duration: f64,

    /// Native video frame rate
    pub video_frame_rate: f64,

    /// Native video frame count
    pub video_frame_count: usize,

    /// Rate of the output grid
    pub output_frame_rate: f64,

    /// Number of output frames, clamped by both inputs
    pub output_frame_count: usize,
}

impl SyncPlan {
    /// Output period in seconds
    pub fn frame_period(&self) -> f64 {
        1.0 / self.output_frame_rate
    }

    /// Time of output frame `index` on the common time base
    pub fn time_of(&self, index: usize) -> f64 {
        index as f64 / self.output_frame_rate
    }

    /// Native video frame shown at output frame `index`
    ///
    /// Identity when the output runs at the video rate; otherwise frames are
    /// repeated or skipped to stay on the same time base.
    pub fn video_index_of(&self, index: usize) -> usize {
        if self.output_frame_rate == self.video_frame_rate {
            index
        } else {
            (index as f64 * self.video_frame_rate / self.output_frame_rate).floor() as usize
        }
    }

    /// Output duration in seconds
    pub fn output_duration(&self) -> f64 {
        self.output_frame_count as f64 / self.output_frame_rate
    }
}

/// Compute the sync plan
///
/// The output frame count is `min(video_frame_count,
/// floor(source_duration * output_frame_rate))`, so the output never asks the
/// decoder for more frames than the video has and never extends past the time
/// range the log covers.
pub fn plan(
    source_duration: f64,
    video_frame_rate: f64,
    video_frame_count: usize,
    output_frame_rate: f64,
) -> Result<SyncPlan> {
    positive("source_duration", source_duration)?;
    positive("video_frame_rate", video_frame_rate)?;
    positive("output_frame_rate", output_frame_rate)?;
    if video_frame_count == 0 {
        return Err(PlanError::InvalidInput {
            field: "video_frame_count",
            value: "0".to_string(),
        }
        .into());
    }

    let log_frames = (source_duration * output_frame_rate).floor() as usize;
    let output_frame_count = video_frame_count.min(log_frames);

    let plan = SyncPlan {
        source_duration,
        video_duration: video_frame_count as f64 / video_frame_rate,
        video_frame_rate,
        video_frame_count,
        output_frame_rate,
        output_frame_count,
    };

    info!(
        "Sync plan: log={:.2}s, video={:.2}s ({} frames @ {:.2}fps), output={} frames @ {:.2}fps",
        plan.source_duration,
        plan.video_duration,
        plan.video_frame_count,
        plan.video_frame_rate,
        plan.output_frame_count,
        plan.output_frame_rate
    );

    Ok(plan)
}

fn positive(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PlanError::InvalidInput {
            field,
            value: value.to_string(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use proptest::prelude::*;

    #[test]
    fn test_equal_durations() {
        // Log covers 10s, video is 300 frames at 30fps
        let plan = plan(10.0, 30.0, 300, 30.0).unwrap();
        assert_eq!(plan.output_frame_count, 300);
        assert_eq!(plan.video_duration, 10.0);
    }

    #[test]
    fn test_clamped_by_log() {
        // Log covers 5s, video is 15s
        let plan = plan(5.0, 30.0, 450, 30.0).unwrap();
        assert_eq!(plan.output_frame_count, 150);
        assert_eq!(plan.video_index_of(149), 149);
    }

    #[test]
    fn test_clamped_by_video() {
        let plan = plan(20.0, 30.0, 120, 30.0).unwrap();
        assert_eq!(plan.output_frame_count, 120);
    }

    #[test]
    fn test_rate_conversion() {
        let plan = plan(10.0, 60.0, 600, 30.0).unwrap();
        assert_eq!(plan.output_frame_count, 300);
        assert_eq!(plan.video_index_of(1), 2);
        assert_eq!(plan.video_index_of(10), 20);
        assert!((plan.time_of(15) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_inputs() {
        for (d, vr, vc, or) in [
            (0.0, 30.0, 300, 30.0),
            (-1.0, 30.0, 300, 30.0),
            (10.0, 0.0, 300, 30.0),
            (10.0, 30.0, 0, 30.0),
            (10.0, 30.0, 300, 0.0),
            (f64::NAN, 30.0, 300, 30.0),
        ] {
            let err = plan(d, vr, vc, or).unwrap_err();
            assert!(matches!(err, SyncError::Plan(PlanError::InvalidInput { .. })));
        }
    }

    proptest! {
        #[test]
        fn prop_frame_count_formula(
            duration in 0.01f64..600.0,
            video_rate in 1.0f64..120.0,
            video_frames in 1usize..50_000,
            output_rate in 1.0f64..120.0,
        ) {
            let plan = plan(duration, video_rate, video_frames, output_rate).unwrap();
            let expected = video_frames.min((duration * output_rate).floor() as usize);
            prop_assert_eq!(plan.output_frame_count, expected);
            prop_assert!(plan.output_frame_count <= video_frames);
            prop_assert!(plan.time_of(plan.output_frame_count) <= duration + 1e-9);
        }
    }
}
