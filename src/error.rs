use std::fmt;

use thiserror::Error;

/// Main error type for the flight-sync library
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("Sync planning error: {0}")]
    Plan(#[from] PlanError),

    #[error("Resampling error: {0}")]
    Resample(#[from] ResampleError),

    #[error("Video error: {0}")]
    Video(#[from] VideoError),

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Telemetry log loading errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Telemetry log not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to parse telemetry log {path}: {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("Telemetry log is missing required column '{column}'")]
    MissingColumn { column: String },

    #[error("Invalid elapsed_time at row {row}: '{value}'")]
    InvalidElapsedTime { row: usize, value: String },

    #[error("elapsed_time decreases at row {row} ({previous} -> {current})")]
    NonMonotonic {
        row: usize,
        previous: f64,
        current: f64,
    },

    #[error("Telemetry log contains no samples")]
    Empty,
}

/// Sync planning errors
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Invalid sync input: {field} = {value}")]
    InvalidInput { field: &'static str, value: String },
}

/// Resampling errors
#[derive(Error, Debug)]
pub enum ResampleError {
    #[error("Target time {target:.4}s is beyond the last sample at {last:.4}s plus one frame period")]
    OutOfRange { target: f64, last: f64 },
}

/// Video decoding errors
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Failed to open video file: {path}")]
    LoadFailed { path: String },

    #[error("Failed to probe video {path}: {reason}")]
    ProbeFailed { path: String, reason: String },

    #[error("Invalid video parameters: {details}")]
    InvalidParameters { details: String },

    #[error("Video decoding failed: {reason}")]
    DecodingFailed { reason: String },
}

/// Output encoding errors
#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("Failed to start encoder for {path}: {reason}")]
    SpawnFailed { path: String, reason: String },

    #[error("Failed to write frame {index} to encoder: {reason}")]
    WriteFailed { index: usize, reason: String },

    #[error("Encoder exited with failure ({status}): {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Frame {got} submitted out of order (expected {expected})")]
    OutOfOrder { expected: usize, got: usize },

    #[error("Frame {index} is {got_width}x{got_height}, encoder expects {width}x{height}")]
    FrameSize {
        index: usize,
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using SyncError
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Malformed inputs that are rejected before any output is written
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::Telemetry(_)
                | Self::Plan(PlanError::InvalidInput { .. })
                | Self::Video(VideoError::LoadFailed { .. })
                | Self::Video(VideoError::ProbeFailed { .. })
                | Self::Video(VideoError::InvalidParameters { .. })
                | Self::Config(_)
        )
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Telemetry(TelemetryError::FileNotFound { path }) => {
                format!("Could not open telemetry log '{}'. Please check the file exists.", path)
            }
            Self::Telemetry(TelemetryError::MissingColumn { column }) => {
                format!("The telemetry log has no '{}' column. Is this a flight log CSV?", column)
            }
            Self::Video(VideoError::LoadFailed { path }) => {
                format!("Could not open video '{}'. Please check the file exists and ffmpeg is installed.", path)
            }
            Self::Encoder(EncoderError::SpawnFailed { .. }) => {
                "Could not start ffmpeg for encoding. Please check ffmpeg is installed.".to_string()
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}

/// Non-fatal conditions collected during a run
///
/// These never interrupt frame production; they are logged when they occur
/// and returned with the run report so the operator can see them afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// A channel could not be coerced to its declared numeric kind and was dropped
    ChannelCoercion {
        channel: String,
        row: usize,
        value: String,
    },

    /// The video ran out of frames before the planned output frame count
    MissingFrame {
        output_index: usize,
        video_index: usize,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelCoercion { channel, row, value } => write!(
                f,
                "channel '{}' dropped: row {} value '{}' is not numeric",
                channel, row, value
            ),
            Self::MissingFrame {
                output_index,
                video_index,
            } => write!(
                f,
                "video exhausted at output frame {} (video frame {}); remaining frames use a placeholder",
                output_index, video_index
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_input_classification() {
        let err: SyncError = TelemetryError::Empty.into();
        assert!(err.is_invalid_input());

        let err: SyncError = PlanError::InvalidInput {
            field: "source_duration",
            value: "0".to_string(),
        }
        .into();
        assert!(err.is_invalid_input());

        let err: SyncError = EncoderError::WriteFailed {
            index: 3,
            reason: "broken pipe".to_string(),
        }
        .into();
        assert!(!err.is_invalid_input());

        let err: SyncError = ResampleError::OutOfRange {
            target: 11.0,
            last: 10.0,
        }
        .into();
        assert!(!err.is_invalid_input());
    }

    #[test]
    fn test_user_message_mentions_column() {
        let err: SyncError = TelemetryError::MissingColumn {
            column: "elapsed_time".to_string(),
        }
        .into();
        assert!(err.user_message().contains("elapsed_time"));
    }

    #[test]
    fn test_warning_display() {
        let warning = Warning::MissingFrame {
            output_index: 120,
            video_index: 120,
        };
        assert!(warning.to_string().contains("output frame 120"));
    }
}
