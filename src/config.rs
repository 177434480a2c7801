use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, Result},
    telemetry::ChannelTable,
    video::{DecodeMode, OutputParams},
};

/// Main configuration for flight-sync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output video settings
    pub output: OutputParams,

    /// Input video decoding settings
    pub video: VideoConfig,

    /// Channel classification table
    pub channels: ChannelTable,

    /// Panel rendering settings
    pub render: RenderConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.output.validate()?;
        self.render.validate()?;
        Ok(())
    }
}

/// Input video decoding configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Decode frame by frame, or buffer the needed frames up front
    pub decode: DecodeMode,
}

/// Closed value range for a fixed plot axis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Symmetric range around zero
    pub const fn symmetric(half: f64) -> Self {
        Self { min: -half, max: half }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    fn validate(&self, key: &str) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.max <= self.min {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: format!("{}..{}", self.min, self.max),
            }.into());
        }
        Ok(())
    }
}

/// Fixed axis bounds per panel, tuned to the expected flight envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelBounds {
    pub position_x: Bounds,
    pub position_y: Bounds,
    pub command_angle: Bounds,
    pub pid_x: Bounds,
    pub pid_y: Bounds,
    pub detections: Bounds,
}

impl Default for PanelBounds {
    fn default() -> Self {
        Self {
            position_x: Bounds::symmetric(1.0),
            position_y: Bounds::symmetric(1.0),
            command_angle: Bounds::symmetric(5.0),
            pid_x: Bounds::symmetric(0.1),
            pid_y: Bounds::symmetric(0.1),
            detections: Bounds::new(0.0, 5.0),
        }
    }
}

/// Channel names each panel reads from the resampled series
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelChannels {
    /// Horizontal and vertical position
    pub position: [String; 2],

    /// Roll and pitch command angles
    pub command_angles: [String; 2],

    /// X-axis controller P, I and D terms
    pub pid_x: [String; 3],

    /// Y-axis controller P, I and D terms
    pub pid_y: [String; 3],

    /// Detection count
    pub detections: String,
}

impl Default for PanelChannels {
    fn default() -> Self {
        Self {
            position: ["pos_x".into(), "pos_y".into()],
            command_angles: ["roll_ref_deg".into(), "pitch_ref_deg".into()],
            pid_x: ["pid_x_p".into(), "pid_x_i".into(), "pid_x_d".into()],
            pid_y: ["pid_y_p".into(), "pid_y_i".into(), "pid_y_d".into()],
            detections: "marker_count".into(),
        }
    }
}

/// Panel rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Number of prior samples in the position trail
    pub trail_length: usize,

    /// Trailing time window of the angle and controller panels (seconds)
    pub plot_window_secs: f64,

    /// Space kept to the right of the current time (seconds)
    pub plot_lead_secs: f64,

    /// Trailing time window of the detection panel (seconds)
    pub detection_window_secs: f64,

    /// Space kept to the right of the current time on the detection panel (seconds)
    pub detection_lead_secs: f64,

    /// Fixed axis bounds
    pub bounds: PanelBounds,

    /// Channels read by each panel
    pub channels: PanelChannels,

    /// TrueType font for titles and labels; system fonts are searched when unset
    pub font_path: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            trail_length: 100,
            plot_window_secs: 5.0,
            plot_lead_secs: 0.5,
            detection_window_secs: 10.0,
            detection_lead_secs: 1.0,
            bounds: PanelBounds::default(),
            channels: PanelChannels::default(),
            font_path: None,
        }
    }
}

impl RenderConfig {
    fn validate(&self) -> Result<()> {
        if self.trail_length == 0 {
            return Err(ConfigError::InvalidValue {
                key: "render.trail_length".to_string(),
                value: self.trail_length.to_string()
            }.into());
        }

        for (key, value) in [
            ("render.plot_window_secs", self.plot_window_secs),
            ("render.detection_window_secs", self.detection_window_secs),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string()
                }.into());
            }
        }

        for (key, value) in [
            ("render.plot_lead_secs", self.plot_lead_secs),
            ("render.detection_lead_secs", self.detection_lead_secs),
        ] {
            if !(value >= 0.0) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string()
                }.into());
            }
        }

        let b = &self.bounds;
        b.position_x.validate("render.bounds.position_x")?;
        b.position_y.validate("render.bounds.position_y")?;
        b.command_angle.validate("render.bounds.command_angle")?;
        b.pid_x.validate("render.bounds.pid_x")?;
        b.pid_y.validate("render.bounds.pid_y")?;
        b.detections.validate("render.bounds.detections")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("test_config.toml");

        let mut original_config = Config::default();
        original_config.output.fps = Some(25.0);
        original_config.render.trail_length = 42;

        original_config.save_to_file(&file_path).unwrap();
        let loaded_config = Config::from_file(&file_path).unwrap();

        assert_eq!(loaded_config.output.fps, Some(25.0));
        assert_eq!(loaded_config.render.trail_length, 42);
        assert_eq!(loaded_config.render.bounds.pid_x, Bounds::symmetric(0.1));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            "[render]\ntrail_length = 50\n\n[render.bounds.detections]\nmin = 0.0\nmax = 8.0\n",
        )
        .unwrap();

        assert_eq!(config.render.trail_length, 50);
        assert_eq!(config.render.bounds.detections.max, 8.0);
        assert_eq!(config.render.plot_window_secs, 5.0);
        assert_eq!(config.output.width, 1920);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_invalid_trail_length() {
        let mut config = Config::default();
        config.render.trail_length = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let mut config = Config::default();
        config.render.bounds.command_angle = Bounds::new(5.0, -5.0);
        assert!(config.validate().is_err());
    }
}
