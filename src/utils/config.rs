use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::core::constants::*;

/// Scene-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Cap on the lateral offset used to place anchors (m)
    pub distance_limit_m: u32,
    /// Manual compass calibration added to every marker bearing (degrees)
    pub bearing_adjustment_deg: i32,
    /// Periodic refresh interval (milliseconds)
    pub refresh_interval_ms: u64,
    /// Refresh on accepted location changes instead of on a timer
    pub refresh_on_location_change: bool,
    /// Ignore location changes smaller than this when refreshing on location (m)
    pub min_refresh_displacement_m: Option<f64>,
    pub location: LocationConfig,
    pub orientation: OrientationConfig,
    pub placement: PlacementConfig,
}

/// How incoming fixes are turned into a best location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AcceptancePolicy {
    /// Acceptance rules followed by the Kalman filter and divergence guard
    #[default]
    Filtered,
    /// No filter: keep whichever fix looks better by age, accuracy and provider
    BestFix,
}

/// Location estimator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub max_fix_age_ms: u64,
    /// Tolerance for fixes stamped after the clock's current reading
    pub max_future_skew_ms: u64,
    pub minimum_accuracy_m: f64,
    pub divergence_threshold_m: f64,
    pub max_consecutive_rejects: u32,
    pub default_process_noise_mps: f64,
    pub policy: AcceptancePolicy,
    /// Take the very first fix as the best location before any checks
    pub adopt_first_fix: bool,
}

/// Display rotation relative to the device's natural orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScreenRotation {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl ScreenRotation {
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(ScreenRotation::Rotation0),
            90 => Some(ScreenRotation::Rotation90),
            180 => Some(ScreenRotation::Rotation180),
            270 => Some(ScreenRotation::Rotation270),
            _ => None,
        }
    }
}

/// Orientation estimator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationConfig {
    pub screen_rotation: ScreenRotation,
    /// Report the camera's look direction for a phone held upright
    pub camera_upright: bool,
    /// Low-pass weight given to each new heading sample, in (0, 1].
    /// `None` keeps the last sample as-is.
    pub heading_smoothing: Option<f64>,
}

/// Vertical shaping applied on top of the camera height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HeightAdjustment {
    /// Markers sit at camera height plus their own height
    None,
    /// Raise capped markers a little so they read as further away
    #[default]
    DistanceIllusion,
}

/// Overlap mitigation between markers on screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapConfig {
    /// Vertical step applied per attempt (m)
    pub raise_step_m: f64,
    /// Attempts before an occluded marker is hidden
    pub max_raise_steps: u32,
}

impl Default for OverlapConfig {
    fn default() -> Self {
        Self {
            raise_step_m: 1.0,
            max_raise_steps: 3,
        }
    }
}

/// Placement and scaling settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub fixed_size_scale_per_meter: f64,
    pub distant_penalty_threshold_m: f64,
    pub distant_penalty_factor: f64,
    pub height_adjustment: HeightAdjustment,
    pub illusion_cap_m: f64,
    pub illusion_gain: f64,
    /// Shift markers towards the horizon using the device pitch
    pub horizon_from_pitch: bool,
    pub overlap: Option<OverlapConfig>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            distance_limit_m: DEFAULT_DISTANCE_LIMIT_M,
            bearing_adjustment_deg: 0,
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            refresh_on_location_change: false,
            min_refresh_displacement_m: None,
            location: LocationConfig::default(),
            orientation: OrientationConfig::default(),
            placement: PlacementConfig::default(),
        }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            max_fix_age_ms: DEFAULT_MAX_FIX_AGE_MS,
            max_future_skew_ms: DEFAULT_MAX_FUTURE_SKEW_MS,
            minimum_accuracy_m: DEFAULT_MINIMUM_ACCURACY_M,
            divergence_threshold_m: DIVERGENCE_THRESHOLD_M,
            max_consecutive_rejects: MAX_CONSECUTIVE_REJECTS,
            default_process_noise_mps: DEFAULT_PROCESS_NOISE_MPS,
            policy: AcceptancePolicy::Filtered,
            adopt_first_fix: false,
        }
    }
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self {
            screen_rotation: ScreenRotation::Rotation0,
            camera_upright: true,
            heading_smoothing: None,
        }
    }
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            fixed_size_scale_per_meter: FIXED_SIZE_SCALE_PER_METER,
            distant_penalty_threshold_m: DISTANT_PENALTY_THRESHOLD_M,
            distant_penalty_factor: DISTANT_PENALTY_FACTOR,
            height_adjustment: HeightAdjustment::DistanceIllusion,
            illusion_cap_m: HEIGHT_ILLUSION_CAP_M,
            illusion_gain: HEIGHT_ILLUSION_GAIN,
            horizon_from_pitch: false,
            overlap: None,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value {value} for {parameter}: {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },

    #[error("Failed to access config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize config: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn invalid(parameter: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        parameter: parameter.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl SceneConfig {
    /// Load and validate a JSON config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path_str,
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: SceneConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the config as pretty JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content).map_err(|source| ConfigError::Io {
            path: path_str,
            source,
        })
    }

    /// Check every parameter, returning the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::validate_distance_limit(self.distance_limit_m)?;
        Self::validate_refresh_interval(self.refresh_interval_ms)?;

        if let Some(displacement) = self.min_refresh_displacement_m {
            if !(displacement.is_finite() && displacement >= 0.0) {
                return Err(invalid("min_refresh_displacement_m", displacement, "must be a non-negative distance"));
            }
        }

        let loc = &self.location;
        if loc.max_fix_age_ms == 0 {
            return Err(invalid("location.max_fix_age_ms", loc.max_fix_age_ms, "must be greater than zero"));
        }
        if !(loc.minimum_accuracy_m > 0.0) {
            return Err(invalid("location.minimum_accuracy_m", loc.minimum_accuracy_m, "must be positive"));
        }
        if !(loc.divergence_threshold_m > 0.0) {
            return Err(invalid("location.divergence_threshold_m", loc.divergence_threshold_m, "must be positive"));
        }
        if !(loc.default_process_noise_mps > 0.0) {
            return Err(invalid(
                "location.default_process_noise_mps",
                loc.default_process_noise_mps,
                "must be positive",
            ));
        }

        if let Some(alpha) = self.orientation.heading_smoothing {
            if !(alpha > 0.0 && alpha <= 1.0) {
                return Err(invalid("orientation.heading_smoothing", alpha, "must be in (0, 1]"));
            }
        }

        let placement = &self.placement;
        if !(placement.fixed_size_scale_per_meter > 0.0) {
            return Err(invalid(
                "placement.fixed_size_scale_per_meter",
                placement.fixed_size_scale_per_meter,
                "must be positive",
            ));
        }
        if !(placement.distant_penalty_factor > 0.0 && placement.distant_penalty_factor <= 1.0) {
            return Err(invalid(
                "placement.distant_penalty_factor",
                placement.distant_penalty_factor,
                "must be in (0, 1]",
            ));
        }
        if placement.illusion_cap_m < 0.0 || placement.illusion_gain < 0.0 {
            return Err(invalid(
                "placement.illusion_cap_m/illusion_gain",
                format!("{}/{}", placement.illusion_cap_m, placement.illusion_gain),
                "must not be negative",
            ));
        }
        if let Some(overlap) = &placement.overlap {
            if !(overlap.raise_step_m > 0.0) {
                return Err(invalid("placement.overlap.raise_step_m", overlap.raise_step_m, "must be positive"));
            }
        }

        Ok(())
    }

    pub fn validate_distance_limit(meters: u32) -> Result<(), ConfigError> {
        if meters == 0 {
            return Err(invalid("distance_limit_m", meters, "must be at least 1 m"));
        }
        Ok(())
    }

    pub fn validate_refresh_interval(millis: u64) -> Result<(), ConfigError> {
        if millis < 100 {
            return Err(invalid("refresh_interval_ms", millis, "must be at least 100 ms"));
        }
        Ok(())
    }
}
