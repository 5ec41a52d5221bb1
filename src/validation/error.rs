//! Error taxonomy for geo-anchored placement
//!
//! Nothing here is fatal to the host. Rejected fixes are dropped, failed
//! anchors leave the previous placement in place, and tracking loss skips a
//! single pass. Every variant degrades to "marker not (yet) placed".

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::MarkerId;
use crate::utils::config::ConfigError;

/// Which platform sensor a failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    Location,
    Orientation,
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorKind::Location => write!(f, "location"),
            SensorKind::Orientation => write!(f, "orientation"),
        }
    }
}

/// Top-level error for the placement pipeline
#[derive(Debug, Error)]
pub enum GeoAnchorError {
    #[error("No {sensor} provider is available")]
    SensorUnavailable { sensor: SensorKind },

    #[error("Could not create an anchor for {marker}: {reason}")]
    AnchorCreation { marker: MarkerId, reason: String },

    #[error("Could not read the pose of the anchor for {marker}")]
    PoseUnavailable { marker: MarkerId },

    #[error("AR tracking is lost")]
    TrackingLost,

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Reasons a location fix was not accepted
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FixRejection {
    #[error("Fix is {age_ms} ms old (max {max_age_ms} ms)")]
    Stale { age_ms: u64, max_age_ms: u64 },

    #[error("Fix is stamped {ahead_ms} ms after the current time (max {max_skew_ms} ms)")]
    FromFuture { ahead_ms: u64, max_skew_ms: u64 },

    #[error("Fix reports an invalid accuracy of {accuracy_m} m")]
    InvalidAccuracy { accuracy_m: f64 },

    #[error("Fix accuracy {accuracy_m} m is worse than the {minimum_m} m minimum")]
    Inaccurate { accuracy_m: f64, minimum_m: f64 },

    #[error("Filtered estimate moved {delta_m:.1} m from the fix ({consecutive} in a row)")]
    Divergent { delta_m: f64, consecutive: u32 },

    #[error("Fix is not better than the current best location")]
    NotBetter,
}

impl FixRejection {
    /// Short label used in debug output
    pub fn label(&self) -> &'static str {
        match self {
            FixRejection::Stale { .. } => "old",
            FixRejection::FromFuture { .. } => "future",
            FixRejection::InvalidAccuracy { .. } => "invalid",
            FixRejection::Inaccurate { .. } => "inaccurate",
            FixRejection::Divergent { .. } => "kalman filter",
            FixRejection::NotBetter => "not better",
        }
    }
}
