//! Core data types for geo-anchored AR placement

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::constants::DEFAULT_TOUCHABLE_SIZE_PX;

/// Geographic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Raw fix delivered by the platform location source.
///
/// `timestamp_millis` is read from the same monotonic base as the
/// estimator's clock (elapsed realtime), never from wall-clock time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub point: GeoPoint,
    pub horizontal_accuracy_m: f64,
    pub timestamp_millis: u64,
    pub speed_mps: f64,
    /// Name of the provider that produced the fix, if known
    #[serde(default)]
    pub provider: Option<String>,
}

impl LocationFix {
    pub fn new(point: GeoPoint, horizontal_accuracy_m: f64, timestamp_millis: u64) -> Self {
        Self {
            point,
            horizontal_accuracy_m,
            timestamp_millis,
            speed_mps: 0.0,
            provider: None,
        }
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = speed_mps;
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

/// Device orientation relative to true north
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    /// Compass heading in [0, 360), clockwise from north
    pub heading_deg: f64,
    pub pitch_deg: f64,
    pub roll_deg: f64,
}

/// Application-assigned marker identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkerId(pub u64);

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "marker#{}", self.0)
    }
}

/// How a marker's scale reacts to distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScalingMode {
    /// Grow with render distance so the marker keeps its on-screen size
    #[default]
    FixedSizeOnScreen,
    /// Unit scale regardless of distance
    NoScaling,
    /// Interpolate min..max over the distance limit, then grow with render distance
    GradualToMaxRenderDistance,
    /// Interpolate min..max against the camera-to-marker magnitude
    GradualFixedSize,
}

/// Outcome of one placement pass for a single marker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementResult {
    /// Camera-relative offset; x/z lateral (forward is -z), y vertical
    pub local_offset: Vector3<f64>,
    pub scale_factor: f64,
    /// True geographic distance, rounded to whole metres
    pub distance_m: u32,
    /// Distance actually used for the lateral offset
    pub render_distance_m: f64,
    /// Bearing relative to the camera heading, in [0, 360)
    pub marker_bearing_deg: f64,
    pub visible: bool,
}

impl PlacementResult {
    /// Placement for a marker outside its render radius
    pub fn hidden(distance_m: u32) -> Self {
        Self {
            local_offset: Vector3::zeros(),
            scale_factor: 0.0,
            distance_m,
            render_distance_m: 0.0,
            marker_bearing_deg: 0.0,
            visible: false,
        }
    }
}

/// A geo-referenced point of interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: MarkerId,
    pub geo_point: GeoPoint,
    pub height_m: f64,
    pub scale_modifier: f64,
    pub scaling_mode: ScalingMode,
    pub gradual_scale_min: f64,
    pub gradual_scale_max: f64,
    /// `None` renders at any distance
    pub only_render_within_m: Option<u32>,
    pub touchable_size_px: u32,
    /// Replaced wholesale on every successful refresh
    #[serde(skip)]
    pub placement: Option<PlacementResult>,
}

impl Marker {
    pub fn new(id: MarkerId, geo_point: GeoPoint) -> Self {
        Self {
            id,
            geo_point,
            height_m: 0.0,
            scale_modifier: 1.0,
            scaling_mode: ScalingMode::default(),
            gradual_scale_min: 0.8,
            gradual_scale_max: 1.4,
            only_render_within_m: None,
            touchable_size_px: DEFAULT_TOUCHABLE_SIZE_PX,
            placement: None,
        }
    }

    pub fn with_height(mut self, height_m: f64) -> Self {
        self.height_m = height_m;
        self
    }

    pub fn with_scale_modifier(mut self, scale_modifier: f64) -> Self {
        self.scale_modifier = scale_modifier;
        self
    }

    pub fn with_scaling_mode(mut self, mode: ScalingMode) -> Self {
        self.scaling_mode = mode;
        self
    }

    pub fn with_gradual_scale(mut self, min: f64, max: f64) -> Self {
        self.gradual_scale_min = min;
        self.gradual_scale_max = max;
        self
    }

    pub fn with_render_radius(mut self, meters: u32) -> Self {
        self.only_render_within_m = Some(meters);
        self
    }

    pub fn with_touchable_size(mut self, size_px: u32) -> Self {
        self.touchable_size_px = size_px;
        self
    }

    /// Whether the marker is currently shown
    pub fn is_visible(&self) -> bool {
        self.placement.as_ref().map_or(false, |p| p.visible)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_defaults() {
        let marker = Marker::new(MarkerId(1), GeoPoint::new(51.5, -0.12));
        assert_eq!(marker.scale_modifier, 1.0);
        assert_eq!(marker.scaling_mode, ScalingMode::FixedSizeOnScreen);
        assert!(marker.only_render_within_m.is_none());
        assert!(marker.placement.is_none());
        assert!(!marker.is_visible());
    }

    #[test]
    fn test_marker_json_skips_placement() {
        let mut marker = Marker::new(MarkerId(7), GeoPoint::new(1.0, 2.0))
            .with_render_radius(100)
            .with_scaling_mode(ScalingMode::NoScaling);
        marker.placement = Some(PlacementResult::hidden(150));

        let json = serde_json::to_string(&marker).unwrap();
        let restored: Marker = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.id, MarkerId(7));
        assert_eq!(restored.only_render_within_m, Some(100));
        assert_eq!(restored.scaling_mode, ScalingMode::NoScaling);
        assert!(restored.placement.is_none());
    }

    #[test]
    fn test_fix_builder() {
        let fix = LocationFix::new(GeoPoint::new(0.0, 0.0), 5.0, 1_000)
            .with_speed(1.5)
            .with_provider("gps");
        assert_eq!(fix.speed_mps, 1.5);
        assert_eq!(fix.provider.as_deref(), Some("gps"));
    }
}
