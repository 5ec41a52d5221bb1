//! Geographic offset to camera-relative placement
//!
//! The engine is pure computation: it turns a marker plus the current device
//! state into a `PlacementResult`. Materialising anchors and nodes is left to
//! `api::adapter::SceneAdapter`.

use log::trace;
use nalgebra::Vector3;

use crate::algorithms::{bearing, distance, normalize_degrees};
use crate::core::{GeoPoint, Marker, Orientation, PlacementResult, ScalingMode};
use crate::utils::config::{HeightAdjustment, PlacementConfig};

/// Device state shared by every marker in one pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementContext {
    pub device_location: GeoPoint,
    pub orientation: Orientation,
    /// Camera height in AR world space (m)
    pub camera_height_m: f64,
    pub bearing_adjustment_deg: i32,
    pub distance_limit_m: u32,
}

/// Computes marker placements
#[derive(Debug, Clone, Default)]
pub struct AnchorPlacementEngine {
    config: PlacementConfig,
}

impl AnchorPlacementEngine {
    pub fn new(config: PlacementConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: PlacementConfig) {
        self.config = config;
    }

    /// Placement of one marker for the given device state
    pub fn compute_placement(&self, marker: &Marker, ctx: &PlacementContext) -> PlacementResult {
        let geo_distance = distance(&marker.geo_point, &ctx.device_location);
        let distance_m = geo_distance.round() as u32;

        if let Some(radius) = marker.only_render_within_m {
            if geo_distance > f64::from(radius) {
                trace!("{} is {:.0} m away, outside its {} m radius", marker.id, geo_distance, radius);
                return PlacementResult::hidden(distance_m);
            }
        }

        let raw_bearing = bearing(&ctx.device_location, &marker.geo_point);
        let marker_bearing = relative_bearing(raw_bearing, ctx.orientation.heading_deg, ctx.bearing_adjustment_deg);
        let render_distance = render_distance(geo_distance, ctx.distance_limit_m);

        let theta = marker_bearing.to_radians();
        let x = -render_distance * theta.sin();
        let z = -render_distance * theta.cos();
        let rise = marker.height_m + self.height_adjustment(geo_distance, render_distance, ctx.orientation.pitch_deg);
        let local_offset = Vector3::new(x, ctx.camera_height_m + rise, z);

        // Camera-to-marker vector, relative to the camera height
        let to_marker = Vector3::new(x, rise, z);
        let scale_factor =
            self.scale_factor(marker, geo_distance, render_distance, ctx.distance_limit_m, to_marker.norm());

        trace!(
            "{}: {:.1} m (render {:.1} m) at {:.1} deg, scale {:.3}",
            marker.id,
            geo_distance,
            render_distance,
            marker_bearing,
            scale_factor
        );

        PlacementResult {
            local_offset,
            scale_factor,
            distance_m,
            render_distance_m: render_distance,
            marker_bearing_deg: marker_bearing,
            visible: true,
        }
    }

    /// Vertical nudge applied on top of the camera height and marker height
    pub fn height_adjustment(&self, geo_distance: f64, render_distance: f64, pitch_deg: f64) -> f64 {
        let mut adjustment = 0.0;

        if self.config.horizon_from_pitch {
            adjustment += (render_distance * pitch_deg.to_radians().tan()).round();
        }

        // Capped markers are raised slightly so they read as further away
        if self.config.height_adjustment == HeightAdjustment::DistanceIllusion && render_distance < geo_distance {
            let capped = geo_distance.min(self.config.illusion_cap_m);
            adjustment += self.config.illusion_gain * (capped - render_distance).max(0.0);
        }

        adjustment
    }

    /// Scale for the marker's scaling mode, including its scale modifier
    pub fn scale_factor(
        &self,
        marker: &Marker,
        geo_distance: f64,
        render_distance: f64,
        distance_limit_m: u32,
        camera_distance: f64,
    ) -> f64 {
        let scale = match marker.scaling_mode {
            ScalingMode::FixedSizeOnScreen => {
                let mut scale = render_distance * self.config.fixed_size_scale_per_meter;
                if geo_distance > self.config.distant_penalty_threshold_m {
                    scale *= self.config.distant_penalty_factor;
                }
                scale
            }
            ScalingMode::NoScaling => 1.0,
            ScalingMode::GradualToMaxRenderDistance => {
                gradual_factor(marker, geo_distance, distance_limit_m) * render_distance
            }
            ScalingMode::GradualFixedSize => {
                let screen_facing = camera_distance * self.config.fixed_size_scale_per_meter;
                (screen_facing * gradual_factor(marker, geo_distance, distance_limit_m)).max(marker.gradual_scale_min)
            }
        };
        scale * marker.scale_modifier
    }
}

/// Bearing of the marker relative to where the camera is pointing, in [0, 360)
pub fn relative_bearing(raw_bearing_deg: f64, heading_deg: f64, adjustment_deg: i32) -> f64 {
    normalize_degrees(raw_bearing_deg - heading_deg + f64::from(adjustment_deg))
}

/// Distance used for the lateral offset, capped at the distance limit
pub fn render_distance(geo_distance: f64, distance_limit_m: u32) -> f64 {
    geo_distance.min(f64::from(distance_limit_m))
}

/// Interpolate from `gradual_scale_max` at the device to `gradual_scale_min`
/// at the distance limit and beyond
fn gradual_factor(marker: &Marker, geo_distance: f64, distance_limit_m: u32) -> f64 {
    let t = if distance_limit_m == 0 {
        1.0
    } else {
        (geo_distance / f64::from(distance_limit_m)).clamp(0.0, 1.0)
    };
    marker.gradual_scale_max - (marker.gradual_scale_max - marker.gradual_scale_min) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MarkerId;
    use approx::assert_relative_eq;

    const METERS_PER_DEGREE: f64 = 111_194.93;

    fn context(limit: u32) -> PlacementContext {
        PlacementContext {
            device_location: GeoPoint::new(0.0, 0.0),
            orientation: Orientation::default(),
            camera_height_m: 0.0,
            bearing_adjustment_deg: 0,
            distance_limit_m: limit,
        }
    }

    fn north(meters: f64) -> Marker {
        Marker::new(MarkerId(1), GeoPoint::new(meters / METERS_PER_DEGREE, 0.0))
    }

    #[test]
    fn test_capped_marker_due_north() {
        let engine = AnchorPlacementEngine::default();
        let marker = Marker::new(MarkerId(1), GeoPoint::new(0.001, 0.0));
        let result = engine.compute_placement(&marker, &context(50));

        assert!(result.visible);
        assert_eq!(result.distance_m, 111);
        assert_relative_eq!(result.render_distance_m, 50.0);
        assert_relative_eq!(result.marker_bearing_deg, 0.0, epsilon = 1e-9);
        assert_relative_eq!(result.local_offset.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(result.local_offset.z, -50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bearing_adjustment_rotates_offset() {
        let engine = AnchorPlacementEngine::default();
        let marker = Marker::new(MarkerId(2), GeoPoint::new(0.0, 0.001));
        let ctx = PlacementContext {
            bearing_adjustment_deg: 10,
            ..context(50)
        };
        let result = engine.compute_placement(&marker, &ctx);

        assert_relative_eq!(result.marker_bearing_deg, 100.0, epsilon = 1e-6);
        let theta = 100f64.to_radians();
        assert_relative_eq!(result.local_offset.x, -50.0 * theta.sin(), epsilon = 1e-6);
        assert_relative_eq!(result.local_offset.z, -50.0 * theta.cos(), epsilon = 1e-6);
    }

    #[test]
    fn test_heading_subtracted_from_bearing() {
        assert_relative_eq!(relative_bearing(10.0, 30.0, 0), 340.0);
        assert_relative_eq!(relative_bearing(350.0, 0.0, 15), 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_render_distance_capped_only_beyond_limit() {
        let engine = AnchorPlacementEngine::default();

        let near = engine.compute_placement(&north(22.0), &context(50));
        assert_relative_eq!(near.render_distance_m, 22.0, epsilon = 1e-3);
        assert_relative_eq!(near.local_offset.y, 0.0);

        let far = engine.compute_placement(&north(400.0), &context(50));
        assert_relative_eq!(far.render_distance_m, 50.0);
    }

    #[test]
    fn test_fixed_size_scale_is_linear_in_render_distance() {
        let engine = AnchorPlacementEngine::default();
        let a = engine.compute_placement(&north(10.0), &context(100));
        let b = engine.compute_placement(&north(20.0), &context(100));

        assert_relative_eq!(a.scale_factor, a.render_distance_m * 0.5, epsilon = 1e-9);
        assert_relative_eq!(b.scale_factor / a.scale_factor, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_distant_penalty_and_modifier() {
        let engine = AnchorPlacementEngine::default();
        let marker = north(3_500.0).with_scale_modifier(2.0);
        let result = engine.compute_placement(&marker, &context(50));
        assert_relative_eq!(result.scale_factor, 50.0 * 0.5 * 0.75 * 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_visibility_gate() {
        let engine = AnchorPlacementEngine::default();
        let marker = north(150.0).with_render_radius(100);
        let result = engine.compute_placement(&marker, &context(50));
        assert!(!result.visible);
        assert_eq!(result.distance_m, 150);

        let inside = north(90.0).with_render_radius(100);
        assert!(engine.compute_placement(&inside, &context(50)).visible);
    }

    #[test]
    fn test_no_scaling_mode() {
        let engine = AnchorPlacementEngine::default();
        let marker = north(40.0).with_scaling_mode(ScalingMode::NoScaling);
        assert_relative_eq!(engine.compute_placement(&marker, &context(50)).scale_factor, 1.0);
    }

    #[test]
    fn test_gradual_to_max_render_distance() {
        let engine = AnchorPlacementEngine::default();
        let marker = north(25.0)
            .with_scaling_mode(ScalingMode::GradualToMaxRenderDistance)
            .with_gradual_scale(0.8, 1.4);
        let result = engine.compute_placement(&marker, &context(50));
        // Halfway to the limit: factor 1.1
        assert_relative_eq!(result.scale_factor, 1.1 * result.render_distance_m, epsilon = 1e-3);

        let beyond = north(200.0)
            .with_scaling_mode(ScalingMode::GradualToMaxRenderDistance)
            .with_gradual_scale(0.8, 1.4);
        assert_relative_eq!(engine.compute_placement(&beyond, &context(50)).scale_factor, 0.8 * 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_gradual_fixed_size_floored_at_min() {
        let engine = AnchorPlacementEngine::default();
        let marker = north(1.0)
            .with_scaling_mode(ScalingMode::GradualFixedSize)
            .with_gradual_scale(0.8, 1.4);
        let result = engine.compute_placement(&marker, &context(50));
        assert_relative_eq!(result.scale_factor, 0.8);

        let far = north(40.0)
            .with_scaling_mode(ScalingMode::GradualFixedSize)
            .with_gradual_scale(0.8, 1.4);
        let result = engine.compute_placement(&far, &context(50));
        let factor = 1.4 - 0.6 * (40.0 / 50.0);
        assert_relative_eq!(result.scale_factor, 40.0 * 0.5 * factor, epsilon = 1e-3);
    }

    #[test]
    fn test_height_illusion_is_capped() {
        let engine = AnchorPlacementEngine::default();
        assert_relative_eq!(engine.height_adjustment(30.0, 30.0, 0.0), 0.0);
        assert_relative_eq!(engine.height_adjustment(150.0, 50.0, 0.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(engine.height_adjustment(5_000.0, 50.0, 0.0), 4.5, epsilon = 1e-12);

        let flat = AnchorPlacementEngine::new(PlacementConfig {
            height_adjustment: HeightAdjustment::None,
            ..PlacementConfig::default()
        });
        assert_relative_eq!(flat.height_adjustment(5_000.0, 50.0, 0.0), 0.0);
    }

    #[test]
    fn test_horizon_from_pitch() {
        let engine = AnchorPlacementEngine::new(PlacementConfig {
            horizon_from_pitch: true,
            height_adjustment: HeightAdjustment::None,
            ..PlacementConfig::default()
        });
        assert_relative_eq!(engine.height_adjustment(50.0, 50.0, 45.0), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_vertical_offset_includes_camera_and_marker_height() {
        let engine = AnchorPlacementEngine::default();
        let ctx = PlacementContext {
            camera_height_m: 1.5,
            ..context(50)
        };
        let result = engine.compute_placement(&north(20.0).with_height(2.0), &ctx);
        assert_relative_eq!(result.local_offset.y, 3.5, epsilon = 1e-9);
    }
}
