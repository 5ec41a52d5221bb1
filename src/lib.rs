//! Geo-anchored AR placement
//!
//! Places geo-referenced markers into a live AR camera view. GPS fixes are
//! filtered into a best location, motion sensors into a compass heading, and
//! each refresh turns every marker's latitude/longitude into a capped,
//! camera-relative anchor offset with a distance-based scale.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod sensor;
pub mod placement;
pub mod validation;
pub mod utils;
pub mod hardware;
pub mod api;

// Re-export commonly used types
pub use crate::core::{GeoPoint, LocationFix, Marker, MarkerId, Orientation, PlacementResult, ScalingMode};
pub use algorithms::{bearing, distance};
pub use processing::kalman::{FilterState, LatLongKalmanFilter};
pub use sensor::{LocationEstimator, LocationFeed, OrientationEstimator, OrientationFeed, OrientationSample, SensorAccuracy};
pub use placement::{AnchorPlacementEngine, PlacementContext, RefreshScheduler};
pub use validation::{FixRejection, GeoAnchorError, SensorKind};
pub use utils::config::SceneConfig;
pub use utils::clock::{ManualClock, MonotonicClock, SystemClock};
pub use hardware::{ArSession, CollaboratorError, LocationSource, OrientationSource, Pose, SceneGraph};
pub use api::{LocationScene, RefreshReport, SceneAdapter};
