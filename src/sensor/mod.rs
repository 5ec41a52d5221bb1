//! Location and orientation estimators fed by platform sensors

pub mod location;
pub mod orientation;
pub mod rotation;

pub use location::{is_better_fix, LocationEstimator, LocationFeed};
pub use orientation::{OrientationEstimator, OrientationFeed, OrientationSample, SensorAccuracy};
pub use rotation::Axis;
