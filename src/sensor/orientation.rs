//! Device orientation estimation

use log::{debug, info, warn};
use nalgebra::{Matrix3, Vector3};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::algorithms::normalize_degrees;
use crate::core::Orientation;
use crate::sensor::rotation::{
    orientation_angles, remap_coordinate_system, rotation_matrix_from_gravity, rotation_matrix_from_vector,
    screen_remap_axes, Axis,
};
use crate::utils::config::OrientationConfig;

/// Raw sample pushed by the platform orientation source
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrientationSample {
    /// Rotation vector; `scalar` is absent on sensors reporting only x, y, z
    RotationVector { vector: Vector3<f64>, scalar: Option<f64> },
    /// Gravity as measured by the accelerometer (m/s²)
    Accelerometer(Vector3<f64>),
    /// Geomagnetic field (µT)
    MagneticField(Vector3<f64>),
}

/// Accuracy status reported by the platform sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SensorAccuracy {
    Unreliable,
    Low,
    Medium,
    #[default]
    High,
}

impl SensorAccuracy {
    pub fn is_reliable(self) -> bool {
        self != SensorAccuracy::Unreliable
    }
}

/// Turns raw samples into a heading relative to true north
#[derive(Debug, Clone)]
pub struct OrientationEstimator {
    config: OrientationConfig,
    current: Option<Orientation>,
    accuracy: SensorAccuracy,
    pending_gravity: Option<Vector3<f64>>,
    pending_magnetic: Option<Vector3<f64>>,
}

impl OrientationEstimator {
    pub fn new(config: OrientationConfig) -> Self {
        Self {
            config,
            current: None,
            accuracy: SensorAccuracy::default(),
            pending_gravity: None,
            pending_magnetic: None,
        }
    }

    /// Latest orientation, if any sample has been accepted
    pub fn current(&self) -> Option<Orientation> {
        self.current
    }

    pub fn accuracy(&self) -> SensorAccuracy {
        self.accuracy
    }

    pub fn config(&self) -> &OrientationConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: OrientationConfig) {
        self.config = config;
    }

    /// Record a sensor accuracy change. While unreliable, samples are
    /// ignored and the last heading is retained.
    pub fn on_accuracy_changed(&mut self, accuracy: SensorAccuracy) {
        if accuracy == self.accuracy {
            return;
        }
        if accuracy.is_reliable() {
            info!("Orientation sensor accuracy now {:?}", accuracy);
        } else {
            warn!("Orientation sensor reports unreliable accuracy, keeping last heading");
        }
        self.accuracy = accuracy;
    }

    /// Process one sample. Returns the new orientation when the sample
    /// produced one.
    pub fn on_sample(&mut self, sample: OrientationSample) -> Option<Orientation> {
        if !self.accuracy.is_reliable() {
            debug!("Ignoring orientation sample while accuracy is unreliable");
            return None;
        }

        let rotation = match sample {
            OrientationSample::RotationVector { vector, scalar } => rotation_matrix_from_vector(&vector, scalar),
            OrientationSample::Accelerometer(gravity) => {
                self.pending_gravity = Some(gravity);
                self.combine_pending()?
            }
            OrientationSample::MagneticField(field) => {
                self.pending_magnetic = Some(field);
                self.combine_pending()?
            }
        };

        let orientation = self.extract(&rotation)?;
        let orientation = match (self.config.heading_smoothing, self.current) {
            (Some(alpha), Some(previous)) => smooth(&previous, &orientation, alpha),
            _ => orientation,
        };
        self.current = Some(orientation);
        Some(orientation)
    }

    /// Combine cached accelerometer and magnetometer readings once both are present
    fn combine_pending(&mut self) -> Option<Matrix3<f64>> {
        let (gravity, field) = (self.pending_gravity?, self.pending_magnetic?);
        self.pending_gravity = None;
        self.pending_magnetic = None;

        let rotation = rotation_matrix_from_gravity(&gravity, &field);
        if rotation.is_none() {
            debug!("Discarding accelerometer/magnetometer pair: free fall or weak field");
        }
        rotation
    }

    fn extract(&self, rotation: &Matrix3<f64>) -> Option<Orientation> {
        let (x, y) = screen_remap_axes(self.config.screen_rotation);
        let mut remapped = remap_coordinate_system(rotation, x, y)?;
        if self.config.camera_upright {
            remapped = remap_coordinate_system(&remapped, Axis::X, Axis::Z)?;
        }

        let (azimuth, pitch, roll) = orientation_angles(&remapped);
        Some(Orientation {
            heading_deg: normalize_degrees(azimuth.to_degrees()),
            pitch_deg: pitch.to_degrees(),
            roll_deg: roll.to_degrees(),
        })
    }

    /// Drop the current orientation and any half-received sensor pair
    pub fn reset(&mut self) {
        self.current = None;
        self.pending_gravity = None;
        self.pending_magnetic = None;
    }
}

/// Low-pass filter; heading is blended along the shorter arc
fn smooth(previous: &Orientation, sample: &Orientation, alpha: f64) -> Orientation {
    let delta = (sample.heading_deg - previous.heading_deg + 540.0).rem_euclid(360.0) - 180.0;
    Orientation {
        heading_deg: normalize_degrees(previous.heading_deg + alpha * delta),
        pitch_deg: previous.pitch_deg + alpha * (sample.pitch_deg - previous.pitch_deg),
        roll_deg: previous.roll_deg + alpha * (sample.roll_deg - previous.roll_deg),
    }
}

/// Handle given to the orientation source; safe to call from the sensor thread.
///
/// Heading changes never mark the scheduler dirty. They take effect on the
/// next scheduled pass.
#[derive(Clone)]
pub struct OrientationFeed {
    estimator: Arc<Mutex<OrientationEstimator>>,
}

impl OrientationFeed {
    pub fn new(estimator: Arc<Mutex<OrientationEstimator>>) -> Self {
        Self { estimator }
    }

    pub fn on_sample(&self, sample: OrientationSample) {
        self.estimator.lock().on_sample(sample);
    }

    pub fn on_accuracy_changed(&self, accuracy: SensorAccuracy) {
        self.estimator.lock().on_accuracy_changed(accuracy);
    }

    /// Latest heading, for hosts displaying a compass
    pub fn current(&self) -> Option<Orientation> {
        self.estimator.lock().current()
    }
}
