//! Rotation matrices from raw motion sensors
//!
//! Matrices map device coordinates (x right, y towards the top of the
//! screen, z out of the screen) into world coordinates (x east, y north,
//! z up). Rows are stored the way the platform sensor APIs lay them out,
//! so `m[(0, 1)]` is row 0, column 1.

use nalgebra::{Matrix3, Vector3};

use crate::utils::config::ScreenRotation;

/// Standard gravity (m/s²)
const STANDARD_GRAVITY: f64 = 9.81;
/// Squared acceleration below which the device is treated as in free fall
const FREE_FALL_GRAVITY_SQUARED: f64 = 0.01 * STANDARD_GRAVITY * STANDARD_GRAVITY;
/// Below this |E x A| the field is too weak or parallel to gravity (e.g. near a pole)
const MIN_HORIZONTAL_FIELD: f64 = 0.1;

/// Device axis, optionally negated, used to remap a rotation matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
    MinusX,
    MinusY,
    MinusZ,
}

impl Axis {
    fn index(self) -> usize {
        match self {
            Axis::X | Axis::MinusX => 0,
            Axis::Y | Axis::MinusY => 1,
            Axis::Z | Axis::MinusZ => 2,
        }
    }

    fn is_negative(self) -> bool {
        matches!(self, Axis::MinusX | Axis::MinusY | Axis::MinusZ)
    }
}

/// Rotation matrix from a rotation-vector sample.
///
/// `vector` holds the x, y, z components of the unit quaternion. When the
/// sensor omits the scalar component it is recovered from the unit norm.
pub fn rotation_matrix_from_vector(vector: &Vector3<f64>, scalar: Option<f64>) -> Matrix3<f64> {
    let (q1, q2, q3) = (vector.x, vector.y, vector.z);
    let q0 = scalar.unwrap_or_else(|| (1.0 - q1 * q1 - q2 * q2 - q3 * q3).max(0.0).sqrt());

    let sq_q1 = 2.0 * q1 * q1;
    let sq_q2 = 2.0 * q2 * q2;
    let sq_q3 = 2.0 * q3 * q3;
    let q1_q2 = 2.0 * q1 * q2;
    let q3_q0 = 2.0 * q3 * q0;
    let q1_q3 = 2.0 * q1 * q3;
    let q2_q0 = 2.0 * q2 * q0;
    let q2_q3 = 2.0 * q2 * q3;
    let q1_q0 = 2.0 * q1 * q0;

    Matrix3::new(
        1.0 - sq_q2 - sq_q3, q1_q2 - q3_q0, q1_q3 + q2_q0,
        q1_q2 + q3_q0, 1.0 - sq_q1 - sq_q3, q2_q3 - q1_q0,
        q1_q3 - q2_q0, q2_q3 + q1_q0, 1.0 - sq_q1 - sq_q2,
    )
}

/// Rotation matrix from gravity and geomagnetic readings.
///
/// Returns `None` when the device is in free fall or the field is too weak
/// to give a horizontal reference.
pub fn rotation_matrix_from_gravity(gravity: &Vector3<f64>, geomagnetic: &Vector3<f64>) -> Option<Matrix3<f64>> {
    if gravity.norm_squared() < FREE_FALL_GRAVITY_SQUARED {
        return None;
    }

    let east = geomagnetic.cross(gravity);
    let east_norm = east.norm();
    if east_norm < MIN_HORIZONTAL_FIELD {
        return None;
    }

    let east = east / east_norm;
    let up = gravity.normalize();
    let north = up.cross(&east);

    Some(Matrix3::from_rows(&[east.transpose(), north.transpose(), up.transpose()]))
}

/// Express `rotation` in a coordinate system whose x and y axes are the
/// given device axes. Returns `None` when both name the same axis.
pub fn remap_coordinate_system(rotation: &Matrix3<f64>, x_axis: Axis, y_axis: Axis) -> Option<Matrix3<f64>> {
    let x = x_axis.index();
    let y = y_axis.index();
    if x == y {
        return None;
    }

    let z = 3 - x - y;
    let sx = x_axis.is_negative();
    let sy = y_axis.is_negative();
    // Keep the result right-handed
    let cyclic = x == (z + 1) % 3 && y == (z + 2) % 3;
    let sz = (sx ^ sy) ^ !cyclic;

    let sign = |negative: bool| if negative { -1.0 } else { 1.0 };
    let mut out = Matrix3::zeros();
    for row in 0..3 {
        out[(row, x)] = sign(sx) * rotation[(row, 0)];
        out[(row, y)] = sign(sy) * rotation[(row, 1)];
        out[(row, z)] = sign(sz) * rotation[(row, 2)];
    }
    Some(out)
}

/// Axis pair that undoes a screen rotation relative to the natural orientation
pub fn screen_remap_axes(rotation: ScreenRotation) -> (Axis, Axis) {
    match rotation {
        ScreenRotation::Rotation0 => (Axis::X, Axis::Y),
        ScreenRotation::Rotation90 => (Axis::Y, Axis::MinusX),
        ScreenRotation::Rotation180 => (Axis::MinusX, Axis::MinusY),
        ScreenRotation::Rotation270 => (Axis::MinusY, Axis::X),
    }
}

/// Azimuth, pitch and roll in radians.
///
/// Azimuth is measured clockwise from north about the world up axis.
pub fn orientation_angles(rotation: &Matrix3<f64>) -> (f64, f64, f64) {
    let azimuth = rotation[(0, 1)].atan2(rotation[(1, 1)]);
    let pitch = (-rotation[(2, 1)]).clamp(-1.0, 1.0).asin();
    let roll = (-rotation[(2, 0)]).atan2(rotation[(2, 2)]);
    (azimuth, pitch, roll)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_1_SQRT_2, FRAC_PI_2};

    #[test]
    fn test_zero_rotation_vector_is_identity() {
        let m = rotation_matrix_from_vector(&Vector3::zeros(), None);
        assert_relative_eq!(m, Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_rotation_vector_about_up_axis() {
        // Device turned 90 degrees counter-clockwise seen from above: top points west
        let m = rotation_matrix_from_vector(&Vector3::new(0.0, 0.0, FRAC_1_SQRT_2), Some(FRAC_1_SQRT_2));
        let (azimuth, pitch, roll) = orientation_angles(&m);
        assert_relative_eq!(azimuth, -FRAC_PI_2, epsilon = 1e-9);
        assert_relative_eq!(pitch, 0.0, epsilon = 1e-9);
        assert_relative_eq!(roll, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rotation_from_gravity_flat_facing_north() {
        let gravity = Vector3::new(0.0, 0.0, 9.81);
        let field = Vector3::new(0.0, 22.0, -40.0);
        let m = rotation_matrix_from_gravity(&gravity, &field).unwrap();
        assert_relative_eq!(m, Matrix3::identity(), epsilon = 1e-9);
    }

    #[test]
    fn test_rotation_from_gravity_rejects_free_fall_and_weak_field() {
        let field = Vector3::new(0.0, 22.0, -40.0);
        assert!(rotation_matrix_from_gravity(&Vector3::new(0.0, 0.0, 0.5), &field).is_none());
        assert!(rotation_matrix_from_gravity(&Vector3::new(0.0, 0.0, 9.81), &Vector3::new(0.0, 0.0, -40.0)).is_none());
    }

    #[test]
    fn test_remap_rejects_same_axis() {
        assert!(remap_coordinate_system(&Matrix3::identity(), Axis::X, Axis::MinusX).is_none());
    }

    #[test]
    fn test_remap_identity_axes() {
        let m = rotation_matrix_from_vector(&Vector3::new(0.1, 0.2, 0.3), None);
        let out = remap_coordinate_system(&m, Axis::X, Axis::Y).unwrap();
        assert_relative_eq!(out, m, epsilon = 1e-12);
    }

    #[test]
    fn test_upright_camera_heading() {
        // Held upright, camera facing east: device x points south, y up, z west
        let device = Matrix3::from_columns(&[
            Vector3::new(0.0, -1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(-1.0, 0.0, 0.0),
        ]);
        let camera = remap_coordinate_system(&device, Axis::X, Axis::Z).unwrap();
        let (azimuth, pitch, _) = orientation_angles(&camera);
        assert_relative_eq!(azimuth, FRAC_PI_2, epsilon = 1e-9);
        assert_relative_eq!(pitch, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_remap_keeps_rotation_proper() {
        let m = rotation_matrix_from_vector(&Vector3::new(0.2, -0.1, 0.4), None);
        for rotation in [
            ScreenRotation::Rotation0,
            ScreenRotation::Rotation90,
            ScreenRotation::Rotation180,
            ScreenRotation::Rotation270,
        ] {
            let (x, y) = screen_remap_axes(rotation);
            let out = remap_coordinate_system(&m, x, y).unwrap();
            assert_relative_eq!(out.determinant(), 1.0, epsilon = 1e-9);
        }
    }
}
