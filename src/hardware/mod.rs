//! Contracts for the external collaborators
//!
//! The placement core never talks to a renderer, an AR tracker or a platform
//! sensor API directly. Hosts implement these traits; `mock` provides
//! recording implementations for tests and desktop runs.

pub mod error;
pub mod mock;

pub use error::{CollaboratorError, CollaboratorResult};
pub use mock::{MockArSession, MockLocationSource, MockOrientationSource, MockSceneGraph};

use nalgebra::{UnitQuaternion, Vector3};

use crate::core::MarkerId;
use crate::sensor::{LocationFeed, OrientationFeed};

/// Rigid transform in AR world space (metres, y up, camera looks down -z)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn new(position: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }

    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Vector3::new(x, y, z),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Apply `other` in this pose's local frame
    pub fn compose(&self, other: &Pose) -> Pose {
        Pose {
            position: self.position + self.rotation * other.position,
            rotation: self.rotation * other.rotation,
        }
    }

    /// Direction the pose looks along (its -z axis)
    pub fn forward(&self) -> Vector3<f64> {
        self.rotation * Vector3::new(0.0, 0.0, -1.0)
    }

    /// Rotation about world up only, discarding pitch and roll
    pub fn yaw_rotation(&self) -> UnitQuaternion<f64> {
        let fwd = self.forward();
        if fwd.x.abs() < 1e-9 && fwd.z.abs() < 1e-9 {
            return UnitQuaternion::identity();
        }
        let yaw = (-fwd.x).atan2(-fwd.z);
        UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw)
    }
}

/// Opaque handle to a world anchor owned by the AR session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnchorHandle(pub u64);

/// Opaque handle to a scene graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(pub u64);

/// Ray in world space used for occlusion tests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vector3<f64>,
    pub direction: Vector3<f64>,
}

/// One node hit by a ray, nearest first when returned from `hit_test_all`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitResult {
    pub marker: MarkerId,
    pub distance_m: f64,
}

/// AR tracking session supplying the camera pose and world anchors
pub trait ArSession {
    /// Pose of the camera for the current frame
    fn camera_pose(&self) -> CollaboratorResult<Pose>;

    /// Create a tracked anchor at `pose`
    fn create_world_anchor(&mut self, pose: &Pose) -> CollaboratorResult<AnchorHandle>;

    /// Current (possibly refined) pose of an anchor
    fn anchor_pose(&self, anchor: AnchorHandle) -> CollaboratorResult<Pose>;

    fn release_anchor(&mut self, anchor: AnchorHandle);
}

/// Host scene graph holding the visual nodes for each marker
pub trait SceneGraph {
    /// Attach the marker's visual node under an anchor
    fn attach_node(&mut self, anchor: AnchorHandle, marker: MarkerId) -> CollaboratorResult<NodeHandle>;

    fn set_node_local_transform(
        &mut self,
        node: NodeHandle,
        position: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
        scale: f64,
    ) -> CollaboratorResult<()>;

    fn remove_node(&mut self, node: NodeHandle);

    /// All marker nodes hit by `ray`, nearest first. Scenes without hit
    /// testing return nothing, which disables overlap mitigation.
    fn hit_test_all(&self, _ray: &Ray) -> Vec<HitResult> {
        Vec::new()
    }
}

/// Platform location provider pushing raw fixes
pub trait LocationSource {
    fn start(&mut self, feed: LocationFeed) -> CollaboratorResult<()>;
    fn stop(&mut self);
}

/// Platform orientation provider pushing raw sensor samples
pub trait OrientationSource {
    fn start(&mut self, feed: OrientationFeed) -> CollaboratorResult<()>;
    fn stop(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_pose_compose_translation() {
        let camera = Pose::from_translation(1.0, 1.5, 2.0);
        let offset = Pose::from_translation(0.0, 0.0, -5.0);
        let world = camera.compose(&offset);
        assert_relative_eq!(world.position, Vector3::new(1.0, 1.5, -3.0), epsilon = 1e-12);
    }

    #[test]
    fn test_yaw_rotation_ignores_pitch() {
        // Turned 90 degrees left, then pitched down
        let yaw = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2);
        let pitch = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -0.4);
        let camera = Pose::new(Vector3::zeros(), yaw * pitch);

        let flat = camera.yaw_rotation();
        let fwd = flat * Vector3::new(0.0, 0.0, -1.0);
        assert_relative_eq!(fwd, Vector3::new(-1.0, 0.0, 0.0), epsilon = 1e-9);
    }
}
