//! Applies placement results to the host AR session and scene graph
//!
//! One world anchor and one node are kept per placed marker. A new anchor is
//! created before the old one is released, so a failed refresh leaves the
//! previous placement on screen.

use log::{debug, trace};
use nalgebra::{UnitQuaternion, Vector3};
use std::collections::HashMap;

use crate::core::{MarkerId, PlacementResult};
use crate::hardware::{AnchorHandle, ArSession, CollaboratorError, NodeHandle, Pose, Ray, SceneGraph};
use crate::utils::config::OverlapConfig;
use crate::validation::GeoAnchorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MarkerBinding {
    anchor: AnchorHandle,
    node: NodeHandle,
}

/// Bookkeeping between markers and their anchors and nodes
#[derive(Debug, Default)]
pub struct SceneAdapter {
    bindings: HashMap<MarkerId, MarkerBinding>,
    overlap: Option<OverlapConfig>,
}

impl SceneAdapter {
    pub fn new(overlap: Option<OverlapConfig>) -> Self {
        Self {
            bindings: HashMap::new(),
            overlap,
        }
    }

    pub fn set_overlap(&mut self, overlap: Option<OverlapConfig>) {
        self.overlap = overlap;
    }

    pub fn is_anchored(&self, marker: MarkerId) -> bool {
        self.bindings.contains_key(&marker)
    }

    pub fn anchored_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn anchor_of(&self, marker: MarkerId) -> Option<AnchorHandle> {
        self.bindings.get(&marker).map(|b| b.anchor)
    }

    pub fn node_of(&self, marker: MarkerId) -> Option<NodeHandle> {
        self.bindings.get(&marker).map(|b| b.node)
    }

    /// Materialise a visible placement. Returns the placement actually
    /// applied, which overlap mitigation may have raised or hidden.
    pub fn apply(
        &mut self,
        session: &mut dyn ArSession,
        graph: &mut dyn SceneGraph,
        camera: &Pose,
        marker: MarkerId,
        placement: &PlacementResult,
    ) -> Result<PlacementResult, GeoAnchorError> {
        let mut applied = placement.clone();
        let mut world = world_position(camera, &applied.local_offset);

        if let Some(overlap) = self.overlap.clone() {
            let mut raises = 0;
            while is_occluded(graph, camera, marker, &world) {
                if raises == overlap.max_raise_steps {
                    debug!("{} stays occluded after {} raises, hiding it", marker, raises);
                    self.release(session, graph, marker);
                    return Ok(PlacementResult::hidden(applied.distance_m));
                }
                raises += 1;
                applied.local_offset.y += overlap.raise_step_m;
                world.y += overlap.raise_step_m;
            }
            if raises > 0 {
                trace!("{} raised {} step(s) to clear overlap", marker, raises);
            }
        }

        let anchor = session
            .create_world_anchor(&Pose::new(world, UnitQuaternion::identity()))
            .map_err(|e| anchor_error(marker, e))?;

        let anchor_pose = match session.anchor_pose(anchor) {
            Ok(pose) => pose,
            Err(e) => {
                session.release_anchor(anchor);
                return Err(match e {
                    CollaboratorError::TrackingLost => GeoAnchorError::TrackingLost,
                    _ => GeoAnchorError::PoseUnavailable { marker },
                });
            }
        };

        let node = match graph.attach_node(anchor, marker) {
            Ok(node) => node,
            Err(e) => {
                session.release_anchor(anchor);
                return Err(anchor_error(marker, e));
            }
        };

        let rotation = billboard_rotation(&anchor_pose.position, &camera.position);
        if let Err(e) = graph.set_node_local_transform(node, Vector3::zeros(), rotation, applied.scale_factor) {
            graph.remove_node(node);
            session.release_anchor(anchor);
            return Err(anchor_error(marker, e));
        }

        if let Some(previous) = self.bindings.insert(marker, MarkerBinding { anchor, node }) {
            graph.remove_node(previous.node);
            session.release_anchor(previous.anchor);
        }

        Ok(applied)
    }

    /// Drop the marker's anchor and node, if it has them
    pub fn release(&mut self, session: &mut dyn ArSession, graph: &mut dyn SceneGraph, marker: MarkerId) {
        if let Some(binding) = self.bindings.remove(&marker) {
            graph.remove_node(binding.node);
            session.release_anchor(binding.anchor);
        }
    }

    pub fn release_all(&mut self, session: &mut dyn ArSession, graph: &mut dyn SceneGraph) {
        for (_, binding) in self.bindings.drain() {
            graph.remove_node(binding.node);
            session.release_anchor(binding.anchor);
        }
    }

    /// Turn every node to face the camera. Run once per frame; nodes whose
    /// anchor pose cannot be read keep their last rotation.
    pub fn update_billboards(
        &self,
        session: &dyn ArSession,
        graph: &mut dyn SceneGraph,
        camera: &Pose,
        scale_of: impl Fn(MarkerId) -> f64,
    ) {
        for (marker, binding) in &self.bindings {
            let Ok(anchor_pose) = session.anchor_pose(binding.anchor) else {
                trace!("Skipping billboard for {}: pose unavailable", marker);
                continue;
            };
            let rotation = billboard_rotation(&anchor_pose.position, &camera.position);
            let scale = scale_of(*marker);
            if let Err(e) = graph.set_node_local_transform(binding.node, Vector3::zeros(), rotation, scale) {
                debug!("Billboard update for {} failed: {}", marker, e);
            }
        }
    }
}

/// World position of a camera-relative offset. Only the camera's yaw is
/// applied; the vertical component is already absolute.
pub fn world_position(camera: &Pose, local_offset: &Vector3<f64>) -> Vector3<f64> {
    let lateral = camera.yaw_rotation() * Vector3::new(local_offset.x, 0.0, local_offset.z);
    Vector3::new(camera.position.x + lateral.x, local_offset.y, camera.position.z + lateral.z)
}

/// Yaw-only rotation pointing a node's forward (-z) axis at the camera
pub fn billboard_rotation(node: &Vector3<f64>, camera: &Vector3<f64>) -> UnitQuaternion<f64> {
    let dx = camera.x - node.x;
    let dz = camera.z - node.z;
    if dx.abs() < 1e-9 && dz.abs() < 1e-9 {
        return UnitQuaternion::identity();
    }
    UnitQuaternion::from_axis_angle(&Vector3::y_axis(), (-dx).atan2(-dz))
}

fn is_occluded(graph: &dyn SceneGraph, camera: &Pose, marker: MarkerId, target: &Vector3<f64>) -> bool {
    let to_target = target - camera.position;
    let target_distance = to_target.norm();
    if target_distance < 1e-9 {
        return false;
    }
    let ray = Ray {
        origin: camera.position,
        direction: to_target / target_distance,
    };
    graph
        .hit_test_all(&ray)
        .iter()
        .any(|hit| hit.marker != marker && hit.distance_m < target_distance)
}

fn anchor_error(marker: MarkerId, error: CollaboratorError) -> GeoAnchorError {
    if error.is_tracking_loss() {
        GeoAnchorError::TrackingLost
    } else {
        GeoAnchorError::AnchorCreation {
            marker,
            reason: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{HitResult, MockArSession, MockSceneGraph};
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn placement(x: f64, y: f64, z: f64) -> PlacementResult {
        PlacementResult {
            local_offset: Vector3::new(x, y, z),
            scale_factor: 2.0,
            distance_m: 80,
            render_distance_m: 50.0,
            marker_bearing_deg: 0.0,
            visible: true,
        }
    }

    #[test]
    fn test_apply_creates_anchor_and_node() {
        let mut session = MockArSession::new();
        let mut graph = MockSceneGraph::new();
        let mut adapter = SceneAdapter::default();
        let camera = Pose::from_translation(1.0, 1.5, 0.0);

        adapter
            .apply(&mut session, &mut graph, &camera, MarkerId(1), &placement(0.0, 1.5, -50.0))
            .unwrap();

        let created = session.created_anchors()[0];
        assert_relative_eq!(created.position, Vector3::new(1.0, 1.5, -50.0), epsilon = 1e-9);
        let node = graph.node_for_marker(MarkerId(1)).unwrap();
        assert_eq!(node.scale, 2.0);
        assert!(adapter.is_anchored(MarkerId(1)));
    }

    #[test]
    fn test_offset_follows_camera_yaw() {
        let camera = Pose::new(
            Vector3::zeros(),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2),
        );
        // Camera looks down -x; a marker straight ahead lands there
        let world = world_position(&camera, &Vector3::new(0.0, 0.0, -10.0));
        assert_relative_eq!(world, Vector3::new(-10.0, 0.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_billboard_faces_camera() {
        let rotation = billboard_rotation(&Vector3::new(0.0, 0.0, -10.0), &Vector3::zeros());
        let forward = rotation * Vector3::new(0.0, 0.0, -1.0);
        assert_relative_eq!(forward, Vector3::new(0.0, 0.0, 1.0), epsilon = 1e-9);
    }

    #[test]
    fn test_reanchor_releases_previous_after_success() {
        let mut session = MockArSession::new();
        let mut graph = MockSceneGraph::new();
        let mut adapter = SceneAdapter::default();
        let camera = Pose::identity();

        adapter
            .apply(&mut session, &mut graph, &camera, MarkerId(1), &placement(0.0, 0.0, -10.0))
            .unwrap();
        let first = adapter.anchor_of(MarkerId(1)).unwrap();

        session.fail_next_anchor_creations(1);
        let err = adapter
            .apply(&mut session, &mut graph, &camera, MarkerId(1), &placement(0.0, 0.0, -20.0))
            .unwrap_err();
        assert!(matches!(err, GeoAnchorError::AnchorCreation { .. }));
        assert_eq!(adapter.anchor_of(MarkerId(1)), Some(first));
        assert!(session.released_anchors().is_empty());

        adapter
            .apply(&mut session, &mut graph, &camera, MarkerId(1), &placement(0.0, 0.0, -20.0))
            .unwrap();
        assert_eq!(session.released_anchors(), &[first]);
        assert_eq!(session.live_anchor_count(), 1);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_tracking_loss_maps_to_tracking_lost() {
        let mut session = MockArSession::new();
        let mut graph = MockSceneGraph::new();
        let mut adapter = SceneAdapter::default();
        session.set_tracking(false);

        let err = adapter
            .apply(&mut session, &mut graph, &Pose::identity(), MarkerId(1), &placement(0.0, 0.0, -5.0))
            .unwrap_err();
        assert!(matches!(err, GeoAnchorError::TrackingLost));
    }

    #[test]
    fn test_overlap_raises_marker() {
        let mut session = MockArSession::new();
        // Anything at or below the horizon is blocked by a nearer marker
        let mut graph = MockSceneGraph::new().with_hit_tester(|ray| {
            if ray.direction.y <= 0.0 {
                vec![HitResult {
                    marker: MarkerId(7),
                    distance_m: 5.0,
                }]
            } else {
                Vec::new()
            }
        });
        let mut adapter = SceneAdapter::new(Some(OverlapConfig {
            raise_step_m: 1.0,
            max_raise_steps: 3,
        }));

        let applied = adapter
            .apply(&mut session, &mut graph, &Pose::identity(), MarkerId(1), &placement(0.0, 0.0, -50.0))
            .unwrap();
        assert!(applied.visible);
        assert_relative_eq!(applied.local_offset.y, 1.0);
        assert_relative_eq!(session.created_anchors()[0].position.y, 1.0);
    }

    #[test]
    fn test_fully_occluded_marker_hidden() {
        let mut session = MockArSession::new();
        let mut graph = MockSceneGraph::new().with_hit_tester(|_| {
            vec![HitResult {
                marker: MarkerId(7),
                distance_m: 5.0,
            }]
        });
        let mut adapter = SceneAdapter::new(Some(OverlapConfig::default()));

        let applied = adapter
            .apply(&mut session, &mut graph, &Pose::identity(), MarkerId(1), &placement(0.0, 0.0, -50.0))
            .unwrap();
        assert!(!applied.visible);
        assert!(session.created_anchors().is_empty());
        assert!(!adapter.is_anchored(MarkerId(1)));
    }

    #[test]
    fn test_own_hit_does_not_occlude() {
        let mut session = MockArSession::new();
        let mut graph = MockSceneGraph::new().with_hit_tester(|_| {
            vec![HitResult {
                marker: MarkerId(1),
                distance_m: 5.0,
            }]
        });
        let mut adapter = SceneAdapter::new(Some(OverlapConfig::default()));
        let applied = adapter
            .apply(&mut session, &mut graph, &Pose::identity(), MarkerId(1), &placement(0.0, 0.0, -50.0))
            .unwrap();
        assert_relative_eq!(applied.local_offset.y, 0.0);
    }

    #[test]
    fn test_release_all() {
        let mut session = MockArSession::new();
        let mut graph = MockSceneGraph::new();
        let mut adapter = SceneAdapter::default();
        for id in 1..=3 {
            adapter
                .apply(&mut session, &mut graph, &Pose::identity(), MarkerId(id), &placement(0.0, 0.0, -10.0))
                .unwrap();
        }
        adapter.release_all(&mut session, &mut graph);
        assert_eq!(adapter.anchored_count(), 0);
        assert_eq!(session.live_anchor_count(), 0);
        assert_eq!(graph.node_count(), 0);
    }
}
