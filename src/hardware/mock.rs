//! Mock collaborators for testing and development

use nalgebra::{UnitQuaternion, Vector3};
use std::collections::HashMap;

use crate::core::{LocationFix, MarkerId};
use crate::hardware::{
    AnchorHandle, ArSession, CollaboratorError, CollaboratorResult, HitResult, LocationSource,
    NodeHandle, OrientationSource, Pose, Ray, SceneGraph,
};
use crate::sensor::{LocationFeed, OrientationFeed, OrientationSample, SensorAccuracy};
use crate::validation::SensorKind;

/// AR session that records anchor traffic and can simulate failures
pub struct MockArSession {
    camera: Pose,
    tracking: bool,
    next_anchor: u64,
    anchors: HashMap<AnchorHandle, Pose>,
    created: Vec<Pose>,
    released: Vec<AnchorHandle>,
    failing_creations: u32,
    unreadable: Vec<AnchorHandle>,
    camera_error: Option<CollaboratorError>,
}

impl Default for MockArSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MockArSession {
    pub fn new() -> Self {
        Self {
            camera: Pose::identity(),
            tracking: true,
            next_anchor: 1,
            anchors: HashMap::new(),
            created: Vec::new(),
            released: Vec::new(),
            failing_creations: 0,
            unreadable: Vec::new(),
            camera_error: None,
        }
    }

    pub fn set_camera_pose(&mut self, pose: Pose) {
        self.camera = pose;
    }

    /// Simulate losing or regaining tracking
    pub fn set_tracking(&mut self, tracking: bool) {
        self.tracking = tracking;
    }

    /// Make camera pose reads fail with `error` while tracking
    pub fn fail_camera_pose(&mut self, error: Option<CollaboratorError>) {
        self.camera_error = error;
    }

    /// Make the next `count` anchor creations fail
    pub fn fail_next_anchor_creations(&mut self, count: u32) {
        self.failing_creations = count;
    }

    /// Make pose reads for `anchor` fail
    pub fn make_pose_unreadable(&mut self, anchor: AnchorHandle) {
        self.unreadable.push(anchor);
    }

    /// Poses requested for every successfully created anchor
    pub fn created_anchors(&self) -> &[Pose] {
        &self.created
    }

    pub fn released_anchors(&self) -> &[AnchorHandle] {
        &self.released
    }

    pub fn live_anchor_count(&self) -> usize {
        self.anchors.len()
    }
}

impl ArSession for MockArSession {
    fn camera_pose(&self) -> CollaboratorResult<Pose> {
        if !self.tracking {
            return Err(CollaboratorError::TrackingLost);
        }
        if let Some(error) = &self.camera_error {
            return Err(error.clone());
        }
        Ok(self.camera)
    }

    fn create_world_anchor(&mut self, pose: &Pose) -> CollaboratorResult<AnchorHandle> {
        if !self.tracking {
            return Err(CollaboratorError::TrackingLost);
        }
        if self.failing_creations > 0 {
            self.failing_creations -= 1;
            return Err(CollaboratorError::AnchorCreation {
                reason: "simulated failure".to_string(),
            });
        }

        let handle = AnchorHandle(self.next_anchor);
        self.next_anchor += 1;
        self.anchors.insert(handle, *pose);
        self.created.push(*pose);
        Ok(handle)
    }

    fn anchor_pose(&self, anchor: AnchorHandle) -> CollaboratorResult<Pose> {
        if self.unreadable.contains(&anchor) {
            return Err(CollaboratorError::PoseUnavailable);
        }
        self.anchors
            .get(&anchor)
            .copied()
            .ok_or(CollaboratorError::PoseUnavailable)
    }

    fn release_anchor(&mut self, anchor: AnchorHandle) {
        self.anchors.remove(&anchor);
        self.released.push(anchor);
    }
}

/// Node state recorded by the mock scene graph
#[derive(Debug, Clone, PartialEq)]
pub struct MockNode {
    pub anchor: AnchorHandle,
    pub marker: MarkerId,
    pub position: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    pub scale: f64,
}

type HitTester = Box<dyn Fn(&Ray) -> Vec<HitResult> + Send>;

/// Scene graph that keeps nodes in a map
pub struct MockSceneGraph {
    next_node: u64,
    nodes: HashMap<NodeHandle, MockNode>,
    removed: Vec<NodeHandle>,
    hit_tester: Option<HitTester>,
}

impl Default for MockSceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSceneGraph {
    pub fn new() -> Self {
        Self {
            next_node: 1,
            nodes: HashMap::new(),
            removed: Vec::new(),
            hit_tester: None,
        }
    }

    /// Answer `hit_test_all` with `tester`
    pub fn with_hit_tester(mut self, tester: impl Fn(&Ray) -> Vec<HitResult> + Send + 'static) -> Self {
        self.hit_tester = Some(Box::new(tester));
        self
    }

    pub fn node(&self, handle: NodeHandle) -> Option<&MockNode> {
        self.nodes.get(&handle)
    }

    /// Live node for `marker`, if it is attached
    pub fn node_for_marker(&self, marker: MarkerId) -> Option<&MockNode> {
        self.nodes.values().find(|n| n.marker == marker)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn removed_nodes(&self) -> &[NodeHandle] {
        &self.removed
    }
}

impl SceneGraph for MockSceneGraph {
    fn attach_node(&mut self, anchor: AnchorHandle, marker: MarkerId) -> CollaboratorResult<NodeHandle> {
        let handle = NodeHandle(self.next_node);
        self.next_node += 1;
        self.nodes.insert(
            handle,
            MockNode {
                anchor,
                marker,
                position: Vector3::zeros(),
                rotation: UnitQuaternion::identity(),
                scale: 1.0,
            },
        );
        Ok(handle)
    }

    fn set_node_local_transform(
        &mut self,
        node: NodeHandle,
        position: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
        scale: f64,
    ) -> CollaboratorResult<()> {
        let entry = self.nodes.get_mut(&node).ok_or_else(|| CollaboratorError::SceneGraph {
            details: format!("unknown node {}", node.0),
        })?;
        entry.position = position;
        entry.rotation = rotation;
        entry.scale = scale;
        Ok(())
    }

    fn remove_node(&mut self, node: NodeHandle) {
        if self.nodes.remove(&node).is_some() {
            self.removed.push(node);
        }
    }

    fn hit_test_all(&self, ray: &Ray) -> Vec<HitResult> {
        self.hit_tester.as_ref().map_or_else(Vec::new, |tester| tester(ray))
    }
}

/// Location provider driven by hand
pub struct MockLocationSource {
    available: bool,
    feed: Option<LocationFeed>,
    start_count: u32,
}

impl Default for MockLocationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLocationSource {
    pub fn new() -> Self {
        Self {
            available: true,
            feed: None,
            start_count: 0,
        }
    }

    /// A source whose provider is missing on this device
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn is_running(&self) -> bool {
        self.feed.is_some()
    }

    pub fn start_count(&self) -> u32 {
        self.start_count
    }

    /// Deliver a fix as the platform would; dropped while stopped
    pub fn push_fix(&self, fix: LocationFix) {
        if let Some(feed) = &self.feed {
            feed.on_fix(fix);
        }
    }
}

impl LocationSource for MockLocationSource {
    fn start(&mut self, feed: LocationFeed) -> CollaboratorResult<()> {
        if !self.available {
            return Err(CollaboratorError::SensorUnavailable {
                sensor: SensorKind::Location,
            });
        }
        self.start_count += 1;
        self.feed = Some(feed);
        Ok(())
    }

    fn stop(&mut self) {
        self.feed = None;
    }
}

/// Orientation provider driven by hand
pub struct MockOrientationSource {
    available: bool,
    feed: Option<OrientationFeed>,
}

impl Default for MockOrientationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOrientationSource {
    pub fn new() -> Self {
        Self {
            available: true,
            feed: None,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            feed: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.feed.is_some()
    }

    pub fn push_sample(&self, sample: OrientationSample) {
        if let Some(feed) = &self.feed {
            feed.on_sample(sample);
        }
    }

    pub fn push_accuracy(&self, accuracy: SensorAccuracy) {
        if let Some(feed) = &self.feed {
            feed.on_accuracy_changed(accuracy);
        }
    }
}

impl OrientationSource for MockOrientationSource {
    fn start(&mut self, feed: OrientationFeed) -> CollaboratorResult<()> {
        if !self.available {
            return Err(CollaboratorError::SensorUnavailable {
                sensor: SensorKind::Orientation,
            });
        }
        self.feed = Some(feed);
        Ok(())
    }

    fn stop(&mut self) {
        self.feed = None;
    }
}
