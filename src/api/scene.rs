//! Application facade tying sensors, scheduling, placement and the renderer together
//!
//! `LocationScene` lives on the render thread. Sensor sources receive cloned
//! feeds and only ever update shared estimator state and the dirty flag;
//! every anchor and node operation happens inside `process_frame`.

use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

use crate::api::adapter::SceneAdapter;
use crate::api::callback::{FixRejectedCallback, LocationChangedCallback};
use crate::core::{GeoPoint, Marker, MarkerId, Orientation};
use crate::hardware::{ArSession, CollaboratorError, LocationSource, OrientationSource, SceneGraph};
use crate::placement::{AnchorPlacementEngine, PlacementContext, RefreshMode, RefreshScheduler};
use crate::sensor::{LocationEstimator, LocationFeed, OrientationEstimator, OrientationFeed};
use crate::utils::clock::MonotonicClock;
use crate::utils::config::{PlacementConfig, SceneConfig};
use crate::validation::{GeoAnchorError, SensorKind};

/// Application-owned scene settings and markers
#[derive(Debug, Clone, Default)]
pub struct SceneState {
    /// Insertion order is draw priority
    pub markers: Vec<Marker>,
    pub bearing_adjustment_deg: i32,
    pub distance_limit_m: u32,
    pub refresh_interval_ms: u64,
}

/// Outcome of one placement pass.
///
/// When tracking is lost partway through, the pass stops at that marker.
/// Markers handled before it keep their new placement and are counted in
/// `placed`/`hidden`; the rest keep their previous one until the retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefreshReport {
    /// Markers anchored this pass
    pub placed: usize,
    /// Markers outside their radius or fully occluded
    pub hidden: usize,
    /// Markers whose anchor could not be created or read; their previous placement stays
    pub failed: usize,
    /// The pass stopped because AR tracking was lost; it is retried next frame
    pub skipped_tracking_lost: bool,
    /// The pass never started because the camera pose could not be read for
    /// another reason; it is retried next frame
    pub skipped_no_camera: bool,
}

/// Geo-anchored marker scene for one AR session
pub struct LocationScene<S, G, L, O>
where
    S: ArSession,
    G: SceneGraph,
    L: LocationSource,
    O: OrientationSource,
{
    session: S,
    graph: G,
    location_source: L,
    orientation_source: O,
    state: SceneState,
    engine: AnchorPlacementEngine,
    adapter: SceneAdapter,
    scheduler: RefreshScheduler,
    location_feed: LocationFeed,
    orientation: Arc<Mutex<OrientationEstimator>>,
    clock: Arc<dyn MonotonicClock>,
    running: bool,
    reported_unavailable: HashSet<SensorKind>,
}

impl<S, G, L, O> LocationScene<S, G, L, O>
where
    S: ArSession,
    G: SceneGraph,
    L: LocationSource,
    O: OrientationSource,
{
    /// Scene with default settings.
    ///
    /// `clock` must read the same elapsed-realtime base the location source
    /// stamps its fixes with, e.g. `SystemClock::starting_at(elapsed_realtime_ms)`.
    pub fn new(
        session: S,
        graph: G,
        location_source: L,
        orientation_source: O,
        clock: Arc<dyn MonotonicClock>,
    ) -> Self {
        Self::build(session, graph, location_source, orientation_source, SceneConfig::default(), clock)
    }

    /// Scene from a validated configuration and an explicit clock
    pub fn with_config(
        session: S,
        graph: G,
        location_source: L,
        orientation_source: O,
        config: SceneConfig,
        clock: Arc<dyn MonotonicClock>,
    ) -> Result<Self, GeoAnchorError> {
        config.validate()?;
        Ok(Self::build(session, graph, location_source, orientation_source, config, clock))
    }

    fn build(
        session: S,
        graph: G,
        location_source: L,
        orientation_source: O,
        config: SceneConfig,
        clock: Arc<dyn MonotonicClock>,
    ) -> Self {
        let scheduler = RefreshScheduler::new(
            config.refresh_interval_ms,
            config.refresh_on_location_change,
            config.min_refresh_displacement_m,
        );
        let location_feed = LocationFeed::new(
            LocationEstimator::new(config.location.clone()),
            clock.clone(),
            scheduler.clone(),
        );

        Self {
            session,
            graph,
            location_source,
            orientation_source,
            state: SceneState {
                markers: Vec::new(),
                bearing_adjustment_deg: config.bearing_adjustment_deg,
                distance_limit_m: config.distance_limit_m,
                refresh_interval_ms: config.refresh_interval_ms,
            },
            engine: AnchorPlacementEngine::new(config.placement.clone()),
            adapter: SceneAdapter::new(config.placement.overlap.clone()),
            scheduler,
            location_feed,
            orientation: Arc::new(Mutex::new(OrientationEstimator::new(config.orientation))),
            clock,
            running: false,
            reported_unavailable: HashSet::new(),
        }
    }

    /// Add a marker; it is placed on the next frame
    pub fn add_marker(&mut self, marker: Marker) {
        debug!("Adding {} at {}", marker.id, marker.geo_point);
        self.state.markers.push(marker);
        self.scheduler.request_refresh();
    }

    /// Remove one marker and its anchor
    pub fn remove_marker(&mut self, id: MarkerId) -> Option<Marker> {
        let index = self.state.markers.iter().position(|m| m.id == id)?;
        self.adapter.release(&mut self.session, &mut self.graph, id);
        Some(self.state.markers.remove(index))
    }

    /// Remove every marker and release all anchors
    pub fn remove_all_markers(&mut self) {
        self.adapter.release_all(&mut self.session, &mut self.graph);
        self.state.markers.clear();
    }

    pub fn markers(&self) -> &[Marker] {
        &self.state.markers
    }

    pub fn marker(&self, id: MarkerId) -> Option<&Marker> {
        self.state.markers.iter().find(|m| m.id == id)
    }

    pub fn state(&self) -> &SceneState {
        &self.state
    }

    /// Set the compass calibration, returning the previous value
    pub fn set_bearing_adjustment(&mut self, degrees: i32) -> i32 {
        let previous = std::mem::replace(&mut self.state.bearing_adjustment_deg, degrees);
        self.scheduler.request_refresh();
        previous
    }

    pub fn bearing_adjustment(&self) -> i32 {
        self.state.bearing_adjustment_deg
    }

    /// Set the placement distance cap, returning the previous value
    pub fn set_distance_limit(&mut self, meters: u32) -> Result<u32, GeoAnchorError> {
        SceneConfig::validate_distance_limit(meters)?;
        let previous = std::mem::replace(&mut self.state.distance_limit_m, meters);
        self.scheduler.request_refresh();
        Ok(previous)
    }

    pub fn distance_limit(&self) -> u32 {
        self.state.distance_limit_m
    }

    /// Refresh on a fixed interval. Turns off refresh-on-location-change.
    pub fn set_refresh_interval(&mut self, millis: u64) -> Result<u64, GeoAnchorError> {
        SceneConfig::validate_refresh_interval(millis)?;
        let previous = std::mem::replace(&mut self.state.refresh_interval_ms, millis);
        self.scheduler.set_interval(millis, self.clock.now_ms());
        Ok(previous)
    }

    pub fn refresh_interval(&self) -> u64 {
        self.state.refresh_interval_ms
    }

    /// Refresh whenever the best location changes instead of on the timer
    pub fn set_refresh_on_location_change(&mut self, enabled: bool) {
        self.scheduler.set_refresh_on_location_change(enabled, self.clock.now_ms());
    }

    pub fn refresh_on_location_change(&self) -> bool {
        self.scheduler.mode() == RefreshMode::OnLocationChange
    }

    /// Ignore location changes smaller than this when refreshing on location
    pub fn set_min_refresh_displacement(&mut self, meters: Option<f64>) {
        self.scheduler.set_min_displacement(meters);
    }

    pub fn set_placement_config(&mut self, config: PlacementConfig) {
        self.adapter.set_overlap(config.overlap.clone());
        self.engine.set_config(config);
        self.scheduler.request_refresh();
    }

    /// Force a full placement pass on the next frame
    pub fn refresh_anchors(&self) {
        self.scheduler.request_refresh();
    }

    pub fn set_location_changed_listener(&self, listener: Option<LocationChangedCallback>) {
        self.location_feed.set_location_changed_listener(listener);
    }

    pub fn set_fix_rejected_listener(&self, listener: Option<FixRejectedCallback>) {
        self.location_feed.set_fix_rejected_listener(listener);
    }

    pub fn best_location(&self) -> Option<GeoPoint> {
        self.location_feed.best_location()
    }

    pub fn orientation(&self) -> Option<Orientation> {
        self.orientation.lock().current()
    }

    /// Feed for hosts that deliver fixes without a `LocationSource`
    pub fn location_feed(&self) -> LocationFeed {
        self.location_feed.clone()
    }

    pub fn orientation_feed(&self) -> OrientationFeed {
        OrientationFeed::new(self.orientation.clone())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start sensor subscriptions and the refresh timer.
    ///
    /// Location and heading are re-acquired from scratch; fixes from before
    /// a pause are not trusted.
    pub fn resume(&mut self) {
        if self.running {
            return;
        }

        self.location_feed.with_estimator(LocationEstimator::reset);
        self.orientation.lock().reset();

        let location_result = self.location_source.start(self.location_feed.clone());
        self.report_start(SensorKind::Location, location_result);
        let orientation_result = self.orientation_source.start(self.orientation_feed());
        self.report_start(SensorKind::Orientation, orientation_result);

        self.scheduler.resume(self.clock.now_ms());
        self.scheduler.request_refresh();
        self.running = true;
        info!("Location scene resumed");
    }

    /// Stop sensor subscriptions and cancel the refresh timer
    pub fn pause(&mut self) {
        if !self.running {
            return;
        }
        self.location_source.stop();
        self.orientation_source.stop();
        self.scheduler.pause();
        self.running = false;
        info!("Location scene paused");
    }

    fn report_start(&mut self, sensor: SensorKind, result: Result<(), CollaboratorError>) {
        let Err(e) = result else {
            return;
        };
        if self.reported_unavailable.insert(sensor) {
            warn!("{} ({})", GeoAnchorError::SensorUnavailable { sensor }, e);
        }
    }

    /// Sensors that failed to start since the scene was created
    pub fn unavailable_sensors(&self) -> Vec<SensorKind> {
        [SensorKind::Location, SensorKind::Orientation]
            .into_iter()
            .filter(|s| self.reported_unavailable.contains(s))
            .collect()
    }

    /// Per-frame entry point. Runs a placement pass when one is due and
    /// otherwise keeps nodes facing the camera. Returns a report when a
    /// pass ran.
    pub fn process_frame(&mut self) -> Option<RefreshReport> {
        if self.scheduler.poll(self.clock.now_ms()) {
            return self.run_pass();
        }

        if let Ok(camera) = self.session.camera_pose() {
            let markers = &self.state.markers;
            self.adapter.update_billboards(&self.session, &mut self.graph, &camera, |id| {
                markers
                    .iter()
                    .find(|m| m.id == id)
                    .and_then(|m| m.placement.as_ref())
                    .map_or(1.0, |p| p.scale_factor)
            });
        }
        None
    }

    fn run_pass(&mut self) -> Option<RefreshReport> {
        let mut report = RefreshReport::default();

        let camera = match self.session.camera_pose() {
            Ok(camera) => camera,
            Err(e) => {
                if e.is_tracking_loss() {
                    info!("Tracking lost, skipping placement pass");
                    report.skipped_tracking_lost = true;
                } else {
                    warn!("Camera pose unavailable, skipping placement pass: {}", e);
                    report.skipped_no_camera = true;
                }
                self.scheduler.request_refresh();
                return Some(report);
            }
        };

        let (Some(device_location), Some(orientation)) = (self.best_location(), self.orientation()) else {
            debug!("Waiting for a location and heading before placing markers");
            self.scheduler.request_refresh();
            return None;
        };

        let ctx = PlacementContext {
            device_location,
            orientation,
            camera_height_m: camera.position.y,
            bearing_adjustment_deg: self.state.bearing_adjustment_deg,
            distance_limit_m: self.state.distance_limit_m,
        };

        for marker in self.state.markers.iter_mut() {
            let result = self.engine.compute_placement(marker, &ctx);

            if !result.visible {
                self.adapter.release(&mut self.session, &mut self.graph, marker.id);
                marker.placement = Some(result);
                report.hidden += 1;
                continue;
            }

            match self
                .adapter
                .apply(&mut self.session, &mut self.graph, &camera, marker.id, &result)
            {
                Ok(applied) => {
                    if applied.visible {
                        report.placed += 1;
                    } else {
                        report.hidden += 1;
                    }
                    marker.placement = Some(applied);
                }
                Err(GeoAnchorError::TrackingLost) => {
                    info!("Tracking lost during placement pass, retrying next frame");
                    self.scheduler.request_refresh();
                    report.skipped_tracking_lost = true;
                    return Some(report);
                }
                Err(e) => {
                    warn!("{}", e);
                    report.failed += 1;
                }
            }
        }

        self.scheduler.record_pass_location(device_location);
        debug!(
            "Placement pass: {} placed, {} hidden, {} failed",
            report.placed, report.hidden, report.failed
        );
        Some(report)
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn scene_graph(&self) -> &G {
        &self.graph
    }

    pub fn scene_graph_mut(&mut self) -> &mut G {
        &mut self.graph
    }

    pub fn location_source(&self) -> &L {
        &self.location_source
    }

    pub fn orientation_source(&self) -> &O {
        &self.orientation_source
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }
}
