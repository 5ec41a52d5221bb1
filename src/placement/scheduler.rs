//! Refresh scheduling
//!
//! The scheduler only ever flips a dirty flag. Sensor threads may mark it
//! through a cloned handle; the render thread polls it once per frame and
//! runs the placement pass when it was set.

use log::{debug, trace};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::algorithms::distance;
use crate::core::GeoPoint;

/// What drives automatic refreshes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Fixed-interval timer
    Interval,
    /// Accepted location changes
    OnLocationChange,
}

#[derive(Debug)]
struct SchedulerInner {
    mode: RefreshMode,
    interval_ms: u64,
    /// Next timer expiry; `None` while the timer is cancelled
    deadline_ms: Option<u64>,
    min_displacement_m: Option<f64>,
    /// Device location used by the last placement pass
    last_pass_location: Option<GeoPoint>,
}

#[derive(Debug)]
struct SchedulerShared {
    dirty: AtomicBool,
    inner: Mutex<SchedulerInner>,
}

/// Idle/Dirty state machine deciding when anchors are recomputed
#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    shared: Arc<SchedulerShared>,
}

impl RefreshScheduler {
    /// New scheduler. It starts dirty so the first frame places markers,
    /// and the timer stays cancelled until `resume`.
    pub fn new(interval_ms: u64, on_location_change: bool, min_displacement_m: Option<f64>) -> Self {
        let mode = if on_location_change {
            RefreshMode::OnLocationChange
        } else {
            RefreshMode::Interval
        };
        Self {
            shared: Arc::new(SchedulerShared {
                dirty: AtomicBool::new(true),
                inner: Mutex::new(SchedulerInner {
                    mode,
                    interval_ms,
                    deadline_ms: None,
                    min_displacement_m,
                    last_pass_location: None,
                }),
            }),
        }
    }

    pub fn mode(&self) -> RefreshMode {
        self.shared.inner.lock().mode
    }

    pub fn interval_ms(&self) -> u64 {
        self.shared.inner.lock().interval_ms
    }

    pub fn is_dirty(&self) -> bool {
        self.shared.dirty.load(Ordering::Acquire)
    }

    /// Explicit refresh request; the next poll runs a pass whatever the timer says
    pub fn request_refresh(&self) {
        self.shared.dirty.store(true, Ordering::Release);
    }

    /// Switch to the timer, cancelling any pending expiry and rescheduling
    /// one full interval from `now_ms`
    pub fn set_interval(&self, interval_ms: u64, now_ms: u64) {
        let mut inner = self.shared.inner.lock();
        inner.interval_ms = interval_ms;
        inner.mode = RefreshMode::Interval;
        inner.deadline_ms = Some(now_ms + interval_ms);
        debug!("Refresh timer set to {} ms", interval_ms);
    }

    /// Enable or disable location-driven refreshes. The timer runs exactly
    /// when this mode is off.
    pub fn set_refresh_on_location_change(&self, enabled: bool, now_ms: u64) {
        let mut inner = self.shared.inner.lock();
        if enabled {
            inner.mode = RefreshMode::OnLocationChange;
            inner.deadline_ms = None;
        } else {
            inner.mode = RefreshMode::Interval;
            inner.deadline_ms = Some(now_ms + inner.interval_ms);
        }
    }

    pub fn set_min_displacement(&self, min_displacement_m: Option<f64>) {
        self.shared.inner.lock().min_displacement_m = min_displacement_m;
    }

    /// Called from the location thread after a fix was accepted
    pub fn notify_location_changed(&self, location: GeoPoint) {
        let inner = self.shared.inner.lock();
        if inner.mode != RefreshMode::OnLocationChange {
            return;
        }

        if let (Some(threshold), Some(last)) = (inner.min_displacement_m, inner.last_pass_location) {
            let moved = distance(&last, &location);
            if moved < threshold {
                trace!("Moved {:.1} m since last pass, below {:.1} m", moved, threshold);
                return;
            }
        }
        self.shared.dirty.store(true, Ordering::Release);
    }

    /// Remember where the device was when a pass ran, for displacement gating
    pub fn record_pass_location(&self, location: GeoPoint) {
        self.shared.inner.lock().last_pass_location = Some(location);
    }

    /// Advance the timer and consume the dirty flag. Returns true when a
    /// placement pass is due this frame.
    pub fn poll(&self, now_ms: u64) -> bool {
        {
            let mut inner = self.shared.inner.lock();
            if let (RefreshMode::Interval, Some(deadline)) = (inner.mode, inner.deadline_ms) {
                if now_ms >= deadline {
                    inner.deadline_ms = Some(now_ms + inner.interval_ms);
                    self.shared.dirty.store(true, Ordering::Release);
                }
            }
        }
        self.shared.dirty.swap(false, Ordering::AcqRel)
    }

    /// Start the timer if the interval mode is active
    pub fn resume(&self, now_ms: u64) {
        let mut inner = self.shared.inner.lock();
        if inner.mode == RefreshMode::Interval {
            inner.deadline_ms = Some(now_ms + inner.interval_ms);
        }
    }

    /// Cancel the timer
    pub fn pause(&self) {
        self.shared.inner.lock().deadline_ms = None;
    }

    pub fn deadline_ms(&self) -> Option<u64> {
        self.shared.inner.lock().deadline_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer_scheduler(now_ms: u64) -> RefreshScheduler {
        let scheduler = RefreshScheduler::new(8_000, false, None);
        scheduler.resume(now_ms);
        assert!(scheduler.poll(now_ms), "initial pass is due");
        scheduler
    }

    #[test]
    fn test_timer_marks_dirty_each_interval() {
        let scheduler = timer_scheduler(0);
        assert!(!scheduler.poll(7_999));
        assert!(scheduler.poll(8_000));
        assert!(!scheduler.poll(8_001));
        assert!(scheduler.poll(16_000));
    }

    #[test]
    fn test_explicit_refresh_runs_exactly_one_pass() {
        let scheduler = timer_scheduler(0);
        scheduler.request_refresh();
        assert!(scheduler.poll(10));
        assert!(!scheduler.poll(11));
    }

    #[test]
    fn test_set_interval_reschedules() {
        let scheduler = timer_scheduler(0);
        scheduler.set_interval(1_000, 5_000);
        assert!(!scheduler.poll(5_999));
        assert!(scheduler.poll(6_000));
    }

    #[test]
    fn test_location_mode_disables_timer() {
        let scheduler = timer_scheduler(0);
        scheduler.set_refresh_on_location_change(true, 0);
        assert_eq!(scheduler.mode(), RefreshMode::OnLocationChange);
        assert_eq!(scheduler.deadline_ms(), None);
        assert!(!scheduler.poll(100_000));

        scheduler.notify_location_changed(GeoPoint::new(1.0, 1.0));
        assert!(scheduler.poll(100_001));

        scheduler.set_refresh_on_location_change(false, 200_000);
        assert_eq!(scheduler.deadline_ms(), Some(208_000));
    }

    #[test]
    fn test_location_change_ignored_in_timer_mode() {
        let scheduler = timer_scheduler(0);
        scheduler.notify_location_changed(GeoPoint::new(1.0, 1.0));
        assert!(!scheduler.poll(10));
    }

    #[test]
    fn test_displacement_gating() {
        let scheduler = RefreshScheduler::new(8_000, true, Some(20.0));
        assert!(scheduler.poll(0));
        scheduler.record_pass_location(GeoPoint::new(0.0, 0.0));

        // ~11 m north
        scheduler.notify_location_changed(GeoPoint::new(0.0001, 0.0));
        assert!(!scheduler.poll(1));

        // ~33 m north
        scheduler.notify_location_changed(GeoPoint::new(0.0003, 0.0));
        assert!(scheduler.poll(2));
    }

    #[test]
    fn test_pause_cancels_timer() {
        let scheduler = timer_scheduler(0);
        scheduler.pause();
        assert!(!scheduler.poll(50_000));
        scheduler.resume(50_000);
        assert!(scheduler.poll(58_000));
    }
}
