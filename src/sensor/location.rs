//! Location estimation from raw fixes

use log::{debug, info};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::algorithms::distance;
use crate::api::callback::{FixRejectedCallback, LocationChangedCallback};
use crate::core::{GeoPoint, LocationFix, SIGNIFICANT_ACCURACY_DELTA_M, SIGNIFICANT_FIX_AGE_MS};
use crate::placement::RefreshScheduler;
use crate::processing::LatLongKalmanFilter;
use crate::utils::clock::MonotonicClock;
use crate::utils::config::{AcceptancePolicy, LocationConfig};
use crate::validation::FixRejection;

/// Holds the current best location and decides which fixes update it
#[derive(Debug, Clone)]
pub struct LocationEstimator {
    config: LocationConfig,
    filter: LatLongKalmanFilter,
    best_location: Option<GeoPoint>,
    /// Last accepted fix, compared against by the best-fix policy
    best_fix: Option<LocationFix>,
    seen_first_fix: bool,
}

impl LocationEstimator {
    pub fn new(config: LocationConfig) -> Self {
        let filter = LatLongKalmanFilter::new(config.default_process_noise_mps);
        Self {
            config,
            filter,
            best_location: None,
            best_fix: None,
            seen_first_fix: false,
        }
    }

    pub fn best_location(&self) -> Option<GeoPoint> {
        self.best_location
    }

    pub fn filter(&self) -> &LatLongKalmanFilter {
        &self.filter
    }

    pub fn config(&self) -> &LocationConfig {
        &self.config
    }

    /// Evaluate one raw fix. On acceptance the best location is updated and
    /// returned; rejected fixes leave it untouched.
    pub fn on_fix(&mut self, fix: &LocationFix, now_ms: u64) -> Result<GeoPoint, FixRejection> {
        if self.config.adopt_first_fix && !self.seen_first_fix {
            self.seen_first_fix = true;
            debug!("Adopting first fix {} as best location", fix.point);
            let noise = self.process_noise(fix);
            self.filter
                .process(&fix.point, fix.horizontal_accuracy_m, fix.timestamp_millis, noise);
            return Ok(self.accept(fix, fix.point));
        }
        self.seen_first_fix = true;

        self.check_acceptance(fix, now_ms)?;

        match self.config.policy {
            AcceptancePolicy::Filtered => self.apply_filter(fix),
            AcceptancePolicy::BestFix => {
                if !is_better_fix(fix, self.best_fix.as_ref()) {
                    return Err(FixRejection::NotBetter);
                }
                Ok(self.accept(fix, fix.point))
            }
        }
    }

    fn check_acceptance(&self, fix: &LocationFix, now_ms: u64) -> Result<(), FixRejection> {
        let age_ms = now_ms as i128 - fix.timestamp_millis as i128;
        if age_ms < 0 {
            let ahead_ms = age_ms.unsigned_abs() as u64;
            if ahead_ms > self.config.max_future_skew_ms {
                return Err(FixRejection::FromFuture {
                    ahead_ms,
                    max_skew_ms: self.config.max_future_skew_ms,
                });
            }
        } else if age_ms as u64 > self.config.max_fix_age_ms {
            return Err(FixRejection::Stale {
                age_ms: age_ms as u64,
                max_age_ms: self.config.max_fix_age_ms,
            });
        }

        let accuracy = fix.horizontal_accuracy_m;
        if !(accuracy > 0.0) {
            return Err(FixRejection::InvalidAccuracy { accuracy_m: accuracy });
        }
        if accuracy > self.config.minimum_accuracy_m {
            return Err(FixRejection::Inaccurate {
                accuracy_m: accuracy,
                minimum_m: self.config.minimum_accuracy_m,
            });
        }
        Ok(())
    }

    fn apply_filter(&mut self, fix: &LocationFix) -> Result<GeoPoint, FixRejection> {
        let previous = self.filter.clone();
        let noise = self.process_noise(fix);
        let estimate = self
            .filter
            .process(&fix.point, fix.horizontal_accuracy_m, fix.timestamp_millis, noise);

        let delta_m = distance(&estimate, &fix.point);
        if delta_m > self.config.divergence_threshold_m {
            // Undo the update but keep counting
            let consecutive = previous.consecutive_reject_count() + 1;
            self.filter = previous;
            if self.filter.record_rejection(self.config.max_consecutive_rejects) {
                info!(
                    "Location filter diverged {} times in a row, reinitialising",
                    consecutive
                );
                self.filter = LatLongKalmanFilter::new(self.config.default_process_noise_mps);
            }
            return Err(FixRejection::Divergent { delta_m, consecutive });
        }

        self.filter.clear_rejections();
        Ok(self.accept(fix, estimate))
    }

    /// Expected speed used as process noise
    fn process_noise(&self, fix: &LocationFix) -> f64 {
        if fix.speed_mps > 0.0 {
            fix.speed_mps
        } else {
            self.config.default_process_noise_mps
        }
    }

    fn accept(&mut self, fix: &LocationFix, point: GeoPoint) -> GeoPoint {
        self.best_location = Some(point);
        self.best_fix = Some(fix.clone());
        point
    }

    /// Forget every fix seen so far
    pub fn reset(&mut self) {
        self.filter.reset();
        self.best_location = None;
        self.best_fix = None;
        self.seen_first_fix = false;
    }
}

/// Whether `candidate` should replace `current` as the best fix.
///
/// Much newer fixes always win and much older ones never do. Otherwise the
/// more accurate fix wins, and a newer fix of similar accuracy wins when it
/// comes from the same provider.
pub fn is_better_fix(candidate: &LocationFix, current: Option<&LocationFix>) -> bool {
    let Some(current) = current else {
        return true;
    };

    let time_delta = candidate.timestamp_millis as i64 - current.timestamp_millis as i64;
    if time_delta > SIGNIFICANT_FIX_AGE_MS {
        return true;
    }
    if time_delta < -SIGNIFICANT_FIX_AGE_MS {
        return false;
    }
    let is_newer = time_delta > 0;

    let accuracy_delta = candidate.horizontal_accuracy_m - current.horizontal_accuracy_m;
    let is_less_accurate = accuracy_delta > 0.0;
    let is_more_accurate = accuracy_delta < 0.0;
    let is_significantly_less_accurate = accuracy_delta > SIGNIFICANT_ACCURACY_DELTA_M;
    let same_provider = candidate.provider == current.provider;

    is_more_accurate
        || (is_newer && !is_less_accurate)
        || (is_newer && !is_significantly_less_accurate && same_provider)
}

#[derive(Default)]
struct LocationListeners {
    on_location_changed: Option<LocationChangedCallback>,
    on_fix_rejected: Option<FixRejectedCallback>,
}

struct LocationShared {
    estimator: Mutex<LocationEstimator>,
    listeners: Mutex<LocationListeners>,
}

/// Handle given to the location source; safe to call from the sensor thread.
///
/// Accepted fixes update the shared best location, notify the listener and
/// may mark the scheduler dirty. Nothing here touches the scene.
#[derive(Clone)]
pub struct LocationFeed {
    shared: Arc<LocationShared>,
    clock: Arc<dyn MonotonicClock>,
    scheduler: RefreshScheduler,
}

impl LocationFeed {
    pub fn new(estimator: LocationEstimator, clock: Arc<dyn MonotonicClock>, scheduler: RefreshScheduler) -> Self {
        Self {
            shared: Arc::new(LocationShared {
                estimator: Mutex::new(estimator),
                listeners: Mutex::new(LocationListeners::default()),
            }),
            clock,
            scheduler,
        }
    }

    pub fn on_fix(&self, fix: LocationFix) {
        let now_ms = self.clock.now_ms();
        let outcome = self.shared.estimator.lock().on_fix(&fix, now_ms);

        match outcome {
            Ok(location) => {
                debug!("Accepted fix, best location now {}", location);
                if let Some(listener) = &self.shared.listeners.lock().on_location_changed {
                    listener(location);
                }
                self.scheduler.notify_location_changed(location);
            }
            Err(rejection) => {
                debug!("Rejected fix at {} ({}): {}", fix.point, rejection.label(), rejection);
                if let Some(callback) = &self.shared.listeners.lock().on_fix_rejected {
                    callback(&fix, &rejection);
                }
            }
        }
    }

    pub fn best_location(&self) -> Option<GeoPoint> {
        self.shared.estimator.lock().best_location()
    }

    pub fn set_location_changed_listener(&self, listener: Option<LocationChangedCallback>) {
        self.shared.listeners.lock().on_location_changed = listener;
    }

    pub fn set_fix_rejected_listener(&self, listener: Option<FixRejectedCallback>) {
        self.shared.listeners.lock().on_fix_rejected = listener;
    }

    /// Run `f` against the estimator under its lock
    pub fn with_estimator<R>(&self, f: impl FnOnce(&mut LocationEstimator) -> R) -> R {
        f(&mut self.shared.estimator.lock())
    }
}
