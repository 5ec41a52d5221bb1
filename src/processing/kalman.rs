use crate::core::{GeoPoint, DEFAULT_PROCESS_NOISE_MPS, MIN_FILTER_ACCURACY_M};

/// Mutable state of the latitude/longitude filter
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    /// Current best estimate
    pub estimated_point: GeoPoint,
    /// Estimate variance (m²); `None` until the first measurement
    pub variance: Option<f64>,
    /// Timestamp of the last processed measurement
    pub last_timestamp_ms: u64,
    /// Divergent updates seen in a row
    pub consecutive_reject_count: u32,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            estimated_point: GeoPoint::default(),
            variance: None,
            last_timestamp_ms: 0,
            consecutive_reject_count: 0,
        }
    }
}

/// Kalman filter smoothing GPS fixes.
///
/// Latitude and longitude are run as two independent scalar channels that
/// share one variance. The gain is dimensionless, so the variance may stay
/// in metres while the estimate stays in degrees.
#[derive(Debug, Clone)]
pub struct LatLongKalmanFilter {
    state: FilterState,
    /// Expected device speed used as process noise (m/s)
    process_noise_mps: f64,
}

impl Default for LatLongKalmanFilter {
    fn default() -> Self {
        Self::new(DEFAULT_PROCESS_NOISE_MPS)
    }
}

impl LatLongKalmanFilter {
    /// Create an uninitialised filter with the given process noise
    pub fn new(process_noise_mps: f64) -> Self {
        Self {
            state: FilterState::default(),
            process_noise_mps,
        }
    }

    /// Feed one measurement and return the updated estimate
    pub fn process(
        &mut self,
        measured: &GeoPoint,
        accuracy_m: f64,
        timestamp_ms: u64,
        process_noise_mps: f64,
    ) -> GeoPoint {
        self.process_noise_mps = process_noise_mps;
        let accuracy = accuracy_m.max(MIN_FILTER_ACCURACY_M);
        let measurement_variance = accuracy * accuracy;

        let Some(mut variance) = self.state.variance else {
            self.state.estimated_point = *measured;
            self.state.variance = Some(measurement_variance);
            self.state.last_timestamp_ms = timestamp_ms;
            return *measured;
        };

        // Uncertainty grows with the time since the last fix; Q is per second
        let elapsed_ms = timestamp_ms.saturating_sub(self.state.last_timestamp_ms);
        if elapsed_ms > 0 {
            variance += elapsed_ms as f64 * self.process_noise_mps * self.process_noise_mps / 1000.0;
            self.state.last_timestamp_ms = timestamp_ms;
        }

        let gain = variance / (variance + measurement_variance);
        let estimate = &mut self.state.estimated_point;
        estimate.latitude += gain * (measured.latitude - estimate.latitude);
        estimate.longitude += gain * (measured.longitude - estimate.longitude);
        self.state.variance = Some((1.0 - gain) * variance);

        self.state.estimated_point
    }

    /// Current estimate, if any measurement has been processed
    pub fn estimate(&self) -> Option<GeoPoint> {
        self.state.variance.map(|_| self.state.estimated_point)
    }

    /// One standard deviation of the estimate (m)
    pub fn accuracy(&self) -> Option<f64> {
        self.state.variance.map(f64::sqrt)
    }

    pub fn is_initialized(&self) -> bool {
        self.state.variance.is_some()
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn process_noise(&self) -> f64 {
        self.process_noise_mps
    }

    pub fn consecutive_reject_count(&self) -> u32 {
        self.state.consecutive_reject_count
    }

    /// Count a divergent update. Returns true when the count passed
    /// `max_rejects` and the filter was rebuilt with default process noise.
    pub fn record_rejection(&mut self, max_rejects: u32) -> bool {
        self.state.consecutive_reject_count += 1;
        if self.state.consecutive_reject_count > max_rejects {
            *self = Self::default();
            return true;
        }
        false
    }

    pub fn clear_rejections(&mut self) {
        self.state.consecutive_reject_count = 0;
    }

    /// Drop all state, returning to uninitialised
    pub fn reset(&mut self) {
        self.state = FilterState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_first_measurement_adopted() {
        let mut filter = LatLongKalmanFilter::default();
        assert!(!filter.is_initialized());

        let p = GeoPoint::new(51.0, -1.0);
        let est = filter.process(&p, 10.0, 1_000, 3.0);

        assert_eq!(est, p);
        assert_relative_eq!(filter.state().variance.unwrap(), 100.0);
        assert_eq!(filter.state().last_timestamp_ms, 1_000);
    }

    #[test]
    fn test_accuracy_floor() {
        let mut filter = LatLongKalmanFilter::default();
        filter.process(&GeoPoint::new(0.0, 0.0), 0.2, 0, 3.0);
        assert_relative_eq!(filter.state().variance.unwrap(), 1.0);
    }

    #[test]
    fn test_identical_measurements_converge() {
        let mut filter = LatLongKalmanFilter::default();
        filter.process(&GeoPoint::new(10.0, 20.0), 10.0, 0, 3.0);

        let target = GeoPoint::new(10.0005, 20.0005);
        let mut last_variance = f64::INFINITY;
        // Same timestamp means no process noise is added between steps
        for _ in 0..100 {
            filter.process(&target, 10.0, 0, 3.0);
            let variance = filter.state().variance.unwrap();
            assert!(variance <= last_variance);
            last_variance = variance;
        }

        let est = filter.estimate().unwrap();
        assert_relative_eq!(est.latitude, target.latitude, epsilon = 1e-5);
        assert_relative_eq!(est.longitude, target.longitude, epsilon = 1e-5);
    }

    #[test]
    fn test_variance_grows_with_elapsed_time() {
        let mut filter = LatLongKalmanFilter::default();
        filter.process(&GeoPoint::new(0.0, 0.0), 5.0, 0, 3.0);
        // 2 s at 3 m/s adds 18 m² before the update shrinks it
        filter.process(&GeoPoint::new(0.0, 0.0), 5.0, 2_000, 3.0);
        let prior = 25.0 + 18.0;
        let gain = prior / (prior + 25.0);
        assert_relative_eq!(filter.state().variance.unwrap(), (1.0 - gain) * prior, epsilon = 1e-9);
    }

    #[test]
    fn test_rejection_counter_resets_filter() {
        let mut filter = LatLongKalmanFilter::new(5.0);
        filter.process(&GeoPoint::new(0.0, 0.0), 5.0, 0, 5.0);

        assert!(!filter.record_rejection(3));
        assert!(!filter.record_rejection(3));
        assert!(!filter.record_rejection(3));
        assert_eq!(filter.consecutive_reject_count(), 3);
        assert!(filter.record_rejection(3));

        assert!(!filter.is_initialized());
        assert_eq!(filter.consecutive_reject_count(), 0);
        assert_relative_eq!(filter.process_noise(), DEFAULT_PROCESS_NOISE_MPS);
    }

    #[test]
    fn test_clear_rejections() {
        let mut filter = LatLongKalmanFilter::default();
        filter.record_rejection(3);
        filter.clear_rejections();
        assert_eq!(filter.consecutive_reject_count(), 0);
    }

    #[test]
    fn test_reset_keeps_process_noise() {
        let mut filter = LatLongKalmanFilter::new(5.0);
        filter.process(&GeoPoint::new(1.0, 2.0), 10.0, 1_000, 5.0);
        filter.record_rejection(3);

        filter.reset();
        assert!(!filter.is_initialized());
        assert_eq!(filter.consecutive_reject_count(), 0);
        assert_eq!(filter.process_noise(), 5.0);
    }
}
