//! Physical constants and system parameters

/// Mean Earth radius used by the haversine formulas (m)
pub const EARTH_MEAN_RADIUS_M: f64 = 6_371_000.0;

/// Fixes older than this are discarded (milliseconds)
pub const DEFAULT_MAX_FIX_AGE_MS: u64 = 5_000;

/// Fixes stamped further ahead of the clock than this are discarded (milliseconds)
pub const DEFAULT_MAX_FUTURE_SKEW_MS: u64 = 1_000;

/// Worst horizontal accuracy a fix may report and still be used (m)
pub const DEFAULT_MINIMUM_ACCURACY_M: f64 = 25.0;

/// Filtered estimate further than this from the raw fix marks the fix as divergent (m)
pub const DIVERGENCE_THRESHOLD_M: f64 = 60.0;

/// Rejections tolerated in a row before the location filter is rebuilt
pub const MAX_CONSECUTIVE_REJECTS: u32 = 3;

/// Process noise used when the device speed is unknown or zero (m/s)
pub const DEFAULT_PROCESS_NOISE_MPS: f64 = 3.0;

/// Accuracy floor applied before squaring in the location filter (m)
pub const MIN_FILTER_ACCURACY_M: f64 = 1.0;

/// Default cap on the local offset used for anchor placement (m)
pub const DEFAULT_DISTANCE_LIMIT_M: u32 = 50;

/// Default periodic anchor refresh interval (milliseconds)
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 8_000;

/// Scale gained per metre of render distance in fixed-size-on-screen mode
pub const FIXED_SIZE_SCALE_PER_METER: f64 = 0.5;

/// True distance past which fixed-size markers are shrunk (m)
pub const DISTANT_PENALTY_THRESHOLD_M: f64 = 3_000.0;

/// Shrink factor for markers past the distant penalty threshold
pub const DISTANT_PENALTY_FACTOR: f64 = 0.75;

/// Largest true distance fed into the height illusion (m)
pub const HEIGHT_ILLUSION_CAP_M: f64 = 500.0;

/// Height added per metre of capped-away distance (m/m)
pub const HEIGHT_ILLUSION_GAIN: f64 = 0.01;

/// Fixes this much newer than the current best always win (milliseconds)
pub const SIGNIFICANT_FIX_AGE_MS: i64 = 2 * 60 * 1_000;

/// Accuracy delta beyond which a fix counts as significantly less accurate (m)
pub const SIGNIFICANT_ACCURACY_DELTA_M: f64 = 200.0;

/// Default touch target size for markers (pixels)
pub const DEFAULT_TOUCHABLE_SIZE_PX: u32 = 800;
