//! Monotonic time sources
//!
//! Fix age and refresh deadlines are measured on a monotonic clock so that
//! wall-clock adjustments never make a fix look stale or fresh.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Milliseconds since an arbitrary fixed origin
pub trait MonotonicClock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Clock backed by `Instant`.
///
/// Reads `base_ms` at construction and advances from there. Hosts pass the
/// platform's elapsed-realtime reading so fix timestamps share its base.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
    base_ms: u64,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    /// Clock that reads zero now
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Clock that reads `elapsed_realtime_ms` now
    pub fn starting_at(elapsed_realtime_ms: u64) -> Self {
        Self {
            origin: Instant::now(),
            base_ms: elapsed_realtime_ms,
        }
    }
}

impl MonotonicClock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.base_ms
            .saturating_add(self.origin.elapsed().as_millis() as u64)
    }
}

/// Clock advanced by hand; clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl MonotonicClock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
