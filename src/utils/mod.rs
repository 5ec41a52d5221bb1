//! Utility modules for configuration and time

pub mod config;
pub mod clock;

pub use config::{ConfigError, SceneConfig};
pub use clock::{ManualClock, MonotonicClock, SystemClock};
