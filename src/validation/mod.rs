//! Error classification for the placement pipeline

pub mod error;

pub use error::{FixRejection, GeoAnchorError, SensorKind};
