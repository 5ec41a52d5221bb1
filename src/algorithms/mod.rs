//! Geodesic math

pub mod geodesy;

pub use geodesy::{bearing, distance, normalize_degrees};
