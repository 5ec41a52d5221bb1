//! Core types and constants for geo-anchored AR placement

pub mod types;
pub mod constants;

pub use types::*;
pub use constants::*;
