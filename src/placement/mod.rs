//! Anchor placement and refresh scheduling

pub mod engine;
pub mod scheduler;

pub use engine::{relative_bearing, render_distance, AnchorPlacementEngine, PlacementContext};
pub use scheduler::{RefreshMode, RefreshScheduler};
