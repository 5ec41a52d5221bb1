//! Application-facing API
//!
//! `LocationScene` is the entry point hosts drive from their render loop.
//! `SceneAdapter` turns placement results into anchors and nodes, and
//! `callback` holds the listener types the scene accepts.

pub mod adapter;
pub mod callback;
pub mod scene;

pub use adapter::{billboard_rotation, world_position, SceneAdapter};
pub use callback::{FixRejectedCallback, LocationChangedCallback};
pub use scene::{LocationScene, RefreshReport, SceneState};
