//! Errors reported by the AR session, scene graph and sensor sources

use thiserror::Error;

use crate::validation::SensorKind;

/// Failure reported by an external collaborator
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollaboratorError {
    /// The AR session is not tracking; no pose can be trusted
    #[error("AR tracking lost")]
    TrackingLost,
    /// The session refused to create a world anchor
    #[error("Anchor creation failed: {reason}")]
    AnchorCreation { reason: String },
    /// An existing anchor's pose could not be read
    #[error("Anchor pose unavailable")]
    PoseUnavailable,
    /// The platform has no provider for this sensor
    #[error("No {sensor} sensor available")]
    SensorUnavailable { sensor: SensorKind },
    /// Scene graph rejected a node operation
    #[error("Scene graph error: {details}")]
    SceneGraph { details: String },
}

/// Result type for collaborator calls
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

impl CollaboratorError {
    /// Whether this failure should abort the whole placement pass
    pub fn is_tracking_loss(&self) -> bool {
        matches!(self, CollaboratorError::TrackingLost)
    }
}
