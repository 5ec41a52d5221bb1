//! Signal and data processing modules

pub mod kalman;

pub use kalman::{FilterState, LatLongKalmanFilter};
