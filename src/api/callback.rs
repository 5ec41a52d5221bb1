//! Listener types handed to the scene by the application
//!
//! Listeners run on the thread that delivered the sensor event, never on the
//! render thread, and must not call back into the scene.

use crate::core::{GeoPoint, LocationFix};
use crate::validation::FixRejection;

/// Called with the new best location after every accepted fix
pub type LocationChangedCallback = Box<dyn Fn(GeoPoint) + Send>;

/// Debug hook called with every rejected fix and the reason
pub type FixRejectedCallback = Box<dyn Fn(&LocationFix, &FixRejection) + Send>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_callbacks_can_forward_across_threads() {
        let (tx, rx) = mpsc::channel();
        let callback: LocationChangedCallback = Box::new(move |point| {
            let _ = tx.send(point);
        });

        std::thread::spawn(move || callback(GeoPoint::new(1.0, 2.0)))
            .join()
            .unwrap();
        assert_eq!(rx.recv().unwrap(), GeoPoint::new(1.0, 2.0));
    }
}
