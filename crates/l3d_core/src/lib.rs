//! L3D Core - multi-camera synchronization, calibration and project state
//!
//! This crate holds all logic with no UI dependencies. Board detection and
//! the camera group solver are supplied by the caller through traits.

pub mod calibration;
pub mod config;
pub mod logging;
pub mod media;
pub mod params;
pub mod project;
pub mod session;
pub mod sync;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}
