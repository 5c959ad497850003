//! External detector and solver interfaces.
//!
//! Marker detection and bundle adjustment live outside this crate; the job
//! only drives them.

use image::DynamicImage;

use super::target::TargetModel;
use super::types::{CameraCalibration, CollaboratorError, Detection, DetectionTable, FitOptions};

/// Finds the calibration board in a frame.
pub trait BoardDetector: Send + Sync {
    /// `Ok(None)` (or an empty detection) means the board is not visible.
    fn detect(
        &self,
        frame: &DynamicImage,
        target: &TargetModel,
    ) -> Result<Option<Detection>, CollaboratorError>;
}

/// Fits intrinsics and extrinsics for a group of cameras.
pub trait CameraGroupSolver: Send + Sync {
    /// `tables` are in camera order with image sizes attached. A camera
    /// without detections arrives as an empty table.
    fn fit(
        &self,
        tables: &[DetectionTable],
        target: &TargetModel,
        options: FitOptions,
        initial: Option<&CameraCalibration>,
    ) -> Result<CameraCalibration, CollaboratorError>;
}
