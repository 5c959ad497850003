//! Multi-camera calibration.
//!
//! A [`CalibrationJob`] scans every camera's frames at a fixed stride, hands
//! each frame to a [`BoardDetector`], collects the hits into per-camera
//! [`DetectionTable`]s and finally asks a [`CameraGroupSolver`] for intrinsics
//! and extrinsics. Jobs run on a worker thread and report through a
//! [`JobHandle`].

mod collaborators;
mod config;
mod job;
mod target;
mod types;

pub use collaborators::{BoardDetector, CameraGroupSolver};
pub use config::CalibrationConfig;
pub use job::{
    CalibrationEvent, CalibrationJob, CameraInput, CancelToken, JobGuard, JobHandle, JobPhase,
    JobSlot,
};
pub use target::{TargetModel, TargetSpec};
pub use types::{
    BoardKind, CalibrationError, CalibrationOutcome, CalibrationResult, CalibrationRow,
    CameraCalibration, CameraParameters, CollaboratorError, Detection, DetectionTable, FitOptions,
};
