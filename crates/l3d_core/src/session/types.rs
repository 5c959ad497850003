//! Session errors and action results.

use thiserror::Error;

use crate::calibration::{CalibrationError, JobHandle};
use crate::media::ProbeError;
use crate::params::ParamError;
use crate::project::ProjectError;
use crate::sync::{SyncError, SyncPlan};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    /// Rejected because a calibration job holds the project.
    #[error("A calibration job is running; try again when it has finished")]
    JobRunning,

    #[error("No calibration to refine; run a calibration first")]
    NoCalibration,

    #[error("No videos loaded")]
    NoVideos,
}

pub type SessionResult<T> = Result<T, SessionError>;

/// What triggering an action node led to.
pub enum ActionOutcome {
    /// `Synchronize...`: the plan, or `None` for method `None`.
    Synced(Option<SyncPlan>),
    /// `Calibrate...` or `Refine calibration...`.
    CalibrationStarted(JobHandle),
    /// Any other action; only listeners saw it.
    Fired,
}

impl std::fmt::Debug for ActionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionOutcome::Synced(plan) => f.debug_tuple("Synced").field(plan).finish(),
            ActionOutcome::CalibrationStarted(_) => f.write_str("CalibrationStarted(..)"),
            ActionOutcome::Fired => f.write_str("Fired"),
        }
    }
}
