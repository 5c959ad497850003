//! Calibration data types and errors.

use std::fmt;

use thiserror::Error;

use crate::media::FrameError;
use crate::params::ParamError;

/// Errors from configuring or running a calibration.
#[derive(Error, Debug)]
pub enum CalibrationError {
    /// Bad or missing parameters; raised before any work starts.
    #[error("Invalid calibration configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Param(#[from] ParamError),

    #[error("Camera '{camera}': {source}")]
    Frame {
        camera: String,
        #[source]
        source: FrameError,
    },

    #[error("Board detection failed for camera '{camera}' at frame {frame}: {message}")]
    Detector {
        camera: String,
        frame: u64,
        message: String,
    },

    #[error("Camera group fit failed: {0}")]
    Solver(String),

    #[error("Calibration was cancelled")]
    Cancelled,

    #[error("Calibration worker panicked: {0}")]
    WorkerPanicked(String),

    #[error("A calibration job is already running")]
    JobRunning,

    #[error("Failed to start calibration worker: {0}")]
    Spawn(#[source] std::io::Error),
}

impl CalibrationError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn detector(camera: impl Into<String>, frame: u64, message: impl Into<String>) -> Self {
        Self::Detector {
            camera: camera.into(),
            frame,
            message: message.into(),
        }
    }
}

/// Result type for calibration operations.
pub type CalibrationResult<T> = Result<T, CalibrationError>;

/// Error reported by an external detector or solver.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

impl CollaboratorError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Target corners found in one frame, as returned by a detector.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Detection {
    /// Image coordinates in pixels.
    pub corners: Vec<[f64; 2]>,
    /// Corner ids, parallel to `corners`.
    pub ids: Vec<i64>,
}

impl Detection {
    pub fn new(corners: Vec<[f64; 2]>, ids: Vec<i64>) -> Self {
        Self { corners, ids }
    }

    pub fn is_empty(&self) -> bool {
        self.corners.is_empty() && self.ids.is_empty()
    }
}

/// One detected target instance keyed by `(set_id, frame)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationRow {
    /// Video group; always 0 for single-session recordings.
    pub set_id: i64,
    pub frame: u64,
    pub corners: Vec<[f64; 2]>,
    pub ids: Vec<i64>,
}

impl CalibrationRow {
    /// Build a row, checking that corners and ids are parallel.
    pub fn from_detection(
        camera: &str,
        set_id: i64,
        frame: u64,
        detection: Detection,
    ) -> CalibrationResult<Self> {
        if detection.corners.len() != detection.ids.len() {
            return Err(CalibrationError::detector(
                camera,
                frame,
                format!(
                    "{} corners but {} ids",
                    detection.corners.len(),
                    detection.ids.len()
                ),
            ));
        }
        Ok(Self {
            set_id,
            frame,
            corners: detection.corners,
            ids: detection.ids,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// All detections for one camera, in frame order.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionTable {
    pub camera: String,
    /// (width, height); attached before fitting.
    pub image_size: Option<(u32, u32)>,
    pub rows: Vec<CalibrationRow>,
}

impl DetectionTable {
    pub fn new(camera: impl Into<String>) -> Self {
        Self {
            camera: camera.into(),
            image_size: None,
            rows: Vec::new(),
        }
    }

    pub fn corner_count(&self) -> usize {
        self.rows.iter().map(|r| r.len()).sum()
    }
}

/// Fitted parameters for one camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraParameters {
    pub name: String,
    pub size: (u32, u32),
    /// 3x3 intrinsic matrix, row major.
    pub matrix: [[f64; 3]; 3],
    pub distortions: Vec<f64>,
    /// Rodrigues rotation vector relative to the reference camera.
    pub rotation: [f64; 3],
    pub translation: [f64; 3],
}

/// Result of a camera group fit.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraCalibration {
    /// One entry per camera, in camera order.
    pub cameras: Vec<CameraParameters>,
    /// Mean reprojection error in pixels.
    pub reprojection_error: f64,
}

impl CameraCalibration {
    pub fn camera(&self, name: &str) -> Option<&CameraParameters> {
        self.cameras.iter().find(|c| c.name == name)
    }

    pub fn camera_names(&self) -> Vec<&str> {
        self.cameras.iter().map(|c| c.name.as_str()).collect()
    }
}

/// What a successful calibration run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationOutcome {
    /// Detection tables in camera order.
    pub tables: Vec<DetectionTable>,
    pub calibration: CameraCalibration,
    /// Frames handed to the detector across all cameras.
    pub frames_visited: u64,
}

/// Initial estimation switches passed to the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitOptions {
    pub init_intrinsics: bool,
    pub init_extrinsics: bool,
}

impl FitOptions {
    /// Fresh calibration: estimate everything.
    pub fn initial() -> Self {
        Self {
            init_intrinsics: true,
            init_extrinsics: true,
        }
    }

    /// Refinement of an existing calibration.
    pub fn refine() -> Self {
        Self {
            init_intrinsics: false,
            init_extrinsics: false,
        }
    }
}

impl Default for FitOptions {
    fn default() -> Self {
        Self::initial()
    }
}

/// Calibration target board layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardKind {
    Charuco,
    Checkerboard,
}

impl BoardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoardKind::Charuco => "Charuco",
            BoardKind::Checkerboard => "Checkerboard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Charuco" => Some(BoardKind::Charuco),
            "Checkerboard" => Some(BoardKind::Checkerboard),
            _ => None,
        }
    }
}

impl fmt::Display for BoardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
