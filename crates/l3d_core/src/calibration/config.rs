//! Calibration settings resolved from the parameter tree.

use super::target::{TargetModel, TargetSpec};
use super::types::{BoardKind, CalibrationError, CalibrationResult, CameraCalibration, FitOptions};
use crate::params::{names, ParameterTree};

/// Everything a calibration job needs besides frame sources and
/// collaborators.
#[derive(Debug, Clone)]
pub struct CalibrationConfig {
    pub cameras: Vec<String>,
    pub target: TargetModel,
    /// Detect on every nth frame.
    pub frame_step: u64,
    pub fit: FitOptions,
    /// Starting point for refinement runs.
    pub initial: Option<CameraCalibration>,
}

impl CalibrationConfig {
    /// Read the `Calibration` group for the given cameras.
    pub fn from_parameters(tree: &ParameterTree, cameras: &[String]) -> CalibrationResult<Self> {
        if cameras.is_empty() {
            return Err(CalibrationError::configuration("no cameras to calibrate"));
        }

        let p = |name: &str| format!("{}/{}", names::CALIBRATION, name);

        let kind_label = tree.get_str(&p(names::TYPE))?;
        let kind = BoardKind::parse(kind_label).ok_or_else(|| {
            CalibrationError::configuration(format!("unknown board type '{}'", kind_label))
        })?;

        let frame_step = tree.get_int(&p(names::FRAME_STEP))?;
        if frame_step < 1 {
            return Err(CalibrationError::configuration(format!(
                "frame step must be at least 1, got {}",
                frame_step
            )));
        }

        let target = TargetSpec {
            kind,
            squares_x: positive(tree.get_int(&p(names::SQUARES_X))?, names::SQUARES_X)?,
            squares_y: positive(tree.get_int(&p(names::SQUARES_Y))?, names::SQUARES_Y)?,
            square_size: tree.get_float(&p(names::SQUARE_SIZE))?,
            marker_size: tree.get_float(&p(names::MARKER_SIZE))?,
            marker_bits: positive(tree.get_int(&p(names::MARKER_BITS))?, names::MARKER_BITS)?,
            dictionary_size: positive(
                tree.get_int(&p(names::DICTIONARY_SIZE))?,
                names::DICTIONARY_SIZE,
            )?,
        }
        .validate()?;

        Ok(Self {
            cameras: cameras.to_vec(),
            target,
            frame_step: frame_step as u64,
            fit: FitOptions::initial(),
            initial: None,
        })
    }

    /// Turn this into a refinement of `existing`.
    pub fn refining(mut self, existing: CameraCalibration) -> CalibrationResult<Self> {
        let names = existing.camera_names();
        if names != self.cameras.iter().map(|s| s.as_str()).collect::<Vec<_>>() {
            return Err(CalibrationError::configuration(format!(
                "existing calibration covers cameras [{}], project has [{}]",
                names.join(", "),
                self.cameras.join(", ")
            )));
        }
        self.fit = FitOptions::refine();
        self.initial = Some(existing);
        Ok(self)
    }

    /// Frames visited for a video of `frame_count` frames.
    pub fn frames_for(&self, frame_count: u64) -> u64 {
        frame_count.div_ceil(self.frame_step)
    }
}

fn positive(value: i64, name: &str) -> CalibrationResult<u32> {
    u32::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| {
            CalibrationError::configuration(format!("'{}' must be positive, got {}", name, value))
        })
}
