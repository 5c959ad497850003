//! Calibration board geometry.

use super::types::{BoardKind, CalibrationError, CalibrationResult};

/// Board geometry as configured by the user.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSpec {
    pub kind: BoardKind,
    pub squares_x: u32,
    pub squares_y: u32,
    /// Square edge length (mm).
    pub square_size: f64,
    /// Marker edge length (mm); Charuco only.
    pub marker_size: f64,
    pub marker_bits: u32,
    /// Number of markers in the ArUco dictionary.
    pub dictionary_size: u32,
}

impl TargetSpec {
    /// Check the geometry and build the model handed to detector and solver.
    pub fn validate(self) -> CalibrationResult<TargetModel> {
        if self.squares_x < 2 || self.squares_y < 2 {
            return Err(CalibrationError::configuration(format!(
                "board needs at least 2x2 squares, got {}x{}",
                self.squares_x, self.squares_y
            )));
        }
        if !(self.square_size.is_finite() && self.square_size > 0.0) {
            return Err(CalibrationError::configuration(format!(
                "square size must be positive, got {}",
                self.square_size
            )));
        }

        if self.kind == BoardKind::Charuco {
            if !(self.marker_size.is_finite() && self.marker_size > 0.0) {
                return Err(CalibrationError::configuration(format!(
                    "marker size must be positive, got {}",
                    self.marker_size
                )));
            }
            if self.marker_size >= self.square_size {
                return Err(CalibrationError::configuration(format!(
                    "marker size {} must be smaller than square size {}",
                    self.marker_size, self.square_size
                )));
            }
            if self.marker_bits == 0 {
                return Err(CalibrationError::configuration("marker bits must be at least 1"));
            }
            // Markers sit on every other square
            let needed = (self.squares_x * self.squares_y).div_ceil(2);
            if self.dictionary_size < needed {
                return Err(CalibrationError::configuration(format!(
                    "dictionary of {} markers is too small for a {}x{} board ({} needed)",
                    self.dictionary_size, self.squares_x, self.squares_y, needed
                )));
            }
        }

        Ok(TargetModel { spec: self })
    }
}

/// A validated calibration board.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetModel {
    spec: TargetSpec,
}

impl TargetModel {
    pub fn spec(&self) -> &TargetSpec {
        &self.spec
    }

    pub fn kind(&self) -> BoardKind {
        self.spec.kind
    }

    /// Number of inner corners, i.e. the largest possible detection.
    pub fn corner_count(&self) -> usize {
        ((self.spec.squares_x - 1) * (self.spec.squares_y - 1)) as usize
    }

    /// Board-frame coordinates of inner corner `id`, row major from the
    /// origin corner, z = 0.
    pub fn object_point(&self, id: i64) -> Option<[f64; 3]> {
        let cols = i64::from(self.spec.squares_x - 1);
        if id < 0 || id as usize >= self.corner_count() {
            return None;
        }
        let s = self.spec.square_size;
        Some([(id % cols) as f64 * s, (id / cols) as f64 * s, 0.0])
    }

    /// All inner corner coordinates, indexed by corner id.
    pub fn object_points(&self) -> Vec<[f64; 3]> {
        (0..self.corner_count() as i64)
            .filter_map(|id| self.object_point(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TargetSpec {
        TargetSpec {
            kind: BoardKind::Charuco,
            squares_x: 6,
            squares_y: 6,
            square_size: 24.33,
            marker_size: 17.0,
            marker_bits: 5,
            dictionary_size: 50,
        }
    }

    #[test]
    fn default_board_is_valid() {
        let model = spec().validate().unwrap();
        assert_eq!(model.corner_count(), 25);
        assert_eq!(model.object_points().len(), 25);
        assert_eq!(model.object_point(0), Some([0.0, 0.0, 0.0]));
        let p = model.object_point(6).unwrap();
        assert!((p[0] - 24.33).abs() < 1e-12 && (p[1] - 24.33).abs() < 1e-12);
        assert_eq!(model.object_point(25), None);
    }

    #[test]
    fn rejects_bad_geometry() {
        let mut s = spec();
        s.squares_x = 1;
        assert!(s.validate().is_err());

        let mut s = spec();
        s.marker_size = 30.0;
        assert!(matches!(s.validate(), Err(CalibrationError::Configuration(_))));

        let mut s = spec();
        s.dictionary_size = 10;
        assert!(s.validate().is_err());

        let mut s = spec();
        s.square_size = 0.0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn checkerboard_ignores_marker_fields() {
        let mut s = spec();
        s.kind = BoardKind::Checkerboard;
        s.marker_size = 100.0;
        s.dictionary_size = 0;
        assert!(s.validate().is_ok());
    }
}
