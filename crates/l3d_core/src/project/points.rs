//! Post-calibration observation table.

use std::collections::BTreeMap;
use std::fmt;

use crate::calibration::DetectionTable;

/// Where an observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointSource {
    /// Found by the board detector.
    Auto,
    /// Placed by hand.
    Manual,
}

impl PointSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointSource::Auto => "auto",
            PointSource::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(PointSource::Auto),
            "manual" => Some(PointSource::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for PointSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row key: one board corner in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PointKey {
    pub set_id: i64,
    pub frame: u64,
    pub marker_id: i64,
}

impl PointKey {
    pub fn new(set_id: i64, frame: u64, marker_id: i64) -> Self {
        Self {
            set_id,
            frame,
            marker_id,
        }
    }
}

/// One `(camera, source)` column holding `(x, y)` pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointColumn {
    pub camera: String,
    pub source: PointSource,
}

impl PointColumn {
    pub fn new(camera: impl Into<String>, source: PointSource) -> Self {
        Self {
            camera: camera.into(),
            source,
        }
    }
}

/// Observations keyed by `(set_id, frame, marker_id)`, one optional `(x, y)`
/// per column. Rows are kept sorted by key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointsTable {
    columns: Vec<PointColumn>,
    rows: BTreeMap<PointKey, Vec<Option<[f64; 2]>>>,
}

impl PointsTable {
    pub fn new(columns: Vec<PointColumn>) -> Self {
        Self {
            columns,
            rows: BTreeMap::new(),
        }
    }

    /// Build the table from finished detection tables, one `auto` column per
    /// camera in table order.
    ///
    /// A marker id seen twice in the same frame of one camera keeps the last
    /// position.
    pub fn from_detections(tables: &[DetectionTable]) -> Self {
        let columns = tables
            .iter()
            .map(|t| PointColumn::new(&t.camera, PointSource::Auto))
            .collect();
        let mut points = Self::new(columns);
        let width = tables.len();

        for (col, table) in tables.iter().enumerate() {
            for row in &table.rows {
                for (corner, id) in row.corners.iter().zip(&row.ids) {
                    let key = PointKey::new(row.set_id, row.frame, *id);
                    let values = points.rows.entry(key).or_insert_with(|| vec![None; width]);
                    values[col] = Some(*corner);
                }
            }
        }

        points
    }

    pub fn columns(&self) -> &[PointColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = (&PointKey, &[Option<[f64; 2]>])> {
        self.rows.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Position of `key` in the first column for `camera`.
    pub fn get(&self, key: &PointKey, camera: &str) -> Option<[f64; 2]> {
        let col = self.columns.iter().position(|c| c.camera == camera)?;
        self.rows.get(key).and_then(|values| values[col])
    }

    /// Insert or replace a row. Returns `false` (and leaves the table alone)
    /// if `values` does not have one entry per column.
    pub fn insert(&mut self, key: PointKey, values: Vec<Option<[f64; 2]>>) -> bool {
        if values.len() != self.columns.len() {
            return false;
        }
        self.rows.insert(key, values);
        true
    }
}
