//! Project document (TOML) reading and writing.
//!
//! Layout:
//!
//! ```toml
//! # Label3D project
//! save_date = 2026-10-14T09:30:00+02:00
//!
//! [Parameters]               # the parameter tree, groups as tables
//! [Calibration]              # reprojection_error + [Calibration.cam_N]
//! [Points]                   # index / columns / data arrays
//! ```
//!
//! Parameter leaves are bare values for plain scalars and tagged inline
//! tables for everything else (`{ type = "list", value = .., limits = [..] }`).
//! Unknown keys and unknown tags are skipped on load.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Local, SecondsFormat};
use toml_edit::{value, Array, Datetime, DocumentMut, InlineTable, Item, Table, Value};

use super::points::{PointColumn, PointKey, PointSource, PointsTable};
use super::types::{ProjectError, ProjectResult};
use crate::calibration::{CameraCalibration, CameraParameters};
use crate::config::atomic_write;
use crate::params::{FileMode, ParamValue, Parameter, ParameterNode, ParameterTree, RESERVED_PREFIX};

pub const PARAMETERS: &str = "Parameters";
pub const CALIBRATION: &str = "Calibration";
pub const POINTS: &str = "Points";

const SAVE_DATE: &str = "save_date";
const INCOMPLETE: &str = "incomplete_sections";
/// Explicit child order, written only when tables would reorder a group.
const ORDER_KEY: &str = "__order";

const HEADER: &str = "# Label3D project file\n\
                      # Parameters, calibration results and detected points.\n\n";

const INDEX_NAMES: [&str; 3] = ["set", "frame", "id"];
const COLUMN_NAMES: [&str; 3] = ["camera", "type", "axis"];

/// Outcome of a save.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveReport {
    Written { path: PathBuf },
    /// Some sections could not be serialized; the rest was written.
    Partial {
        path: PathBuf,
        failed: Vec<SectionFailure>,
    },
    /// The file exists and overwriting was not requested.
    SkippedExisting { path: PathBuf },
}

impl SaveReport {
    pub fn is_complete(&self) -> bool {
        matches!(self, SaveReport::Written { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectionFailure {
    pub section: String,
    pub message: String,
}

/// Everything read back from a project file.
#[derive(Debug, PartialEq)]
pub struct ProjectDocument {
    pub tree: ParameterTree,
    pub calibration: Option<CameraCalibration>,
    pub points: Option<PointsTable>,
    pub save_date: Option<DateTime<FixedOffset>>,
    /// Sections a previous save failed to write.
    pub incomplete_sections: Vec<String>,
}

/// Write a project file.
///
/// An existing file is left alone unless `overwrite` is set.
pub fn save_document(
    path: &Path,
    tree: &ParameterTree,
    calibration: Option<&CameraCalibration>,
    points: Option<&PointsTable>,
    overwrite: bool,
) -> ProjectResult<SaveReport> {
    if path.exists() && !overwrite {
        tracing::warn!("[Project] {} exists, not overwriting", path.display());
        return Ok(SaveReport::SkippedExisting {
            path: path.to_path_buf(),
        });
    }

    let save_date = Local::now().to_rfc3339_opts(SecondsFormat::Secs, false);
    let (text, failed) = render_document(tree, calibration, points, &save_date);

    atomic_write(path, &text).map_err(|source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if failed.is_empty() {
        tracing::info!("[Project] Saved {}", path.display());
        Ok(SaveReport::Written {
            path: path.to_path_buf(),
        })
    } else {
        for f in &failed {
            tracing::error!("[Project] Section {} not saved: {}", f.section, f.message);
        }
        Ok(SaveReport::Partial {
            path: path.to_path_buf(),
            failed,
        })
    }
}

/// Render the document text. Sections that fail to serialize are left out
/// and listed under `incomplete_sections`.
pub fn render_document(
    tree: &ParameterTree,
    calibration: Option<&CameraCalibration>,
    points: Option<&PointsTable>,
    save_date: &str,
) -> (String, Vec<SectionFailure>) {
    let mut doc = DocumentMut::new();
    let mut failed = Vec::new();

    match save_date.parse::<Datetime>() {
        Ok(dt) => doc[SAVE_DATE] = value(dt),
        Err(_) => doc[SAVE_DATE] = value(save_date),
    }

    let mut sections: Vec<(&str, Result<Table, String>)> =
        vec![(PARAMETERS, Ok(group_table(tree.children())))];
    if let Some(calibration) = calibration {
        sections.push((CALIBRATION, Ok(calibration_table(calibration))));
    }
    if let Some(points) = points {
        sections.push((POINTS, points_table(points)));
    }

    for (name, section) in sections {
        match section {
            Ok(table) => {
                doc.insert(name, Item::Table(table));
            }
            Err(message) => failed.push(SectionFailure {
                section: name.to_string(),
                message,
            }),
        }
    }

    let mut header = HEADER.to_string();
    if !failed.is_empty() {
        let names: Vec<&str> = failed.iter().map(|f| f.section.as_str()).collect();
        doc[INCOMPLETE] = value(Array::from_iter(names.iter().copied()));
        header.push_str(&format!(
            "# INCOMPLETE SAVE: sections not written: {}\n\n",
            names.join(", ")
        ));
    }

    (format!("{}{}", header, doc), failed)
}

/// Read a project file.
pub fn load_document(path: &Path) -> ProjectResult<ProjectDocument> {
    let text = fs::read_to_string(path).map_err(|source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc = parse_document(&text, path)?;
    tracing::info!("[Project] Loaded {}", path.display());
    Ok(doc)
}

/// Parse document text; `path` is only used in error messages.
pub fn parse_document(text: &str, path: &Path) -> ProjectResult<ProjectDocument> {
    let doc: DocumentMut = text.parse().map_err(|source| ProjectError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let tree = match doc.get(PARAMETERS).and_then(Item::as_table) {
        Some(table) => ParameterTree::from_children(read_group_table(table, "")?)?,
        None => {
            tracing::warn!("[Project] No [{}] section, using an empty tree", PARAMETERS);
            ParameterTree::new()
        }
    };

    let calibration = doc
        .get(CALIBRATION)
        .and_then(Item::as_table)
        .map(read_calibration)
        .transpose()?;

    let points = doc
        .get(POINTS)
        .and_then(Item::as_table)
        .map(read_points)
        .transpose()?;

    let save_date = doc.get(SAVE_DATE).and_then(|item| {
        let raw = match item.as_value()? {
            Value::Datetime(dt) => dt.value().to_string(),
            Value::String(s) => s.value().clone(),
            _ => return None,
        };
        DateTime::parse_from_rfc3339(&raw).ok()
    });

    let incomplete_sections = doc
        .get(INCOMPLETE)
        .and_then(Item::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();

    Ok(ProjectDocument {
        tree,
        calibration,
        points,
        save_date,
        incomplete_sections,
    })
}

/// Write the calibration alone, one `[cam_N]` table per camera (from 0)
/// plus `[metadata]`, for reconstruction tools.
pub fn export_calibration(calibration: &CameraCalibration, path: &Path) -> ProjectResult<()> {
    let mut doc = DocumentMut::new();
    for (i, camera) in calibration.cameras.iter().enumerate() {
        doc.insert(&format!("cam_{}", i), Item::Table(camera_table(camera)));
    }
    let mut metadata = Table::new();
    metadata.insert("adjusted", value(false));
    metadata.insert("error", value(calibration.reprojection_error));
    doc.insert("metadata", Item::Table(metadata));

    atomic_write(path, &doc.to_string()).map_err(|source| ProjectError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("[Project] Exported calibration to {}", path.display());
    Ok(())
}

// Parameters

fn group_table(children: &[Parameter]) -> Table {
    let mut table = Table::new();
    table.set_implicit(false);

    let mut seen_group = false;
    let mut needs_order = false;
    for child in children {
        match &child.node {
            ParameterNode::Group(grandchildren) => {
                seen_group = true;
                table.insert(&child.name, Item::Table(group_table(grandchildren)));
            }
            node => {
                needs_order |= seen_group;
                table.insert(&child.name, Item::Value(leaf_value(node)));
            }
        }
    }

    // Values always print before sub-tables
    if needs_order {
        table.insert(
            ORDER_KEY,
            value(Array::from_iter(children.iter().map(|c| c.name.as_str()))),
        );
    }
    table
}

fn leaf_value(node: &ParameterNode) -> Value {
    match node {
        ParameterNode::Scalar {
            value,
            readonly: false,
        } => scalar_value(value),
        ParameterNode::Scalar {
            value,
            readonly: true,
        } => tagged(
            value.kind().as_str(),
            vec![("value", scalar_value(value)), ("readonly", Value::from(true))],
        ),
        ParameterNode::Choice { value, limits } => tagged(
            "list",
            vec![
                ("value", Value::from(value.as_str())),
                (
                    "limits",
                    Value::from(Array::from_iter(limits.iter().map(String::as_str))),
                ),
            ],
        ),
        ParameterNode::FilePath { value, mode } => tagged(
            "file",
            vec![
                ("value", Value::from(value.as_str())),
                ("mode", Value::from(mode.as_str())),
            ],
        ),
        ParameterNode::Action => tagged("action", Vec::new()),
        ParameterNode::Group(children) => {
            let mut inline = InlineTable::new();
            for child in children {
                inline.insert(&child.name, leaf_value(&child.node));
            }
            Value::from(inline)
        }
    }
}

fn scalar_value(value: &ParamValue) -> Value {
    match value {
        ParamValue::Str(s) => Value::from(s.as_str()),
        ParamValue::Int(i) => Value::from(*i),
        ParamValue::Float(f) => Value::from(*f),
        ParamValue::Bool(b) => Value::from(*b),
    }
}

fn tagged(tag: &str, fields: Vec<(&str, Value)>) -> Value {
    let mut inline = InlineTable::new();
    inline.insert("type", Value::from(tag));
    for (key, v) in fields {
        inline.insert(key, v);
    }
    Value::from(inline)
}

fn read_group_table(table: &Table, path: &str) -> ProjectResult<Vec<Parameter>> {
    let mut children = Vec::new();
    let mut order: Option<Vec<String>> = None;

    for (key, item) in table.iter() {
        if key == ORDER_KEY {
            if let Some(arr) = item.as_array() {
                order = Some(arr.iter().filter_map(|v| v.as_str().map(String::from)).collect());
                continue;
            }
        }
        let child_path = join(path, key);
        if is_reserved(key, &child_path) {
            continue;
        }
        match item {
            Item::Table(sub) => {
                children.push(Parameter::group(key, read_group_table(sub, &child_path)?));
            }
            Item::Value(v) => {
                if let Some(node) = read_value_node(v, &child_path)? {
                    children.push(Parameter::new(key, node));
                }
            }
            Item::ArrayOfTables(_) | Item::None => {
                tracing::warn!("[Project] Skipping unsupported parameter entry '{}'", child_path);
            }
        }
    }

    if let Some(order) = order {
        children.sort_by_key(|c| order.iter().position(|n| *n == c.name).unwrap_or(usize::MAX));
    }
    Ok(children)
}

fn read_value_node(v: &Value, path: &str) -> ProjectResult<Option<ParameterNode>> {
    match v {
        Value::InlineTable(inline) => read_inline(inline, path),
        Value::Array(_) => {
            tracing::warn!("[Project] Skipping array parameter '{}'", path);
            Ok(None)
        }
        other => Ok(bare_scalar(other).map(|value| ParameterNode::Scalar {
            value,
            readonly: false,
        })),
    }
}

fn bare_scalar(v: &Value) -> Option<ParamValue> {
    match v {
        Value::String(s) => Some(ParamValue::Str(s.value().clone())),
        Value::Integer(i) => Some(ParamValue::Int(*i.value())),
        Value::Float(f) => Some(ParamValue::Float(*f.value())),
        Value::Boolean(b) => Some(ParamValue::Bool(*b.value())),
        Value::Datetime(dt) => Some(ParamValue::Str(dt.value().to_string())),
        Value::Array(_) | Value::InlineTable(_) => None,
    }
}

fn read_inline(inline: &InlineTable, path: &str) -> ProjectResult<Option<ParameterNode>> {
    let tag = inline.get("type").and_then(Value::as_str);
    let malformed = |message: String| ProjectError::malformed(PARAMETERS, format!("{}: {}", path, message));

    let node = match tag {
        None => read_inline_group(inline, path, false)?,
        Some("group") => read_inline_group(inline, path, true)?,
        Some(kind @ ("str" | "int" | "float" | "bool")) => {
            let raw = inline
                .get("value")
                .and_then(bare_scalar)
                .ok_or_else(|| malformed(format!("missing value for {} node", kind)))?;
            let value = match (kind, raw) {
                ("float", ParamValue::Int(i)) => ParamValue::Float(i as f64),
                (_, v) => v,
            };
            if value.kind().as_str() != kind {
                return Err(malformed(format!(
                    "tagged {} but value is {}",
                    kind,
                    value.kind().as_str()
                )));
            }
            let readonly = inline.get("readonly").and_then(Value::as_bool).unwrap_or(false);
            ParameterNode::Scalar { value, readonly }
        }
        Some("list") => {
            let value = inline
                .get("value")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed("list without a string value".to_string()))?;
            let limits: Vec<String> = inline
                .get("limits")
                .and_then(Value::as_array)
                .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
                .ok_or_else(|| malformed("list without limits".to_string()))?;
            if !limits.iter().any(|l| l == value) {
                return Err(malformed(format!("'{}' is not one of [{}]", value, limits.join(", "))));
            }
            ParameterNode::Choice {
                value: value.to_string(),
                limits,
            }
        }
        Some("file") => {
            let value = inline.get("value").and_then(Value::as_str).unwrap_or_default();
            let mode = match inline.get("mode").and_then(Value::as_str) {
                Some(m) => FileMode::parse(m)
                    .ok_or_else(|| malformed(format!("unknown file mode '{}'", m)))?,
                None => FileMode::default(),
            };
            ParameterNode::FilePath {
                value: value.to_string(),
                mode,
            }
        }
        Some("action") => ParameterNode::Action,
        Some(other) => {
            tracing::warn!("[Project] Skipping '{}' with unknown type '{}'", path, other);
            return Ok(None);
        }
    };
    Ok(Some(node))
}

fn read_inline_group(inline: &InlineTable, path: &str, tagged: bool) -> ProjectResult<ParameterNode> {
    let mut children = Vec::new();
    for (key, v) in inline.iter() {
        if tagged && key == "type" {
            continue;
        }
        let child_path = join(path, key);
        if is_reserved(key, &child_path) {
            continue;
        }
        if let Some(node) = read_value_node(v, &child_path)? {
            children.push(Parameter::new(key, node));
        }
    }
    Ok(ParameterNode::Group(children))
}

/// Bookkeeping keys never become nodes.
fn is_reserved(key: &str, path: &str) -> bool {
    if key.starts_with(RESERVED_PREFIX) {
        tracing::warn!("[Project] Skipping reserved key '{}'", path);
        return true;
    }
    false
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", path, name)
    }
}

// Calibration

fn calibration_table(calibration: &CameraCalibration) -> Table {
    let mut table = Table::new();
    table.insert("reprojection_error", value(calibration.reprojection_error));
    for (i, camera) in calibration.cameras.iter().enumerate() {
        table.insert(&format!("cam_{}", i + 1), Item::Table(camera_table(camera)));
    }
    table
}

fn camera_table(camera: &CameraParameters) -> Table {
    let mut table = Table::new();
    table.insert("name", value(camera.name.as_str()));
    table.insert(
        "size",
        value(Array::from_iter([i64::from(camera.size.0), i64::from(camera.size.1)])),
    );
    table.insert(
        "matrix",
        value(Array::from_iter(
            camera.matrix.iter().map(|row| Array::from_iter(row.iter().copied())),
        )),
    );
    table.insert(
        "distortions",
        value(Array::from_iter(camera.distortions.iter().copied())),
    );
    table.insert("rotation", value(Array::from_iter(camera.rotation.iter().copied())));
    table.insert(
        "translation",
        value(Array::from_iter(camera.translation.iter().copied())),
    );
    table
}

fn read_calibration(table: &Table) -> ProjectResult<CameraCalibration> {
    let err = |m: String| ProjectError::malformed(CALIBRATION, m);

    let reprojection_error = table
        .get("reprojection_error")
        .and_then(Item::as_value)
        .and_then(number)
        .ok_or_else(|| err("missing reprojection_error".to_string()))?;

    let mut cams: Vec<(usize, &Table)> = table
        .iter()
        .filter_map(|(key, item)| {
            let n = key.strip_prefix("cam_")?.parse::<usize>().ok()?;
            Some((n, item.as_table()?))
        })
        .collect();
    cams.sort_by_key(|(n, _)| *n);

    let cameras = cams
        .into_iter()
        .map(|(n, t)| read_camera(t).map_err(|m| err(format!("cam_{}: {}", n, m))))
        .collect::<ProjectResult<Vec<_>>>()?;

    Ok(CameraCalibration {
        cameras,
        reprojection_error,
    })
}

fn read_camera(table: &Table) -> Result<CameraParameters, String> {
    let array = |key: &str| {
        table
            .get(key)
            .and_then(Item::as_array)
            .ok_or_else(|| format!("missing {}", key))
    };

    let name = table
        .get("name")
        .and_then(Item::as_str)
        .ok_or_else(|| "missing name".to_string())?
        .to_string();

    let size = numbers(array("size")?, "size")?;
    let (w, h) = match size.as_slice() {
        [w, h] if *w >= 0.0 && *h >= 0.0 => (*w as u32, *h as u32),
        _ => return Err("size must be [width, height]".to_string()),
    };

    let rows: Vec<Vec<f64>> = array("matrix")?
        .iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| "matrix rows must be arrays".to_string())
                .and_then(|r| numbers(r, "matrix"))
        })
        .collect::<Result<_, _>>()?;
    let mut matrix = [[0.0; 3]; 3];
    if rows.len() != 3 || rows.iter().any(|r| r.len() != 3) {
        return Err("matrix must be 3x3".to_string());
    }
    for (dst, src) in matrix.iter_mut().zip(&rows) {
        dst.copy_from_slice(src);
    }

    Ok(CameraParameters {
        name,
        size: (w, h),
        matrix,
        distortions: numbers(array("distortions")?, "distortions")?,
        rotation: triple(numbers(array("rotation")?, "rotation")?, "rotation")?,
        translation: triple(numbers(array("translation")?, "translation")?, "translation")?,
    })
}

fn number(v: &Value) -> Option<f64> {
    v.as_float().or_else(|| v.as_integer().map(|i| i as f64))
}

fn numbers(arr: &Array, what: &str) -> Result<Vec<f64>, String> {
    arr.iter()
        .map(|v| number(v).ok_or_else(|| format!("{} must contain numbers", what)))
        .collect()
}

fn triple(values: Vec<f64>, what: &str) -> Result<[f64; 3], String> {
    <[f64; 3]>::try_from(values).map_err(|_| format!("{} must have 3 entries", what))
}

// Points

fn points_table(points: &PointsTable) -> Result<Table, String> {
    let mut columns = Array::new();
    for column in points.columns() {
        for axis in ["x", "y"] {
            columns.push(Array::from_iter([
                column.camera.as_str(),
                column.source.as_str(),
                axis,
            ]));
        }
    }

    let mut index = Array::new();
    let mut data = Array::new();
    for (key, values) in points.rows() {
        let frame = i64::try_from(key.frame)
            .map_err(|_| format!("frame {} does not fit a TOML integer", key.frame))?;
        index.push(Array::from_iter([key.set_id, frame, key.marker_id]));

        let mut row = Array::new();
        for v in values {
            let [x, y] = v.unwrap_or([f64::NAN, f64::NAN]);
            row.push(x);
            row.push(y);
        }
        data.push(row);
    }

    for arr in [&mut columns, &mut index, &mut data] {
        one_per_line(arr);
    }

    let mut table = Table::new();
    table.insert("index_names", value(Array::from_iter(INDEX_NAMES)));
    table.insert("column_names", value(Array::from_iter(COLUMN_NAMES)));
    table.insert("columns", value(columns));
    table.insert("index", value(index));
    table.insert("data", value(data));
    Ok(table)
}

fn one_per_line(arr: &mut Array) {
    if arr.is_empty() {
        return;
    }
    for item in arr.iter_mut() {
        item.decor_mut().set_prefix("\n    ");
    }
    arr.set_trailing("\n");
    arr.set_trailing_comma(true);
}

fn read_points(table: &Table) -> ProjectResult<PointsTable> {
    let err = |m: String| ProjectError::malformed(POINTS, m);
    let array = |key: &str| {
        table
            .get(key)
            .and_then(Item::as_array)
            .ok_or_else(|| err(format!("missing {}", key)))
    };

    let labels: Vec<[String; 3]> = array("columns")?
        .iter()
        .map(|v| {
            let parts: Vec<String> = v
                .as_array()
                .map(|a| a.iter().filter_map(|s| s.as_str().map(String::from)).collect())
                .unwrap_or_default();
            <[String; 3]>::try_from(parts).map_err(|_| err("column labels must be [camera, type, axis]".to_string()))
        })
        .collect::<ProjectResult<_>>()?;

    if labels.len() % 2 != 0 {
        return Err(err("columns must come in x/y pairs".to_string()));
    }
    let mut columns = Vec::with_capacity(labels.len() / 2);
    for pair in labels.chunks(2) {
        let (x, y) = (&pair[0], &pair[1]);
        if x[0] != y[0] || x[1] != y[1] || x[2] != "x" || y[2] != "y" {
            return Err(err(format!("columns {:?} and {:?} are not an x/y pair", x, y)));
        }
        let source = PointSource::parse(&x[1])
            .ok_or_else(|| err(format!("unknown point type '{}'", x[1])))?;
        columns.push(PointColumn::new(x[0].clone(), source));
    }

    let index = array("index")?;
    let data = array("data")?;
    if index.len() != data.len() {
        return Err(err(format!("{} index rows but {} data rows", index.len(), data.len())));
    }

    let mut points = PointsTable::new(columns);
    for (key, row) in index.iter().zip(data.iter()) {
        let key = key
            .as_array()
            .map(|a| a.iter().filter_map(Value::as_integer).collect::<Vec<_>>())
            .unwrap_or_default();
        let key = match key.as_slice() {
            [set_id, frame, marker_id] if *frame >= 0 => PointKey::new(*set_id, *frame as u64, *marker_id),
            _ => return Err(err(format!("bad index entry {:?}", key))),
        };

        let values = row
            .as_array()
            .ok_or_else(|| err("data rows must be arrays".to_string()))
            .and_then(|a| numbers(a, "data").map_err(err))?;
        let pairs = values
            .chunks(2)
            .map(|xy| match xy {
                [x, y] if !x.is_nan() && !y.is_nan() => Some([*x, *y]),
                _ => None,
            })
            .collect::<Vec<_>>();

        if values.len() != 2 * points.columns().len() || !points.insert(key, pairs) {
            return Err(err(format!(
                "row {:?} has {} values, expected {}",
                key,
                values.len(),
                2 * points.columns().len()
            )));
        }
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{names, ParamError};
    use tempfile::tempdir;

    const DATE: &str = "2026-10-14T09:30:00+02:00";

    fn sample_tree() -> ParameterTree {
        ParameterTree::from_children(vec![
            Parameter::group(
                names::VIDEOS,
                vec![Parameter::group(
                    "camA",
                    vec![
                        Parameter::scalar(names::FILE, "a.mp4"),
                        Parameter::readonly(names::FRAME_COUNT, 1000i64),
                        Parameter::readonly(names::FRAME_RATE, "30"),
                        Parameter::readonly(names::AUDIO, true),
                    ],
                )],
            ),
            Parameter::group(
                names::SYNCHRONIZATION,
                vec![
                    Parameter::choice(
                        names::METHOD,
                        "Timecode",
                        vec!["None".into(), "Timecode".into(), "Audio".into()],
                    ),
                    Parameter::action(names::SYNCHRONIZE),
                ],
            ),
            Parameter::group(
                names::CALIBRATION,
                vec![
                    Parameter::scalar(names::FRAME_STEP, 40i64),
                    Parameter::scalar(names::SQUARE_SIZE, 24.0),
                    Parameter::scalar("Enabled", false),
                    Parameter::file(names::OUTPUT_FILE, "out/cal.toml", FileMode::Save),
                    Parameter::group("Empty", vec![]),
                    Parameter::scalar("After group", 1.5),
                ],
            ),
        ])
        .unwrap()
    }

    fn sample_calibration() -> CameraCalibration {
        let cam = |name: &str, tx: f64| CameraParameters {
            name: name.into(),
            size: (1920, 1080),
            matrix: [[1400.5, 0.0, 960.0], [0.0, 1400.5, 540.0], [0.0, 0.0, 1.0]],
            distortions: vec![-0.1, 0.01, 0.0, 0.0, 0.0],
            rotation: [0.0, 0.1, -0.2],
            translation: [tx, 0.0, 0.5],
        };
        CameraCalibration {
            cameras: vec![cam("camA", 0.0), cam("camB", -120.25)],
            reprojection_error: 0.3125,
        }
    }

    fn sample_points() -> PointsTable {
        let mut p = PointsTable::new(vec![
            PointColumn::new("camA", PointSource::Auto),
            PointColumn::new("camB", PointSource::Auto),
        ]);
        p.insert(PointKey::new(0, 0, 3), vec![Some([1.25, 2.5]), None]);
        p.insert(PointKey::new(0, 40, 1), vec![Some([3.0, 4.0]), Some([5.5, 6.75])]);
        p
    }

    #[test]
    fn round_trip_all_sections() {
        let tree = sample_tree();
        let cal = sample_calibration();
        let points = sample_points();

        let (text, failed) = render_document(&tree, Some(&cal), Some(&points), DATE);
        assert!(failed.is_empty());
        assert!(text.starts_with("# Label3D project file"));

        let doc = parse_document(&text, Path::new("mem.toml")).unwrap();
        assert_eq!(doc.tree, tree);
        assert_eq!(doc.calibration, Some(cal));
        assert_eq!(doc.points, Some(points));
        assert_eq!(doc.save_date, DateTime::parse_from_rfc3339(DATE).ok());
        assert!(doc.incomplete_sections.is_empty());
    }

    #[test]
    fn child_order_survives_tables() {
        let tree = sample_tree();
        let (text, _) = render_document(&tree, None, None, DATE);
        assert!(text.contains(ORDER_KEY));
        let doc = parse_document(&text, Path::new("mem.toml")).unwrap();
        let names: Vec<_> = doc
            .tree
            .get(names::CALIBRATION)
            .unwrap()
            .children()
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert_eq!(names.last().map(String::as_str), Some("After group"));
        assert_eq!(names[4], "Empty");
    }

    #[test]
    fn loads_hand_written_shapes() {
        let text = r#"
            save_date = 2026-01-02T03:04:05Z
            future_key = "ignored"

            [Parameters]
            Name = "demo"
            Count = 3
            Ratio = 0.5
            Nested = { Inner = "x", Deeper = { type = "group", Flag = true } }
            Stamp = 2026-01-02
            Weird = { type = "hologram", value = 1 }
            List = [1, 2]

            [Parameters.Videos.camA]
            File = "a.mp4"

            [Extra]
            anything = 1
        "#;
        let doc = parse_document(text, Path::new("hand.toml")).unwrap();
        let tree = &doc.tree;
        assert_eq!(tree.get_str("Name").unwrap(), "demo");
        assert_eq!(tree.get_int("Count").unwrap(), 3);
        assert_eq!(tree.get_float("Ratio").unwrap(), 0.5);
        assert_eq!(tree.get_str("Nested/Inner").unwrap(), "x");
        assert!(tree.get_bool("Nested/Deeper/Flag").unwrap());
        assert!(tree.get("Nested/Deeper").unwrap().is_group());
        assert_eq!(tree.get_str("Stamp").unwrap(), "2026-01-02");
        assert!(!tree.contains("Weird"));
        assert!(!tree.contains("List"));
        assert_eq!(tree.get_str("Videos/camA/File").unwrap(), "a.mp4");
        assert!(doc.calibration.is_none());
        assert!(doc.points.is_none());
    }

    #[test]
    fn trees_the_loader_would_reject_cannot_be_built() {
        let bad_choice = ParameterTree::from_children(vec![Parameter::group(
            "S",
            vec![Parameter::choice("Method", "Timecode", vec![])],
        )]);
        assert!(matches!(bad_choice, Err(ParamError::InvalidChoice { .. })));

        let shadowed = ParameterTree::from_children(vec![Parameter::group(
            "G",
            vec![Parameter::group("Sub", vec![]), Parameter::scalar(ORDER_KEY, "mine")],
        )]);
        assert_eq!(shadowed.err(), Some(ParamError::InvalidName(ORDER_KEY.into())));

        let mut tree = sample_tree();
        assert!(tree
            .add_child(names::CALIBRATION, Parameter::scalar(ORDER_KEY, "mine"), false)
            .is_err());
        assert!(tree
            .add_child("", Parameter::choice("Mode", "fast", vec!["slow".into()]), false)
            .is_err());
    }

    #[test]
    fn group_with_sub_table_and_choice_round_trips() {
        let tree = ParameterTree::from_children(vec![Parameter::group(
            "S",
            vec![
                Parameter::group("Sub", vec![Parameter::scalar("Depth", 2i64)]),
                Parameter::choice("Method", "Timecode", vec!["None".into(), "Timecode".into()]),
            ],
        )])
        .unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("s.toml");
        assert!(save_document(&path, &tree, None, None, false).unwrap().is_complete());
        assert_eq!(load_document(&path).unwrap().tree, tree);
    }

    #[test]
    fn reserved_keys_are_skipped_on_load() {
        let text = r#"
            [Parameters]
            __note = "written by hand"
            Nested = { __hidden = 1, Kept = 2 }

            [Parameters.G]
            Value = true
            __order = "not an array"
        "#;
        let doc = parse_document(text, Path::new("hand.toml")).unwrap();
        let tree = &doc.tree;
        assert!(!tree.contains("__note"));
        assert_eq!(tree.get("Nested").unwrap().children().len(), 1);
        assert_eq!(tree.get_int("Nested/Kept").unwrap(), 2);
        assert_eq!(tree.get("G").unwrap().children().len(), 1);
    }

    #[test]
    fn tagged_kind_mismatch_is_malformed() {
        let text = "[Parameters]\nX = { type = \"int\", value = \"nope\" }\n";
        assert!(matches!(
            parse_document(text, Path::new("bad.toml")),
            Err(ProjectError::Malformed { .. })
        ));
    }

    #[test]
    fn oversized_frame_gives_partial_document() {
        let mut points = PointsTable::new(vec![PointColumn::new("camA", PointSource::Auto)]);
        points.insert(PointKey::new(0, u64::MAX, 0), vec![Some([1.0, 1.0])]);

        let dir = tempdir().unwrap();
        let path = dir.path().join("p.toml");
        let report = save_document(&path, &sample_tree(), Some(&sample_calibration()), Some(&points), false)
            .unwrap();
        match &report {
            SaveReport::Partial { failed, .. } => assert_eq!(failed[0].section, POINTS),
            other => panic!("unexpected: {other:?}"),
        }

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("INCOMPLETE SAVE"));
        let doc = load_document(&path).unwrap();
        assert_eq!(doc.incomplete_sections, vec![POINTS.to_string()]);
        assert_eq!(doc.tree, sample_tree());
        assert!(doc.calibration.is_some());
        assert!(doc.points.is_none());
    }

    #[test]
    fn existing_file_is_kept_without_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p.toml");
        fs::write(&path, "keep me").unwrap();

        let report = save_document(&path, &sample_tree(), None, None, false).unwrap();
        assert_eq!(report, SaveReport::SkippedExisting { path: path.clone() });
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep me");

        let report = save_document(&path, &sample_tree(), None, None, true).unwrap();
        assert!(report.is_complete());
        assert_eq!(load_document(&path).unwrap().tree, sample_tree());
    }

    #[test]
    fn export_writes_zero_based_cameras() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("calibration.toml");
        export_calibration(&sample_calibration(), &path).unwrap();

        let doc: DocumentMut = fs::read_to_string(&path).unwrap().parse().unwrap();
        assert_eq!(doc["cam_0"]["name"].as_str(), Some("camA"));
        assert_eq!(doc["cam_1"]["name"].as_str(), Some("camB"));
        assert_eq!(doc["metadata"]["error"].as_float(), Some(0.3125));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            load_document(&dir.path().join("nope.toml")),
            Err(ProjectError::Io { .. })
        ));
    }
}
