//! Default project parameters and derived info nodes.

use std::path::{Path, PathBuf};

use super::tree::ParameterTree;
use super::types::{FileMode, ParamError, ParamResult, Parameter};
use crate::config::{CalibrationSettings, SyncSettings};
use crate::media::StreamInfo;
use crate::sync::{SyncMethod, SyncPlan};

/// Node names shared by the tree builders and readers.
pub mod names {
    pub const VIDEOS: &str = "Videos";
    pub const FILE: &str = "File";

    pub const SYNCHRONIZATION: &str = "Synchronization";
    pub const METHOD: &str = "Method";
    pub const SYNCHRONIZE: &str = "Synchronize...";
    pub const OFFSETS: &str = "Offsets";
    pub const COMMON_LENGTH: &str = "Common length";

    pub const CALIBRATION: &str = "Calibration";
    pub const TYPE: &str = "Type";
    pub const FRAME_STEP: &str = "Frame Step";
    pub const SQUARES_X: &str = "Number of squares horizontally";
    pub const SQUARES_Y: &str = "Number of squares vertically";
    pub const SQUARE_SIZE: &str = "Size of square";
    pub const MARKER_SIZE: &str = "Size of marker";
    pub const MARKER_BITS: &str = "Marker bits";
    pub const DICTIONARY_SIZE: &str = "Number of markers";
    pub const OUTPUT_FILE: &str = "Output file";
    pub const CALIBRATE: &str = "Calibrate...";
    pub const REFINE: &str = "Refine calibration...";

    pub const FRAME_RATE: &str = "Frame rate";
    pub const FRAME_COUNT: &str = "Frame count";
    pub const FRAME_SIZE: &str = "Frame size";
    pub const TIMECODE: &str = "Timecode";
    pub const CREATION_TIME: &str = "Creation time";
    pub const AUDIO: &str = "Audio";
}

/// Board types offered by the `Calibration/Type` choice.
pub const BOARD_TYPES: [&str; 2] = ["Charuco", "Checkerboard"];

/// Default camera names: `camA`, `camB`, ..., `camZ`, `camAA`, ...
pub fn default_camera_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("cam{}", letters(i))).collect()
}

fn letters(mut i: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (i % 26) as u8);
        if i < 26 {
            break;
        }
        i = i / 26 - 1;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Build the parameter tree for a new project.
///
/// `Synchronization` and `Calibration` only make sense with more than one
/// camera and are omitted otherwise.
pub fn default_parameters(
    videos: &[PathBuf],
    camera_names: Option<&[String]>,
    calibration: &CalibrationSettings,
    sync: &SyncSettings,
) -> ParamResult<ParameterTree> {
    let cam_names = match camera_names {
        Some(names) if names.len() != videos.len() => {
            return Err(ParamError::CameraCount {
                videos: videos.len(),
                names: names.len(),
            })
        }
        Some(names) => names.to_vec(),
        None => default_camera_names(videos.len()),
    };

    let cameras = videos
        .iter()
        .zip(cam_names)
        .map(|(path, name)| {
            Parameter::group(name, vec![Parameter::scalar(names::FILE, path_str(path))])
        })
        .collect();

    let mut children = vec![Parameter::group(names::VIDEOS, cameras)];

    if videos.len() > 1 {
        children.push(Parameter::group(
            names::SYNCHRONIZATION,
            vec![
                Parameter::choice(names::METHOD, sync.method.as_str(), SyncMethod::labels()),
                Parameter::action(names::SYNCHRONIZE),
            ],
        ));
        children.push(calibration_group(calibration));
    }

    ParameterTree::from_children(children)
}

fn calibration_group(settings: &CalibrationSettings) -> Parameter {
    let board = if BOARD_TYPES.contains(&settings.board_type.as_str()) {
        settings.board_type.clone()
    } else {
        tracing::warn!(
            "[Params] Unknown board type '{}', using {}",
            settings.board_type,
            BOARD_TYPES[0]
        );
        BOARD_TYPES[0].to_string()
    };

    Parameter::group(
        names::CALIBRATION,
        vec![
            Parameter::choice(
                names::TYPE,
                board,
                BOARD_TYPES.iter().map(|s| s.to_string()).collect(),
            ),
            Parameter::scalar(names::FRAME_STEP, i64::from(settings.frame_step)),
            Parameter::scalar(names::SQUARES_X, i64::from(settings.squares_x)),
            Parameter::scalar(names::SQUARES_Y, i64::from(settings.squares_y)),
            Parameter::scalar(names::SQUARE_SIZE, settings.square_size),
            Parameter::scalar(names::MARKER_SIZE, settings.marker_size),
            Parameter::scalar(names::MARKER_BITS, i64::from(settings.marker_bits)),
            Parameter::scalar(names::DICTIONARY_SIZE, i64::from(settings.dictionary_size)),
            Parameter::file(names::OUTPUT_FILE, "", FileMode::Save),
            Parameter::action(names::CALIBRATE),
            Parameter::action(names::REFINE),
        ],
    )
}

/// Camera names in `Videos` order.
pub fn camera_names(tree: &ParameterTree) -> Vec<String> {
    tree.get(names::VIDEOS)
        .map(|videos| videos.children().iter().map(|c| c.name.clone()).collect())
        .unwrap_or_default()
}

/// `(camera, file)` pairs in `Videos` order.
pub fn video_files(tree: &ParameterTree) -> ParamResult<Vec<(String, PathBuf)>> {
    camera_names(tree)
        .into_iter()
        .map(|name| {
            let file = tree.get_str(&format!("{}/{}/{}", names::VIDEOS, name, names::FILE))?;
            Ok((name, PathBuf::from(file)))
        })
        .collect()
}

/// Add read-only stream facts under `Videos/<camera>`.
pub fn add_video_info(tree: &mut ParameterTree, camera: &str, info: &StreamInfo) -> ParamResult<()> {
    let (width, height) = info.frame_size();
    let mut children = vec![
        Parameter::readonly(names::FRAME_RATE, info.frame_rate.to_string()),
        Parameter::readonly(names::FRAME_COUNT, info.frame_count as i64),
        Parameter::readonly(names::FRAME_SIZE, format!("{}x{}", width, height)),
    ];
    if let Some(tc) = info.timecode {
        children.push(Parameter::readonly(names::TIMECODE, tc.to_string()));
    }
    if let Some(created) = info.creation_time {
        children.push(Parameter::readonly(names::CREATION_TIME, created.to_rfc3339()));
    }
    children.push(Parameter::readonly(names::AUDIO, info.has_audio));

    tree.add_children(&format!("{}/{}", names::VIDEOS, camera), children, true)
}

/// Record a sync plan as a read-only `Synchronization/Offsets` group.
pub fn write_offsets(tree: &mut ParameterTree, plan: &SyncPlan) -> ParamResult<()> {
    let mut children: Vec<Parameter> = plan
        .entries()
        .iter()
        .map(|e| Parameter::readonly(e.camera.clone(), e.start_offset))
        .collect();
    children.push(Parameter::readonly(names::COMMON_LENGTH, plan.common_length() as i64));

    if !tree.contains(names::SYNCHRONIZATION) {
        tree.add_child("", Parameter::group(names::SYNCHRONIZATION, vec![]), false)?;
    }
    tree.add_child(
        names::SYNCHRONIZATION,
        Parameter::group(names::OFFSETS, children),
        true,
    )
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
