//! Typed, hierarchical project parameters.

mod defaults;
mod tree;
mod types;

pub use defaults::{
    add_video_info, camera_names, default_camera_names, default_parameters, names, video_files,
    write_offsets, BOARD_TYPES,
};
pub use tree::{ListenerId, ParameterTree, TreeEvent, TreeListener, ROOT_NAME};
pub(crate) use types::RESERVED_PREFIX;
pub use types::{FileMode, ParamError, ParamKind, ParamResult, ParamValue, Parameter, ParameterNode};
