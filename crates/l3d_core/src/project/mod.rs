//! Project state and its on-disk document.

mod model;
mod points;
mod store;
mod types;

pub use model::Project;
pub use points::{PointColumn, PointKey, PointSource, PointsTable};
pub use store::{
    export_calibration, load_document, parse_document, render_document, save_document,
    ProjectDocument, SaveReport, SectionFailure, CALIBRATION, PARAMETERS, POINTS,
};
pub use types::{ProjectError, ProjectResult};
