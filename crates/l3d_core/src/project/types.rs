//! Project errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::params::ParamError;

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse project file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml_edit::TomlError,
    },

    /// A section is present but its contents are not usable.
    #[error("Malformed [{section}] section: {message}")]
    Malformed { section: String, message: String },

    #[error(transparent)]
    Params(#[from] ParamError),

    #[error("Project has no filename; use save_as")]
    NoFilename,

    #[error("Project has no calibration to export")]
    NoCalibration,
}

impl ProjectError {
    pub fn malformed(section: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            section: section.into(),
            message: message.into(),
        }
    }
}

pub type ProjectResult<T> = Result<T, ProjectError>;
