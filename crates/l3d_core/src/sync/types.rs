//! Synchronization types and errors.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::media::StreamInfo;

/// How camera start times are aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SyncMethod {
    None,
    #[default]
    Timecode,
    Audio,
    #[serde(rename = "Timecode+Audio")]
    TimecodeAudio,
}

impl SyncMethod {
    pub const ALL: [SyncMethod; 4] = [
        SyncMethod::None,
        SyncMethod::Timecode,
        SyncMethod::Audio,
        SyncMethod::TimecodeAudio,
    ];

    /// Label used in the parameter tree and config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMethod::None => "None",
            SyncMethod::Timecode => "Timecode",
            SyncMethod::Audio => "Audio",
            SyncMethod::TimecodeAudio => "Timecode+Audio",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == s)
    }

    pub fn labels() -> Vec<String> {
        Self::ALL.iter().map(|m| m.as_str().to_string()).collect()
    }
}

impl fmt::Display for SyncMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One camera entering a synchronization batch.
#[derive(Debug, Clone)]
pub struct CameraStream {
    pub name: String,
    pub info: StreamInfo,
}

impl CameraStream {
    pub fn new(name: impl Into<String>, info: StreamInfo) -> Self {
        Self {
            name: name.into(),
            info,
        }
    }
}

/// Errors from computing a sync plan.
///
/// All variants are configuration errors: they are raised before any
/// offsets are produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("No cameras to synchronize")]
    NoCameras,

    #[error("Cameras do not share a frame rate: {}", .rates.join(", "))]
    FrameRateMismatch { rates: Vec<String> },

    #[error("Timecode synchronization unavailable, missing timecode or creation time for: {}", .cameras.join(", "))]
    TimecodeUnavailable { cameras: Vec<String> },

    #[error(
        "Start times of '{earliest}' and '{latest}' are {hours:.1} h apart; \
         a camera probably recorded past midnight relative to its creation date"
    )]
    SuspiciousStartSpread {
        earliest: String,
        latest: String,
        hours: f64,
    },

    #[error("Videos share no common frame window")]
    NoCommonWindow,

    #[error("Synchronization method '{0}' is not available")]
    MethodUnavailable(SyncMethod),

    #[error("Unknown synchronization method '{0}'")]
    UnknownMethod(String),
}

/// Result type for synchronization.
pub type SyncResult<T> = Result<T, SyncError>;

/// Per-camera alignment, in frames.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncEntry {
    pub camera: String,
    pub start_time: NaiveDateTime,
    pub frame_count: u64,
    /// Frames between the earliest camera's first frame and this camera's.
    pub start_offset: i64,
    /// Frames this camera runs past the common end.
    pub end_offset: i64,
}
