//! Types for media probing and frame access.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::timecode::Timecode;

/// Errors from probing a media file.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Video file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Video files not found: {}", display_paths(.0))]
    MissingInputs(Vec<PathBuf>),

    #[error("{tool} failed on '{}': {message}", .path.display())]
    ToolFailed {
        tool: String,
        path: PathBuf,
        message: String,
    },

    #[error("Failed to parse probe output for '{}': {source}", .path.display())]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No video stream found in '{}'", .0.display())]
    NoVideoStream(PathBuf),

    #[error("Unparsable frame rate '{0}'")]
    InvalidFrameRate(String),

    #[error("Unparsable timecode '{0}' (expected HH:MM:SS:FF or HH:MM:SS;FF)")]
    InvalidTimecode(String),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for probe operations.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors from reading individual frames.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Failed to open video '{}': {message}", .path.display())]
    OpenFailed { path: PathBuf, message: String },

    #[error("Failed to read frame {index}: {message}")]
    ReadFailed { index: u64, message: String },

    #[error("Frame {index} out of range (video has {count} frames)")]
    OutOfRange { index: u64, count: u64 },
}

/// Exact frame rate as a reduced rational.
///
/// Equality is rational equality, so `30000/1001` never equals `29.97`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    num: u32,
    den: u32,
}

impl FrameRate {
    /// Create a frame rate, reducing the fraction. Returns `None` for a zero
    /// numerator or denominator.
    pub fn new(num: u32, den: u32) -> Option<Self> {
        if num == 0 || den == 0 {
            return None;
        }
        let g = gcd(num, den);
        Some(Self {
            num: num / g,
            den: den / g,
        })
    }

    /// Parse ffprobe style rates: `"30000/1001"` or `"25"`.
    pub fn parse(s: &str) -> ProbeResult<Self> {
        let s = s.trim();
        let invalid = || ProbeError::InvalidFrameRate(s.to_string());

        let (num, den) = match s.split_once('/') {
            Some((n, d)) => (
                n.trim().parse::<u32>().map_err(|_| invalid())?,
                d.trim().parse::<u32>().map_err(|_| invalid())?,
            ),
            None => (s.parse::<u32>().map_err(|_| invalid())?, 1),
        };

        Self::new(num, den).ok_or_else(invalid)
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn den(&self) -> u32 {
        self.den
    }

    pub fn as_f64(&self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Convert a duration in microseconds to a (fractional) frame count.
    pub fn frames_in_micros(&self, micros: i64) -> f64 {
        micros as f64 * f64::from(self.num) / (f64::from(self.den) * 1_000_000.0)
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Immutable facts about one media file.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub frame_rate: FrameRate,
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
    /// Absolute creation timestamp from container metadata.
    pub creation_time: Option<DateTime<Utc>>,
    /// Camera clock at the first frame.
    pub timecode: Option<Timecode>,
    pub has_audio: bool,
    /// Bits per second.
    pub bitrate: Option<u64>,
}

impl StreamInfo {
    /// Absolute start time: the creation date combined with the timecode.
    ///
    /// Assumes recording started on the calendar day of `creation_time`; a
    /// camera that ran past midnight relative to that date is off by 24 h.
    /// Returns `None` if either piece of metadata is missing.
    pub fn start_time(&self) -> Option<NaiveDateTime> {
        let created = self.creation_time?;
        let timecode = self.timecode?;
        Some(timecode.on_date(created.date_naive(), self.frame_rate))
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn duration_secs(&self) -> f64 {
        self.frame_count as f64 / self.frame_rate.as_f64()
    }
}
