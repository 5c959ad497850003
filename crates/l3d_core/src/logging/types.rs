//! Log levels, run log configuration and line markers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Name as used in `RUST_LOG` directives and the settings file.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

/// How a calibration run log is written.
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    pub level: LogLevel,
    /// Per-detection lines go only to the tail, and progress is thinned
    /// to `progress_step` percent.
    pub compact: bool,
    pub progress_step: u32,
    /// Detection lines kept for the failure dump.
    pub tail_lines: usize,
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            compact: true,
            progress_step: 20,
            tail_lines: 20,
            timestamps: true,
        }
    }
}

impl LogConfig {
    /// Everything written, including each detection.
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            compact: false,
            progress_step: 5,
            tail_lines: 50,
            timestamps: true,
        }
    }
}

/// Receives every line written to a run log.
pub type LogCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Marker put in front of a run log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// `== Detecting ==`
    Phase,
    /// `-- camA --`
    Camera,
    Progress,
    Detection,
    Warning,
    Failure,
    Success,
    Plain,
}

impl LineKind {
    pub fn render(&self, message: &str) -> String {
        match self {
            LineKind::Phase => format!("== {} ==", message),
            LineKind::Camera => format!("-- {} --", message),
            LineKind::Progress => format!("progress {}", message),
            LineKind::Detection => format!("  {}", message),
            LineKind::Warning => format!("WARN {}", message),
            LineKind::Failure => format!("FAILED {}", message),
            LineKind::Success => format!("OK {}", message),
            LineKind::Plain => message.to_string(),
        }
    }

    /// Level the line is filtered at.
    pub fn level(&self) -> LogLevel {
        match self {
            LineKind::Detection => LogLevel::Debug,
            LineKind::Warning => LogLevel::Warn,
            LineKind::Failure => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}
