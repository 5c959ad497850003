//! Application settings, one TOML table per section.
//!
//! Missing keys fall back to the serde defaults so older files keep loading.

use serde::{Deserialize, Serialize};

use crate::logging::{LogConfig, LogLevel};
use crate::sync::SyncMethod;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub paths: PathSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    /// Defaults for the Calibration group of new projects.
    #[serde(default)]
    pub calibration: CalibrationSettings,

    #[serde(default)]
    pub sync: SyncSettings,
}

/// External tools and folders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: String,

    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,

    /// Folder for per-run calibration logs.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,

    /// Directory of the last opened or saved project.
    #[serde(default)]
    pub last_project_dir: String,
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            ffprobe_path: default_ffprobe(),
            ffmpeg_path: default_ffmpeg(),
            logs_folder: default_logs_folder(),
            last_project_dir: String::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub level: LogLevel,

    /// Keep per-detection lines out of run logs unless a run fails.
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Detection lines replayed when a run fails.
    #[serde(default = "default_tail_lines")]
    pub tail_lines: u32,

    /// Percent between progress lines in compact run logs.
    #[serde(default = "default_progress_step")]
    pub progress_step: u32,

    #[serde(default = "default_true")]
    pub timestamps: bool,
}

fn default_true() -> bool {
    true
}

fn default_tail_lines() -> u32 {
    20
}

fn default_progress_step() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            compact: true,
            tail_lines: default_tail_lines(),
            progress_step: default_progress_step(),
            timestamps: true,
        }
    }
}

impl LoggingSettings {
    /// Run logger configuration for these settings.
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            compact: self.compact,
            progress_step: self.progress_step,
            tail_lines: self.tail_lines as usize,
            timestamps: self.timestamps,
        }
    }
}

/// Calibration target and sampling defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSettings {
    /// `Charuco` or `Checkerboard`.
    #[serde(default = "default_board_type")]
    pub board_type: String,

    /// Calibrate on every nth frame.
    #[serde(default = "default_frame_step")]
    pub frame_step: u32,

    #[serde(default = "default_squares")]
    pub squares_x: u32,

    #[serde(default = "default_squares")]
    pub squares_y: u32,

    /// Square edge in mm.
    #[serde(default = "default_square_size")]
    pub square_size: f64,

    /// Marker edge in mm.
    #[serde(default = "default_marker_size")]
    pub marker_size: f64,

    /// Information bits per marker side.
    #[serde(default = "default_marker_bits")]
    pub marker_bits: u32,

    /// Number of markers in the dictionary.
    #[serde(default = "default_dictionary_size")]
    pub dictionary_size: u32,
}

fn default_board_type() -> String {
    "Charuco".to_string()
}

fn default_frame_step() -> u32 {
    40
}

fn default_squares() -> u32 {
    6
}

fn default_square_size() -> f64 {
    24.33
}

fn default_marker_size() -> f64 {
    17.0
}

fn default_marker_bits() -> u32 {
    5
}

fn default_dictionary_size() -> u32 {
    50
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            board_type: default_board_type(),
            frame_step: default_frame_step(),
            squares_x: default_squares(),
            squares_y: default_squares(),
            square_size: default_square_size(),
            marker_size: default_marker_size(),
            marker_bits: default_marker_bits(),
            dictionary_size: default_dictionary_size(),
        }
    }
}

/// Synchronization defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub method: SyncMethod,
}

/// Config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSection {
    Paths,
    Logging,
    Calibration,
    Sync,
}

impl ConfigSection {
    pub const ALL: [ConfigSection; 4] = [
        ConfigSection::Paths,
        ConfigSection::Logging,
        ConfigSection::Calibration,
        ConfigSection::Sync,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "paths",
            ConfigSection::Logging => "logging",
            ConfigSection::Calibration => "calibration",
            ConfigSection::Sync => "sync",
        }
    }

    /// Comment written above the section.
    pub fn description(&self) -> &'static str {
        match self {
            ConfigSection::Paths => "External tools and folders",
            ConfigSection::Logging => "Logging configuration",
            ConfigSection::Calibration => "Calibration defaults for new projects",
            ConfigSection::Sync => "Synchronization defaults",
        }
    }
}
