//! Stream metadata probing using ffprobe.
//!
//! Runs `ffprobe -print_format json -show_format -show_streams` and extracts
//! the facts synchronization needs: frame rate, frame count, creation time and
//! the embedded timecode.

use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::timecode::Timecode;
use super::types::{FrameRate, ProbeError, ProbeResult, StreamInfo};

/// Source of stream metadata for a media file.
pub trait StreamProber: Send + Sync {
    fn probe(&self, path: &Path) -> ProbeResult<StreamInfo>;
}

/// Prober backed by the ffprobe executable.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    binary: PathBuf,
}

impl FfprobeProber {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Check if the configured ffprobe can be executed.
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl StreamProber for FfprobeProber {
    fn probe(&self, path: &Path) -> ProbeResult<StreamInfo> {
        if !path.is_file() {
            return Err(ProbeError::NotFound(path.to_path_buf()));
        }

        tracing::debug!("[Probe] Probing {}", path.display());

        let output = Command::new(&self.binary)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .output()
            .map_err(|e| ProbeError::ToolFailed {
                tool: self.binary.display().to_string(),
                path: path.to_path_buf(),
                message: format!("failed to run: {}", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProbeError::ToolFailed {
                tool: self.binary.display().to_string(),
                path: path.to_path_buf(),
                message: stderr.lines().last().unwrap_or("unknown error").to_string(),
            });
        }

        let json: Value =
            serde_json::from_slice(&output.stdout).map_err(|source| ProbeError::InvalidJson {
                path: path.to_path_buf(),
                source,
            })?;

        let info = parse_probe_json(&json, path)?;

        tracing::info!(
            "[Probe] {}: {} fps, {} frames, {}x{}, timecode {}",
            path.file_name()
                .map(|s| s.to_string_lossy())
                .unwrap_or_default(),
            info.frame_rate,
            info.frame_count,
            info.width,
            info.height,
            info.timecode
                .map(|tc| tc.to_string())
                .unwrap_or_else(|| "none".to_string())
        );

        Ok(info)
    }
}

/// Parse ffprobe's JSON output into a `StreamInfo`.
pub fn parse_probe_json(json: &Value, path: &Path) -> ProbeResult<StreamInfo> {
    let streams = json
        .get("streams")
        .and_then(|s| s.as_array())
        .map(|s| s.as_slice())
        .unwrap_or_default();
    let format = json.get("format");

    let video = streams
        .iter()
        .find(|s| str_field(s, "codec_type") == Some("video"))
        .ok_or_else(|| ProbeError::NoVideoStream(path.to_path_buf()))?;

    // r_frame_rate is more reliable than avg_frame_rate; the latter is "0/0"
    // on some streams.
    let rate_str = str_field(video, "r_frame_rate")
        .filter(|r| *r != "0/0")
        .or_else(|| str_field(video, "avg_frame_rate"))
        .ok_or_else(|| ProbeError::InvalidFrameRate(String::new()))?;
    let frame_rate = FrameRate::parse(rate_str)?;

    let width = video.get("width").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
    let height = video.get("height").and_then(|v| v.as_u64()).unwrap_or(0) as u32;

    let frame_count = str_field(video, "nb_frames")
        .and_then(|n| n.parse::<u64>().ok())
        .or_else(|| {
            // Estimate from duration if the container has no frame count
            let duration = str_field(video, "duration")
                .or_else(|| format.and_then(|f| str_field(f, "duration")))?
                .parse::<f64>()
                .ok()?;
            Some((duration * frame_rate.as_f64()).round() as u64)
        })
        .unwrap_or(0);

    let has_audio = streams
        .iter()
        .any(|s| str_field(s, "codec_type") == Some("audio"));

    let timecode = find_timecode(streams, video, format)
        .map(Timecode::parse)
        .transpose()?;
    if let Some(tc) = &timecode {
        tc.check_rate(frame_rate)?;
    }

    let creation_time = tag(format, "creation_time")
        .or_else(|| tag(Some(video), "creation_time"))
        .and_then(|raw| match DateTime::parse_from_rfc3339(raw) {
            Ok(dt) => Some(dt.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!(
                    "[Probe] Ignoring unparsable creation_time '{}' in {}: {}",
                    raw,
                    path.display(),
                    e
                );
                None
            }
        });

    let bitrate = format
        .and_then(|f| str_field(f, "bit_rate"))
        .and_then(|b| b.parse::<u64>().ok());

    Ok(StreamInfo {
        frame_rate,
        frame_count,
        width,
        height,
        creation_time,
        timecode,
        has_audio,
        bitrate,
    })
}

/// Timecode lookup order: the `tmcd` data stream, then the video stream, then
/// the container tags.
fn find_timecode<'a>(
    streams: &'a [Value],
    video: &'a Value,
    format: Option<&'a Value>,
) -> Option<&'a str> {
    streams
        .iter()
        .find(|s| str_field(s, "codec_tag_string") == Some("tmcd"))
        .and_then(|s| tag(Some(s), "timecode"))
        .or_else(|| tag(Some(video), "timecode"))
        .or_else(|| tag(format, "timecode"))
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|v| v.as_str())
}

fn tag<'a>(value: Option<&'a Value>, key: &str) -> Option<&'a str> {
    value?.get("tags")?.get(key)?.as_str()
}
