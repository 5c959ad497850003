//! Video handles and frame access.
//!
//! A `VideoHandle` pairs a file path with its lazily probed `StreamInfo`.
//! Frame images are read through the `FrameSource` trait; the FFmpeg
//! subprocess backend extracts one PNG per request.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use image::DynamicImage;

use super::probe::StreamProber;
use super::types::{FrameError, FrameRate, ProbeResult, StreamInfo};

/// A camera's video file with cached stream metadata.
///
/// The metadata is probed on first access and kept for the lifetime of the
/// handle. Replace the handle to force a re-probe.
#[derive(Debug)]
pub struct VideoHandle {
    path: PathBuf,
    info: OnceLock<StreamInfo>,
}

impl VideoHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            info: OnceLock::new(),
        }
    }

    /// Handle whose metadata is already known.
    pub fn with_info(path: impl Into<PathBuf>, info: StreamInfo) -> Self {
        let handle = Self::new(path);
        let _ = handle.info.set(info);
        handle
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream metadata, probing the file on first call.
    pub fn stream_info(&self, prober: &dyn StreamProber) -> ProbeResult<&StreamInfo> {
        if let Some(info) = self.info.get() {
            return Ok(info);
        }
        let info = prober.probe(&self.path)?;
        Ok(self.info.get_or_init(|| info))
    }

    /// Metadata if it has been probed already.
    pub fn cached_info(&self) -> Option<&StreamInfo> {
        self.info.get()
    }
}

/// Random access to decoded frames of one video.
///
/// Methods take `&mut self`: a source has a single owner while frames are
/// being read from it.
pub trait FrameSource: Send {
    fn frame_count(&self) -> u64;

    /// (width, height) in pixels.
    fn frame_size(&self) -> (u32, u32);

    fn read_frame(&mut self, index: u64) -> Result<DynamicImage, FrameError>;
}

/// Opens a `FrameSource` for a video handle.
pub trait FrameSourceOpener: Send + Sync {
    fn open(&self, path: &Path, info: &StreamInfo) -> Result<Box<dyn FrameSource>, FrameError>;
}

/// FFmpeg subprocess frame reader.
pub struct FfmpegFrameSource {
    binary: PathBuf,
    path: PathBuf,
    frame_rate: FrameRate,
    frame_count: u64,
    size: (u32, u32),
}

impl FfmpegFrameSource {
    pub fn open(
        binary: impl Into<PathBuf>,
        path: &Path,
        info: &StreamInfo,
    ) -> Result<Self, FrameError> {
        if !path.is_file() {
            return Err(FrameError::OpenFailed {
                path: path.to_path_buf(),
                message: "File does not exist".to_string(),
            });
        }

        tracing::debug!(
            "[FFmpeg] Opened video: {}x{} @ {} fps, {} frames",
            info.width,
            info.height,
            info.frame_rate,
            info.frame_count
        );

        Ok(Self {
            binary: binary.into(),
            path: path.to_path_buf(),
            frame_rate: info.frame_rate,
            frame_count: info.frame_count,
            size: info.frame_size(),
        })
    }

    /// Seek position of a frame in seconds.
    fn frame_time(&self, index: u64) -> f64 {
        index as f64 * f64::from(self.frame_rate.den()) / f64::from(self.frame_rate.num())
    }
}

impl FrameSource for FfmpegFrameSource {
    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn frame_size(&self) -> (u32, u32) {
        self.size
    }

    fn read_frame(&mut self, index: u64) -> Result<DynamicImage, FrameError> {
        if index >= self.frame_count {
            return Err(FrameError::OutOfRange {
                index,
                count: self.frame_count,
            });
        }

        let time = format!("{:.6}", self.frame_time(index));
        tracing::trace!("[FFmpeg] Extracting frame {} at {}s", index, time);

        let output = Command::new(&self.binary)
            .args(["-v", "error", "-ss", &time, "-i"])
            .arg(&self.path)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-"])
            .output()
            .map_err(|e| FrameError::ReadFailed {
                index,
                message: format!("FFmpeg execution failed: {}", e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FrameError::ReadFailed {
                index,
                message: format!(
                    "FFmpeg failed: {}",
                    stderr.lines().last().unwrap_or("unknown error")
                ),
            });
        }

        if output.stdout.is_empty() {
            return Err(FrameError::ReadFailed {
                index,
                message: "FFmpeg produced no output".to_string(),
            });
        }

        image::load(Cursor::new(output.stdout), image::ImageFormat::Png).map_err(|e| {
            FrameError::ReadFailed {
                index,
                message: format!("Failed to decode PNG: {}", e),
            }
        })
    }
}

/// Opener producing `FfmpegFrameSource`s.
#[derive(Debug, Clone)]
pub struct FfmpegOpener {
    binary: PathBuf,
}

impl FfmpegOpener {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for FfmpegOpener {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FrameSourceOpener for FfmpegOpener {
    fn open(&self, path: &Path, info: &StreamInfo) -> Result<Box<dyn FrameSource>, FrameError> {
        Ok(Box::new(FfmpegFrameSource::open(&self.binary, path, info)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::types::ProbeError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn info() -> StreamInfo {
        StreamInfo {
            frame_rate: FrameRate::new(30000, 1001).unwrap(),
            frame_count: 100,
            width: 640,
            height: 480,
            creation_time: None,
            timecode: None,
            has_audio: false,
            bitrate: None,
        }
    }

    struct CountingProber(AtomicUsize);

    impl StreamProber for CountingProber {
        fn probe(&self, _path: &Path) -> ProbeResult<StreamInfo> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(info())
        }
    }

    struct FailingProber;

    impl StreamProber for FailingProber {
        fn probe(&self, path: &Path) -> ProbeResult<StreamInfo> {
            Err(ProbeError::NotFound(path.to_path_buf()))
        }
    }

    #[test]
    fn stream_info_is_probed_once() {
        let prober = CountingProber(AtomicUsize::new(0));
        let handle = VideoHandle::new("a.mp4");
        assert!(handle.cached_info().is_none());

        assert_eq!(handle.stream_info(&prober).unwrap().frame_count, 100);
        assert_eq!(handle.stream_info(&prober).unwrap().frame_count, 100);
        assert_eq!(prober.0.load(Ordering::SeqCst), 1);
        assert!(handle.cached_info().is_some());
    }

    #[test]
    fn failed_probe_is_not_cached() {
        let handle = VideoHandle::new("missing.mp4");
        assert!(handle.stream_info(&FailingProber).is_err());
        assert!(handle.cached_info().is_none());
    }

    #[test]
    fn preset_info_skips_probe() {
        let handle = VideoHandle::with_info("a.mp4", info());
        assert!(handle.stream_info(&FailingProber).is_ok());
    }

    #[test]
    fn open_missing_file_fails() {
        let result = FfmpegFrameSource::open("ffmpeg", Path::new("/nonexistent/video.mp4"), &info());
        assert!(matches!(result, Err(FrameError::OpenFailed { .. })));
    }

    #[test]
    fn out_of_range_frame_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut source = FfmpegFrameSource::open("ffmpeg", file.path(), &info()).unwrap();
        assert_eq!(source.frame_size(), (640, 480));
        assert!(matches!(
            source.read_frame(100),
            Err(FrameError::OutOfRange { index: 100, count: 100 })
        ));
        assert!((source.frame_time(30) - 1.001).abs() < 1e-9);
    }
}
