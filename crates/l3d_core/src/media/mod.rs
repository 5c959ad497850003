//! Media layer: stream metadata, timecodes and frame access.
//!
//! Decoding is delegated to ffprobe/ffmpeg subprocesses. Everything above
//! this module works with `StreamInfo` and the `StreamProber` /
//! `FrameSource` traits, so tests can substitute in-memory fakes.

mod discovery;
mod probe;
mod timecode;
mod types;
mod video;

pub use discovery::validate_inputs;
pub use probe::{parse_probe_json, FfprobeProber, StreamProber};
pub use timecode::Timecode;
pub use types::{FrameError, FrameRate, ProbeError, ProbeResult, StreamInfo};
pub use video::{FfmpegFrameSource, FfmpegOpener, FrameSource, FrameSourceOpener, VideoHandle};
