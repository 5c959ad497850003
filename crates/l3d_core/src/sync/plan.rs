//! Frame offsets from camera start times.

use std::ops::Range;

use chrono::{Duration, NaiveDateTime};

use super::types::{CameraStream, SyncEntry, SyncError, SyncResult};
use crate::media::FrameRate;

/// Start times further apart than this are treated as a date roll-over.
const MAX_START_SPREAD_HOURS: i64 = 12;

/// Alignment of a batch of cameras onto a common frame window.
///
/// Entries are ordered by descending start time; cameras with equal start
/// times keep their input order.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPlan {
    frame_rate: FrameRate,
    entries: Vec<SyncEntry>,
    common_end: i64,
    common_length: u64,
}

impl SyncPlan {
    /// Compute a plan from camera timecodes.
    ///
    /// Checks run in order: frame rate agreement, timecode presence, start
    /// spread, common window.
    pub fn from_timecodes(cameras: &[CameraStream]) -> SyncResult<Self> {
        let first = cameras.first().ok_or(SyncError::NoCameras)?;
        let frame_rate = first.info.frame_rate;

        if cameras.iter().any(|c| c.info.frame_rate != frame_rate) {
            return Err(SyncError::FrameRateMismatch {
                rates: cameras
                    .iter()
                    .map(|c| format!("{}: {}", c.name, c.info.frame_rate))
                    .collect(),
            });
        }

        let missing: Vec<String> = cameras
            .iter()
            .filter(|c| c.info.start_time().is_none())
            .map(|c| c.name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(SyncError::TimecodeUnavailable { cameras: missing });
        }

        let mut starts: Vec<(&CameraStream, NaiveDateTime)> = cameras
            .iter()
            .filter_map(|c| c.info.start_time().map(|t| (c, t)))
            .collect();
        // Stable sort keeps input order for equal start times
        starts.sort_by(|a, b| b.1.cmp(&a.1));

        let (latest_cam, latest) = starts[0];
        let (earliest_cam, earliest) = starts[starts.len() - 1];

        let spread = latest - earliest;
        if spread > Duration::hours(MAX_START_SPREAD_HOURS) {
            return Err(SyncError::SuspiciousStartSpread {
                earliest: earliest_cam.name.clone(),
                latest: latest_cam.name.clone(),
                hours: spread.num_seconds() as f64 / 3600.0,
            });
        }

        let offsets: Vec<i64> = starts
            .iter()
            .map(|(_, start)| {
                let micros = (*start - earliest).num_microseconds().unwrap_or(0);
                frame_rate.frames_in_micros(micros).round() as i64
            })
            .collect();

        let common_end = starts
            .iter()
            .zip(&offsets)
            .map(|((c, _), off)| c.info.frame_count as i64 + off)
            .min()
            .unwrap_or(0);
        let max_offset = offsets.iter().copied().max().unwrap_or(0);

        let span = common_end - max_offset;
        // Touching recordings (span 0) share no frame either
        if span <= 0 {
            return Err(SyncError::NoCommonWindow);
        }

        let entries = starts
            .iter()
            .zip(&offsets)
            .map(|((c, start), &off)| SyncEntry {
                camera: c.name.clone(),
                start_time: *start,
                frame_count: c.info.frame_count,
                start_offset: off,
                end_offset: c.info.frame_count as i64 + off - common_end,
            })
            .collect::<Vec<_>>();

        for e in &entries {
            tracing::debug!(
                "[Sync] {}: start {} offset {} end trim {}",
                e.camera,
                e.start_time,
                e.start_offset,
                e.end_offset
            );
        }
        tracing::info!(
            "[Sync] {} cameras aligned, common window {} frames",
            entries.len(),
            span
        );

        Ok(Self {
            frame_rate,
            entries,
            common_end,
            common_length: span as u64,
        })
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    pub fn entries(&self) -> &[SyncEntry] {
        &self.entries
    }

    pub fn entry(&self, camera: &str) -> Option<&SyncEntry> {
        self.entries.iter().find(|e| e.camera == camera)
    }

    pub fn camera_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.camera.as_str()).collect()
    }

    /// Number of frames every camera keeps after trimming.
    pub fn common_length(&self) -> u64 {
        self.common_length
    }

    /// Frames of `camera`'s own file that fall inside the common window.
    pub fn aligned_range(&self, camera: &str) -> Option<Range<u64>> {
        let entry = self.entry(camera)?;
        let max_offset = self.entries.iter().map(|e| e.start_offset).max()?;
        let first = (max_offset - entry.start_offset) as u64;
        let end = (self.common_end - entry.start_offset) as u64;
        Some(first..end)
    }
}
