//! SMPTE-style timecode parsing (`HH:MM:SS:FF`, drop-frame `HH:MM:SS;FF`).

use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use super::types::{FrameRate, ProbeError, ProbeResult};

/// Camera clock reading embedded in the stream metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timecode {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub frames: u32,
    /// `;` separator before the frame field.
    pub drop_frame: bool,
}

impl Timecode {
    pub fn parse(s: &str) -> ProbeResult<Self> {
        let s = s.trim();
        let invalid = || ProbeError::InvalidTimecode(s.to_string());

        // ';' before the frame field marks drop-frame; some muxers write '.'.
        let (hms, frames, drop_frame) = match s.rfind([':', ';', '.']) {
            Some(idx) => (&s[..idx], &s[idx + 1..], &s[idx..idx + 1] == ";"),
            None => return Err(invalid()),
        };

        let parts: Vec<&str> = hms.split(':').collect();
        if parts.len() != 3 {
            return Err(invalid());
        }

        let field = |p: &str| -> ProbeResult<u32> {
            if p.is_empty() || p.len() > 2 || !p.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            p.parse::<u32>().map_err(|_| invalid())
        };

        let hours = field(parts[0])?;
        let minutes = field(parts[1])?;
        let seconds = field(parts[2])?;
        let frames = field(frames)?;

        if hours > 23 || minutes > 59 || seconds > 59 {
            return Err(invalid());
        }

        Ok(Self {
            hours,
            minutes,
            seconds,
            frames,
            drop_frame,
        })
    }

    /// Check the frame field against the stream's rate: at 29.97 fps valid
    /// frames are `00..=29`.
    pub fn check_rate(&self, rate: FrameRate) -> ProbeResult<()> {
        let per_second = rate.num().div_ceil(rate.den());
        if self.frames >= per_second {
            return Err(ProbeError::InvalidTimecode(format!(
                "{} (frame {} at {} fps)",
                self, self.frames, rate
            )));
        }
        Ok(())
    }

    /// Frame field converted to microseconds at the given rate.
    pub fn frame_micros(&self, rate: FrameRate) -> i64 {
        (f64::from(self.frames) / rate.as_f64() * 1_000_000.0).round() as i64
    }

    /// Time of day of the first frame.
    pub fn time_of_day(&self, rate: FrameRate) -> NaiveTime {
        let base = NaiveTime::from_hms_opt(self.hours, self.minutes, self.seconds)
            .unwrap_or(NaiveTime::MIN);
        base + Duration::microseconds(self.frame_micros(rate))
    }

    /// Absolute timestamp assuming the first frame fell on `date`.
    pub fn on_date(&self, date: NaiveDate, rate: FrameRate) -> NaiveDateTime {
        let base = NaiveTime::from_hms_opt(self.hours, self.minutes, self.seconds)
            .unwrap_or(NaiveTime::MIN);
        // Added on the datetime so a frame field past the last second of the
        // day rolls the date instead of wrapping the time.
        date.and_time(base) + Duration::microseconds(self.frame_micros(rate))
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.drop_frame { ';' } else { ':' };
        write!(
            f,
            "{:02}:{:02}:{:02}{}{:02}",
            self.hours, self.minutes, self.seconds, sep, self.frames
        )
    }
}
