//! Exact frame positions.
//!
//! A [`FrameTime`] is an integer frame number paired with a rational
//! [`FrameRate`]. Positions never accumulate floating-point drift: seconds
//! are derived on demand and converting seconds back to a frame number
//! rounds half-up, so a position survives any number of round-trips.
//!
//! # Example
//!
//! ```
//! use scenecut::{FrameRate, FrameTime};
//!
//! let rate = FrameRate::new(24_000, 1_001)?;
//! let start: FrameTime = FrameTime::parse("00:00:50", rate)?;
//! assert_eq!(start.frame_number(), 1199);
//! assert_eq!(start.to_string(), "00:00:50.008");
//! # Ok::<(), scenecut::SceneCutError>(())
//! ```

use std::{
    cmp::Ordering,
    fmt::{Display, Formatter, Result as FmtResult},
    ops::{Add, Sub},
    str::FromStr,
};

use crate::error::SceneCutError;

/// A positive rational frame rate, stored in lowest terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRate {
    numerator: u32,
    denominator: u32,
}

impl FrameRate {
    /// Create a frame rate from a rational `numerator / denominator`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneCutError::InvalidFrameRate`] if either part is zero.
    pub fn new(numerator: u32, denominator: u32) -> Result<Self, SceneCutError> {
        if numerator == 0 || denominator == 0 {
            return Err(SceneCutError::InvalidFrameRate(format!(
                "{numerator}/{denominator}"
            )));
        }
        let divisor = gcd(numerator, denominator);
        Ok(Self {
            numerator: numerator / divisor,
            denominator: denominator / divisor,
        })
    }

    /// Create a frame rate from a floating-point frames-per-second value.
    ///
    /// Whole rates map to `n/1`, NTSC rates (23.976, 29.97, 59.94, ...) to
    /// their exact `n000/1001` form, anything else to millisecond precision.
    pub fn from_fps(frames_per_second: f64) -> Result<Self, SceneCutError> {
        if !frames_per_second.is_finite() || frames_per_second <= 0.0 {
            return Err(SceneCutError::InvalidFrameRate(frames_per_second.to_string()));
        }
        if (frames_per_second - frames_per_second.round()).abs() < 1e-6 {
            return Self::new(frames_per_second.round() as u32, 1);
        }
        let ntsc_base = (frames_per_second * 1.001).round();
        if (ntsc_base * 1000.0 / 1001.0 - frames_per_second).abs() < 2e-3 {
            return Self::new(ntsc_base as u32 * 1000, 1001);
        }
        Self::new((frames_per_second * 1000.0).round() as u32, 1000)
    }

    /// The numerator of the reduced fraction.
    pub fn numerator(&self) -> u32 {
        self.numerator
    }

    /// The denominator of the reduced fraction.
    pub fn denominator(&self) -> u32 {
        self.denominator
    }

    /// The rate as frames per second.
    pub fn as_f64(&self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }
}

impl Display for FrameRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if self.denominator == 1 {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

impl FromStr for FrameRate {
    type Err = SceneCutError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let invalid = || SceneCutError::InvalidFrameRate(value.to_string());
        match value.split_once('/') {
            Some((numerator, denominator)) => Self::new(
                numerator.trim().parse().map_err(|_| invalid())?,
                denominator.trim().parse().map_err(|_| invalid())?,
            ),
            None => Self::from_fps(value.parse().map_err(|_| invalid())?),
        }
    }
}

#[cfg(feature = "ffmpeg")]
impl TryFrom<ffmpeg_next::Rational> for FrameRate {
    type Error = SceneCutError;

    fn try_from(rational: ffmpeg_next::Rational) -> Result<Self, Self::Error> {
        let invalid = || {
            SceneCutError::InvalidFrameRate(format!(
                "{}/{}",
                rational.numerator(),
                rational.denominator()
            ))
        };
        let numerator = u32::try_from(rational.numerator()).map_err(|_| invalid())?;
        let denominator = u32::try_from(rational.denominator()).map_err(|_| invalid())?;
        Self::new(numerator, denominator)
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// A position in a video: a frame number at a fixed [`FrameRate`].
///
/// Two positions are only comparable when they share a frame rate;
/// [`PartialOrd::partial_cmp`] returns `None` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameTime {
    frame_number: u64,
    frame_rate: FrameRate,
}

impl FrameTime {
    /// Create a position from a frame number.
    pub fn from_frames(frame_number: u64, frame_rate: FrameRate) -> Self {
        Self {
            frame_number,
            frame_rate,
        }
    }

    /// Create a position from a time in seconds, rounding half-up to the
    /// nearest frame.
    ///
    /// # Errors
    ///
    /// Returns [`SceneCutError::InvalidTimecode`] for negative or non-finite
    /// values.
    pub fn from_seconds(seconds: f64, frame_rate: FrameRate) -> Result<Self, SceneCutError> {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(SceneCutError::InvalidTimecode(seconds.to_string()));
        }
        Ok(Self::from_frames(
            seconds_to_frames(seconds, frame_rate),
            frame_rate,
        ))
    }

    /// Parse a position from a string.
    ///
    /// Accepted forms:
    ///
    /// - `HH:MM:SS[.fff]`: wall-clock time
    /// - `HH:MM:SS:FF`: wall-clock time plus a frame offset
    /// - `1234`: a frame number
    /// - `12.5s` or `12.5`: seconds
    pub fn parse(value: &str, frame_rate: FrameRate) -> Result<Self, SceneCutError> {
        let value = value.trim();
        let invalid = || SceneCutError::InvalidTimecode(value.to_string());

        if value.is_empty() {
            return Err(invalid());
        }

        if !value.contains(':') {
            if value.bytes().all(|byte| byte.is_ascii_digit()) {
                let frames = value.parse().map_err(|_| invalid())?;
                return Ok(Self::from_frames(frames, frame_rate));
            }
            let seconds: f64 = value
                .strip_suffix('s')
                .unwrap_or(value)
                .parse()
                .map_err(|_| invalid())?;
            return Self::from_seconds(seconds, frame_rate).map_err(|_| invalid());
        }

        let parts: Vec<&str> = value.split(':').collect();
        let (hours, minutes, seconds, extra_frames) = match parts.as_slice() {
            [hours, minutes, seconds] => (*hours, *minutes, *seconds, None),
            [hours, minutes, seconds, frames] => (*hours, *minutes, *seconds, Some(*frames)),
            _ => return Err(invalid()),
        };

        let hours: u64 = hours.parse().map_err(|_| invalid())?;
        let minutes: u64 = minutes.parse().map_err(|_| invalid())?;
        if minutes >= 60 {
            return Err(invalid());
        }

        match extra_frames {
            None => {
                let seconds: f64 = seconds.parse().map_err(|_| invalid())?;
                if !(0.0..60.0).contains(&seconds) {
                    return Err(invalid());
                }
                let total = (hours * 3600 + minutes * 60) as f64 + seconds;
                Self::from_seconds(total, frame_rate).map_err(|_| invalid())
            }
            Some(frames) => {
                let seconds: u64 = seconds.parse().map_err(|_| invalid())?;
                let frames: u64 = frames.parse().map_err(|_| invalid())?;
                if seconds >= 60 || frames as f64 >= frame_rate.as_f64().ceil() {
                    return Err(invalid());
                }
                let whole_seconds = hours * 3600 + minutes * 60 + seconds;
                let base = seconds_to_frames(whole_seconds as f64, frame_rate);
                Ok(Self::from_frames(base + frames, frame_rate))
            }
        }
    }

    /// The frame number.
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// The frame rate this position is expressed in.
    pub fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    /// The position in seconds (`frame_number / frame_rate`).
    pub fn seconds(&self) -> f64 {
        self.frame_number as f64 * self.frame_rate.denominator as f64
            / self.frame_rate.numerator as f64
    }

    /// Exact position in whole milliseconds, rounded half-up.
    pub fn milliseconds(&self) -> u64 {
        let numerator = self.frame_rate.numerator as u128;
        let scaled = self.frame_number as u128 * self.frame_rate.denominator as u128 * 1000;
        ((scaled + numerator / 2) / numerator) as u64
    }

    /// Format as `HH:MM:SS.mmm`.
    pub fn timecode(&self) -> String {
        let total_milliseconds = self.milliseconds();
        let hours = total_milliseconds / 3_600_000;
        let minutes = (total_milliseconds / 60_000) % 60;
        let seconds = (total_milliseconds / 1000) % 60;
        let milliseconds = total_milliseconds % 1000;
        format!("{hours:02}:{minutes:02}:{seconds:02}.{milliseconds:03}")
    }

    /// Number of frames from `earlier` to `self`, saturating at zero.
    ///
    /// # Errors
    ///
    /// Returns [`SceneCutError::FrameRateMismatch`] if the frame rates differ.
    pub fn frames_since(&self, earlier: &FrameTime) -> Result<u64, SceneCutError> {
        self.ensure_same_rate(earlier)?;
        Ok(self.frame_number.saturating_sub(earlier.frame_number))
    }

    /// Check that `other` shares this position's frame rate.
    pub fn ensure_same_rate(&self, other: &FrameTime) -> Result<(), SceneCutError> {
        if self.frame_rate == other.frame_rate {
            Ok(())
        } else {
            Err(SceneCutError::FrameRateMismatch {
                expected: self.frame_rate,
                found: other.frame_rate,
            })
        }
    }
}

fn seconds_to_frames(seconds: f64, frame_rate: FrameRate) -> u64 {
    let exact = seconds * frame_rate.numerator as f64 / frame_rate.denominator as f64;
    (exact + 0.5).floor() as u64
}

impl PartialOrd for FrameTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.frame_rate != other.frame_rate {
            return None;
        }
        Some(self.frame_number.cmp(&other.frame_number))
    }
}

impl Add<u64> for FrameTime {
    type Output = FrameTime;

    fn add(self, frames: u64) -> FrameTime {
        FrameTime::from_frames(self.frame_number.saturating_add(frames), self.frame_rate)
    }
}

impl Sub<u64> for FrameTime {
    type Output = FrameTime;

    fn sub(self, frames: u64) -> FrameTime {
        FrameTime::from_frames(self.frame_number.saturating_sub(frames), self.frame_rate)
    }
}

impl Display for FrameTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.timecode())
    }
}
