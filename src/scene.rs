//! Scene lists.
//!
//! A [`Scene`] is a contiguous, half-open range of frames. The pipeline
//! turns merged cut positions into a gap-free list of scenes covering the
//! whole analysed range.
//!
//! # Example
//!
//! ```
//! use scenecut::{FrameRate, FrameTime, Scene, cut_timecodes};
//!
//! let rate = FrameRate::new(25, 1)?;
//! let scenes = vec![
//!     Scene::new(FrameTime::from_frames(0, rate), FrameTime::from_frames(50, rate))?,
//!     Scene::new(FrameTime::from_frames(50, rate), FrameTime::from_frames(90, rate))?,
//! ];
//! assert_eq!(cut_timecodes(&scenes), "00:00:02.000");
//! # Ok::<(), scenecut::SceneCutError>(())
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::{error::SceneCutError, frame_time::FrameTime};

/// A scene: frames from `start` up to, but not including, `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scene {
    start: FrameTime,
    end: FrameTime,
}

impl Scene {
    /// Create a scene.
    ///
    /// # Errors
    ///
    /// Returns [`SceneCutError::FrameRateMismatch`] if the bounds use
    /// different rates, and [`SceneCutError::InvalidConfiguration`] if `end`
    /// is not after `start`.
    pub fn new(start: FrameTime, end: FrameTime) -> Result<Self, SceneCutError> {
        start.ensure_same_rate(&end)?;
        if end.frame_number() <= start.frame_number() {
            return Err(SceneCutError::config(
                "scene",
                format!(
                    "end frame {} must be after start frame {}",
                    end.frame_number(),
                    start.frame_number()
                ),
            ));
        }
        Ok(Self { start, end })
    }

    /// First frame of the scene.
    pub fn start(&self) -> FrameTime {
        self.start
    }

    /// First frame after the scene.
    pub fn end(&self) -> FrameTime {
        self.end
    }

    /// Number of frames in the scene.
    pub fn frame_count(&self) -> u64 {
        self.end.frame_number() - self.start.frame_number()
    }

    /// Length of the scene as a frame-accurate position at the same rate.
    pub fn duration(&self) -> FrameTime {
        FrameTime::from_frames(self.frame_count(), self.start.frame_rate())
    }

    /// Duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.end.seconds() - self.start.seconds()
    }

    /// Whether `position` falls inside the scene.
    pub fn contains(&self, position: FrameTime) -> bool {
        (self.start.frame_number()..self.end.frame_number()).contains(&position.frame_number())
    }
}

impl Display for Scene {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{} - {}", self.start.timecode(), self.end.timecode())
    }
}

/// Comma-separated timecodes of every scene start except the first, the
/// form accepted by most video splitting tools.
pub fn cut_timecodes(scenes: &[Scene]) -> String {
    scenes
        .iter()
        .skip(1)
        .map(|scene| scene.start.timecode())
        .collect::<Vec<_>>()
        .join(",")
}

/// Split `[first, end)` at every boundary strictly inside it.
///
/// `boundaries` must be sorted. An empty range yields no scenes.
pub(crate) fn scenes_from_boundaries(
    boundaries: &[FrameTime],
    first: FrameTime,
    end: FrameTime,
) -> Vec<Scene> {
    if end.frame_number() <= first.frame_number() {
        return Vec::new();
    }

    let mut scenes = Vec::with_capacity(boundaries.len() + 1);
    let mut start = first;
    for &boundary in boundaries {
        if boundary.frame_number() <= start.frame_number()
            || boundary.frame_number() >= end.frame_number()
        {
            continue;
        }
        scenes.push(Scene {
            start,
            end: boundary,
        });
        start = boundary;
    }
    scenes.push(Scene { start, end });
    scenes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_time::FrameRate;

    fn at(frame: u64) -> FrameTime {
        FrameTime::from_frames(frame, FrameRate::new(25, 1).unwrap())
    }

    #[test]
    fn no_boundaries_yields_one_scene() {
        let scenes = scenes_from_boundaries(&[], at(10), at(40));
        assert_eq!(scenes, vec![Scene::new(at(10), at(40)).unwrap()]);
        assert_eq!(scenes[0].frame_count(), 30);
        assert_eq!(scenes[0].duration(), at(30));
        assert!((scenes[0].duration_seconds() - 1.2).abs() < 1e-9);
    }

    #[test]
    fn empty_range_yields_nothing() {
        assert!(scenes_from_boundaries(&[at(3)], at(5), at(5)).is_empty());
    }

    #[test]
    fn boundaries_outside_range_are_ignored() {
        let scenes = scenes_from_boundaries(&[at(0), at(10), at(20), at(30)], at(0), at(30));
        let starts: Vec<u64> = scenes.iter().map(|s| s.start().frame_number()).collect();
        assert_eq!(starts, vec![0, 10, 20]);
        assert_eq!(scenes.last().unwrap().end(), at(30));
        for pair in scenes.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start());
        }
    }

    #[test]
    fn rejects_inverted_scene() {
        assert!(Scene::new(at(5), at(5)).is_err());
        let other_rate = FrameTime::from_frames(9, FrameRate::new(30, 1).unwrap());
        assert!(Scene::new(at(1), other_rate).is_err());
    }

    #[test]
    fn timecode_list_skips_first_scene() {
        let scenes = scenes_from_boundaries(&[at(25), at(50)], at(0), at(75));
        assert_eq!(cut_timecodes(&scenes), "00:00:01.000,00:00:02.000");
        assert!(scenes[1].contains(at(49)));
        assert!(!scenes[1].contains(at(50)));
        assert_eq!(scenes[0].to_string(), "00:00:00.000 - 00:00:01.000");
    }
}
