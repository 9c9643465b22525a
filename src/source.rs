//! Frame sources.
//!
//! The detection pipeline pulls decoded frames through the [`FrameSource`]
//! trait. This crate ships [`MemorySource`] for frames that are already in
//! memory (synthetic clips, image sequences, tests) and, with the `ffmpeg`
//! feature, [`FfmpegSource`](crate::FfmpegSource) for video files.

use image::RgbImage;

use crate::{
    error::SceneCutError,
    frame_time::{FrameRate, FrameTime},
};

/// A seekable, resettable supplier of decoded RGB frames.
///
/// Opening a source is the job of the implementing type's constructor; a
/// source that cannot be opened never exists, so every method here may
/// assume an open stream.
///
/// Implementations must be [`Send`]: the pipeline reads frames on a
/// dedicated decode thread.
pub trait FrameSource: Send {
    /// Decode the next frame.
    ///
    /// Returns `Ok(None)` at end of stream. [`SceneCutError::FrameRead`]
    /// means exactly one frame was lost and the stream position advanced
    /// past it. Input that never becomes a frame, such as a corrupt packet,
    /// must be skipped inside the source. Any other error ends the run.
    fn read_next_frame(&mut self) -> Result<Option<RgbImage>, SceneCutError>;

    /// Position the source so the next call to
    /// [`read_next_frame`](FrameSource::read_next_frame) returns the frame
    /// at `position`.
    fn seek(&mut self, position: FrameTime) -> Result<(), SceneCutError>;

    /// The native frame rate.
    fn frame_rate(&self) -> FrameRate;

    /// The native `(width, height)` of decoded frames.
    fn resolution(&self) -> (u32, u32);

    /// The total number of frames, if known.
    fn total_frames(&self) -> Option<u64>;

    /// Rewind to the first frame.
    fn reset(&mut self) -> Result<(), SceneCutError>;
}

/// A [`FrameSource`] over frames held in memory.
///
/// # Example
///
/// ```
/// use image::{Rgb, RgbImage};
/// use scenecut::{FrameRate, FrameSource, MemorySource};
///
/// let frames = vec![RgbImage::from_pixel(4, 4, Rgb([0, 0, 0])); 10];
/// let mut source = MemorySource::new(frames, FrameRate::new(25, 1)?)?;
/// assert_eq!(source.total_frames(), Some(10));
/// assert!(source.read_next_frame()?.is_some());
/// # Ok::<(), scenecut::SceneCutError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MemorySource {
    frames: Vec<RgbImage>,
    frame_rate: FrameRate,
    resolution: (u32, u32),
    position: usize,
}

impl MemorySource {
    /// Wrap a list of frames.
    ///
    /// The resolution reported is that of the first frame.
    ///
    /// # Errors
    ///
    /// Returns [`SceneCutError::NoVideoStream`] if `frames` is empty.
    pub fn new(frames: Vec<RgbImage>, frame_rate: FrameRate) -> Result<Self, SceneCutError> {
        let resolution = frames
            .first()
            .map(|frame| frame.dimensions())
            .ok_or(SceneCutError::NoVideoStream)?;
        Ok(Self {
            frames,
            frame_rate,
            resolution,
            position: 0,
        })
    }

    /// Index of the next frame to be returned.
    pub fn position(&self) -> usize {
        self.position
    }
}

impl FrameSource for MemorySource {
    fn read_next_frame(&mut self) -> Result<Option<RgbImage>, SceneCutError> {
        let frame = self.frames.get(self.position).cloned();
        if frame.is_some() {
            self.position += 1;
        }
        Ok(frame)
    }

    fn seek(&mut self, position: FrameTime) -> Result<(), SceneCutError> {
        if position.frame_rate() != self.frame_rate {
            return Err(SceneCutError::FrameRateMismatch {
                expected: self.frame_rate,
                found: position.frame_rate(),
            });
        }
        self.position = usize::try_from(position.frame_number())
            .unwrap_or(usize::MAX)
            .min(self.frames.len());
        Ok(())
    }

    fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn total_frames(&self) -> Option<u64> {
        Some(self.frames.len() as u64)
    }

    fn reset(&mut self) -> Result<(), SceneCutError> {
        self.position = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    fn source(count: u8) -> MemorySource {
        let frames = (0..count)
            .map(|value| RgbImage::from_pixel(2, 2, Rgb([value, value, value])))
            .collect();
        MemorySource::new(frames, FrameRate::new(25, 1).unwrap()).unwrap()
    }

    #[test]
    fn empty_source_is_rejected() {
        let result = MemorySource::new(Vec::new(), FrameRate::new(25, 1).unwrap());
        assert!(matches!(result, Err(SceneCutError::NoVideoStream)));
    }

    #[test]
    fn reads_in_order_then_ends() {
        let mut source = source(3);
        for expected in 0..3u8 {
            let frame = source.read_next_frame().unwrap().unwrap();
            assert_eq!(frame.get_pixel(0, 0)[0], expected);
        }
        assert!(source.read_next_frame().unwrap().is_none());
    }

    #[test]
    fn seek_and_reset() {
        let mut source = source(5);
        let rate = source.frame_rate();
        source.seek(FrameTime::from_frames(3, rate)).unwrap();
        assert_eq!(source.read_next_frame().unwrap().unwrap().get_pixel(0, 0)[0], 3);
        source.seek(FrameTime::from_frames(50, rate)).unwrap();
        assert!(source.read_next_frame().unwrap().is_none());
        source.reset().unwrap();
        assert_eq!(source.position(), 0);
    }

    #[test]
    fn seek_rejects_other_rates() {
        let mut source = source(2);
        let other = FrameTime::from_frames(1, FrameRate::new(30, 1).unwrap());
        assert!(source.seek(other).is_err());
    }
}
