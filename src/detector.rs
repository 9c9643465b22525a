//! The detector contract.
//!
//! A [`Detector`] consumes frames one at a time, in strictly increasing
//! frame order, and returns the positions where it believes a new scene
//! starts. The [`DetectionPipeline`](crate::DetectionPipeline) owns the
//! detectors, feeds them, and merges what they report.

use image::RgbImage;

use crate::{frame_time::FrameTime, stats::StatsCache};

/// A frame-by-frame scene-cut detector.
///
/// Implementations must not fail per frame: an unreadable frame is passed
/// as `None` and is scored as "no change". Invalid options are rejected when
/// the detector is constructed.
pub trait Detector: Send {
    /// Short identifier used in logs and CLI output, e.g. `"content"`.
    fn name(&self) -> &str;

    /// Whether the detector needs a [`StatsCache`] to work.
    ///
    /// The pipeline creates one when a detector returning `true` is added.
    /// Detectors returning `false` still use a cache when one is attached.
    fn requires_stats(&self) -> bool {
        false
    }

    /// The metric names this detector writes to the cache.
    fn metric_keys(&self) -> Vec<String>;

    /// Minimum distance in frames between two cuts of this detector.
    fn min_scene_len(&self) -> u64;

    /// Process one frame and return any cuts it triggers.
    ///
    /// Returned positions may lie before `position` for detectors with
    /// lookahead.
    fn process_frame(
        &mut self,
        position: FrameTime,
        frame: Option<&RgbImage>,
        stats: Option<&mut StatsCache>,
    ) -> Vec<FrameTime>;

    /// Return to the freshly constructed state, keeping the options.
    ///
    /// The pipeline calls this before every run, so one detector can
    /// analyse a source again after [`FrameSource::reset`](crate::FrameSource::reset).
    fn reset(&mut self);

    /// Flush pending cuts after the last frame at `last_position`.
    fn finalize(
        &mut self,
        last_position: FrameTime,
        stats: Option<&mut StatsCache>,
    ) -> Vec<FrameTime> {
        let _ = (last_position, stats);
        Vec::new()
    }
}

/// Tracks the most recent cut and enforces a minimum scene length.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CutSpacing {
    min_scene_len: u64,
    last_cut: Option<u64>,
}

impl CutSpacing {
    pub(crate) fn new(min_scene_len: u64) -> Self {
        Self {
            min_scene_len,
            last_cut: None,
        }
    }

    /// Anchor the spacing at the first processed frame.
    pub(crate) fn observe_start(&mut self, frame_number: u64) {
        if self.last_cut.is_none() {
            self.last_cut = Some(frame_number);
        }
    }

    /// Whether a cut at `frame_number` is far enough from the last one.
    pub(crate) fn allows(&self, frame_number: u64) -> bool {
        match self.last_cut {
            Some(last) => frame_number.saturating_sub(last) >= self.min_scene_len,
            None => true,
        }
    }

    pub(crate) fn record(&mut self, frame_number: u64) {
        self.last_cut = Some(frame_number);
    }

    pub(crate) fn reset(&mut self) {
        self.last_cut = None;
    }

    pub(crate) fn min_scene_len(&self) -> u64 {
        self.min_scene_len
    }
}
