//! Pipeline configuration.
//!
//! [`PipelineOptions`] is a builder that threads the analysed range, frame
//! sampling, downscaling, progress callbacks and cancellation tokens into a
//! [`DetectionPipeline`](crate::DetectionPipeline).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use scenecut::{CancellationToken, Downscale, PipelineOptions, ProgressCallback, ProgressInfo};
//!
//! struct LogProgress;
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{} frames done", info.frames_processed);
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = PipelineOptions::new()
//!     .with_downscale(Downscale::Factor(2))
//!     .with_frame_skip(1)
//!     .with_progress(Arc::new(LogProgress))
//!     .with_cancellation(token.clone())
//!     .with_batch_size(100);
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

use crate::{
    error::SceneCutError,
    frame_time::FrameTime,
    progress::{CancellationToken, ProgressCallback},
};

/// Width that [`Downscale::Auto`] scales frames down towards.
pub const AUTO_DOWNSCALE_TARGET_WIDTH: u32 = 256;

/// How frames are shrunk before the detectors see them.
///
/// Detection quality barely depends on resolution while cost grows with
/// pixel count, so by default frames are reduced to roughly
/// [`AUTO_DOWNSCALE_TARGET_WIDTH`] pixels wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Downscale {
    /// Integer factor of `max(1, width / 256)`.
    #[default]
    Auto,
    /// Divide both dimensions by this factor. `Factor(1)` keeps full size.
    Factor(u32),
    /// Keep full size.
    None,
}

impl Downscale {
    /// The integer factor applied to a source `width` pixels wide.
    pub fn resolve(self, width: u32) -> u32 {
        match self {
            Downscale::Auto => (width / AUTO_DOWNSCALE_TARGET_WIDTH).max(1),
            Downscale::Factor(factor) => factor.max(1),
            Downscale::None => 1,
        }
    }
}

/// Settings for a detection run.
///
/// All fields have defaults; a default-constructed value analyses every
/// frame of the source with automatic downscaling.
#[derive(Clone)]
pub struct PipelineOptions {
    pub(crate) downscale: Downscale,
    pub(crate) frame_skip: u32,
    pub(crate) start: Option<FrameTime>,
    pub(crate) end: Option<FrameTime>,
    pub(crate) min_scene_len: u64,
    pub(crate) queue_capacity: usize,
    pub(crate) max_consecutive_read_errors: u32,
    pub(crate) progress: Option<Arc<dyn ProgressCallback>>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) batch_size: u64,
}

impl Debug for PipelineOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PipelineOptions")
            .field("downscale", &self.downscale)
            .field("frame_skip", &self.frame_skip)
            .field("start", &self.start)
            .field("end", &self.end)
            .field("min_scene_len", &self.min_scene_len)
            .field("queue_capacity", &self.queue_capacity)
            .field("max_consecutive_read_errors", &self.max_consecutive_read_errors)
            .field("has_progress", &self.progress.is_some())
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineOptions {
    /// Create options with defaults: automatic downscaling, no frame skip,
    /// whole source, merge distance 15, queue of 8 frames, 32 consecutive
    /// read errors tolerated, progress every 50 frames.
    pub fn new() -> Self {
        Self {
            downscale: Downscale::Auto,
            frame_skip: 0,
            start: None,
            end: None,
            min_scene_len: 15,
            queue_capacity: 8,
            max_consecutive_read_errors: 32,
            progress: None,
            cancellation: None,
            batch_size: 50,
        }
    }

    /// Set the downscale policy.
    #[must_use]
    pub fn with_downscale(mut self, downscale: Downscale) -> Self {
        self.downscale = downscale;
        self
    }

    /// Process one frame, then skip `frames` frames, repeatedly.
    ///
    /// The first and the last frame of the range are always processed.
    #[must_use]
    pub fn with_frame_skip(mut self, frames: u32) -> Self {
        self.frame_skip = frames;
        self
    }

    /// Start analysis at `start`.
    #[must_use]
    pub fn with_start(mut self, start: FrameTime) -> Self {
        self.start = Some(start);
        self
    }

    /// Stop analysis before `end` (exclusive).
    #[must_use]
    pub fn with_end(mut self, end: FrameTime) -> Self {
        self.end = Some(end);
        self
    }

    /// Cuts from different detectors closer than `frames` are merged.
    #[must_use]
    pub fn with_min_scene_len(mut self, frames: u64) -> Self {
        self.min_scene_len = frames;
        self
    }

    /// Number of decoded frames buffered between the decode and detection
    /// stages. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Abort the run after more than `count` unreadable frames in a row.
    #[must_use]
    pub fn with_max_consecutive_read_errors(mut self, count: u32) -> Self {
        self.max_consecutive_read_errors = count;
        self
    }

    /// Attach a progress callback.
    ///
    /// The callback is invoked every [`batch_size`](PipelineOptions::with_batch_size)
    /// processed frames and once when the run completes.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Attach a cancellation token.
    ///
    /// When the token is cancelled, the run stops before the next frame and
    /// returns [`SceneCutError::Cancelled`].
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Set how often the progress callback fires. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// The downscale policy.
    pub fn downscale(&self) -> Downscale {
        self.downscale
    }

    /// The merge distance in frames.
    pub fn min_scene_len(&self) -> u64 {
        self.min_scene_len
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }

    pub(crate) fn validate(&self) -> Result<(), SceneCutError> {
        if let Downscale::Factor(0) = self.downscale {
            return Err(SceneCutError::config("downscale", "factor must be at least 1"));
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            start.ensure_same_rate(&end)?;
            if end.frame_number() <= start.frame_number() {
                return Err(SceneCutError::config(
                    "end",
                    format!(
                        "end frame {} must be after start frame {}",
                        end.frame_number(),
                        start.frame_number()
                    ),
                ));
            }
        }
        Ok(())
    }
}
