//! Progress reporting and cancellation support.
//!
//! This module provides [`ProgressCallback`] for monitoring a detection run,
//! [`CancellationToken`] for cooperative cancellation, and [`ProgressInfo`]
//! for progress snapshots.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use scenecut::{
//!     CancellationToken, ContentDetector, ContentOptions, DetectionPipeline,
//!     FfmpegSource, PipelineOptions, ProgressCallback, ProgressInfo,
//! };
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("{pct:.1}% complete, {} cuts so far", info.cuts_detected);
//!         }
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = PipelineOptions::new()
//!     .with_progress(Arc::new(PrintProgress))
//!     .with_cancellation(token.clone());
//! let mut pipeline = DetectionPipeline::new(options);
//! pipeline.add_detector(Box::new(ContentDetector::new(ContentOptions::new())?));
//! let scenes = pipeline.detect_scenes(&mut FfmpegSource::open("input.mp4")?)?;
//! # Ok::<(), scenecut::SceneCutError>(())
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use crate::frame_time::FrameTime;

/// A snapshot of detection progress.
///
/// Delivered to [`ProgressCallback::on_progress`] every
/// [`PipelineOptions::batch_size`](crate::PipelineOptions) processed frames
/// and once more when the run completes.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Frames handed to the detectors so far.
    pub frames_processed: u64,
    /// Frames expected in the analysed range, if the source knows.
    pub total_frames: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total_frames` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time since the run started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// Position of the most recent processed frame.
    pub position: Option<FrameTime>,
    /// Cut candidates reported by all detectors so far (before merging).
    pub cuts_detected: usize,
}

/// Trait for receiving progress updates during detection.
///
/// Progress callbacks are infallible: they observe but cannot halt the run.
/// Use [`CancellationToken`] for cooperative cancellation.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals during a detection run.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone the token and share it between threads; call
/// [`cancel`](CancellationToken::cancel) from any of them to stop the
/// associated run before its next frame.
///
/// # Example
///
/// ```
/// use scenecut::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.clone().cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks timing for a run and emits callbacks in batches.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    total: Option<u64>,
    current: u64,
    batch_size: u64,
    start_time: Instant,
    since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, total: Option<u64>, batch_size: u64) -> Self {
        Self {
            callback,
            total,
            current: 0,
            batch_size: batch_size.max(1),
            start_time: Instant::now(),
            since_last_report: 0,
        }
    }

    /// Record one processed frame.
    pub(crate) fn advance(&mut self, position: FrameTime, cuts_detected: usize) {
        self.current += 1;
        self.since_last_report += 1;

        if self.since_last_report >= self.batch_size {
            self.report(Some(position), cuts_detected);
            self.since_last_report = 0;
        }
    }

    /// Unconditionally emit a final report.
    pub(crate) fn finish(&mut self, position: Option<FrameTime>, cuts_detected: usize) {
        self.report(position, cuts_detected);
    }

    fn report(&self, position: Option<FrameTime>, cuts_detected: usize) {
        let elapsed = self.start_time.elapsed();

        let percentage = self
            .total
            .filter(|&total| total > 0)
            .map(|total| ((self.current as f32 / total as f32) * 100.0).min(100.0));

        let estimated_remaining = if self.current > 0 {
            self.total.map(|total| {
                let remaining = total.saturating_sub(self.current);
                elapsed.mul_f64(remaining as f64 / self.current as f64)
            })
        } else {
            None
        };

        self.callback.on_progress(&ProgressInfo {
            frames_processed: self.current,
            total_frames: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            position,
            cuts_detected,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::frame_time::FrameRate;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressInfo>>);

    impl ProgressCallback for Recorder {
        fn on_progress(&self, info: &ProgressInfo) {
            self.0.lock().unwrap().push(info.clone());
        }
    }

    #[test]
    fn reports_every_batch_and_on_finish() {
        let recorder = Arc::new(Recorder::default());
        let mut tracker = ProgressTracker::new(recorder.clone(), Some(10), 4);
        let rate = FrameRate::new(25, 1).unwrap();
        for frame in 0..10 {
            tracker.advance(FrameTime::from_frames(frame, rate), 0);
        }
        tracker.finish(None, 2);

        let reports = recorder.0.lock().unwrap();
        let counts: Vec<u64> = reports.iter().map(|info| info.frames_processed).collect();
        assert_eq!(counts, vec![4, 8, 10]);
        assert_eq!(reports[2].percentage, Some(100.0));
        assert_eq!(reports[2].cuts_detected, 2);
        assert_eq!(
            reports[0].position.map(|position| position.frame_number()),
            Some(3)
        );
    }

    #[test]
    fn unknown_total_has_no_percentage() {
        let recorder = Arc::new(Recorder::default());
        let mut tracker = ProgressTracker::new(recorder.clone(), None, 0);
        tracker.advance(FrameTime::from_frames(0, FrameRate::new(30, 1).unwrap()), 0);
        let reports = recorder.0.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].percentage.is_none());
        assert!(reports[0].estimated_remaining.is_none());
    }
}
