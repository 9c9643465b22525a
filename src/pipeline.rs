//! The detection pipeline.
//!
//! [`DetectionPipeline`] drives a [`FrameSource`] through every registered
//! [`Detector`], merges their cut candidates and builds the scene list.
//!
//! A run has two stages connected by a bounded channel, each on its own
//! scoped thread: the decode stage reads, samples and downscales frames, and
//! the detection stage feeds them to the detectors in registration order.
//! The calling thread only waits for both, so
//! [`detect_scenes`](DetectionPipeline::detect_scenes) may be called from
//! inside an async runtime. When the channel is full the decode stage
//! blocks, so at most [`PipelineOptions::with_queue_capacity`] decoded
//! frames are held in memory at once.
//!
//! With frame skip enabled the detectors compare sampled frames rather than
//! neighbours, so the attached [`StatsCache`] is neither read nor updated
//! during that run.
//!
//! # Example
//!
//! ```
//! use image::{Rgb, RgbImage};
//! use scenecut::{
//!     ContentDetector, ContentOptions, DetectionPipeline, FrameRate, MemorySource,
//!     PipelineOptions,
//! };
//!
//! let mut frames = vec![RgbImage::from_pixel(32, 32, Rgb([0, 0, 0])); 30];
//! frames.extend(vec![RgbImage::from_pixel(32, 32, Rgb([255, 255, 255])); 30]);
//! let mut source = MemorySource::new(frames, FrameRate::new(25, 1)?)?;
//!
//! let mut pipeline = DetectionPipeline::new(PipelineOptions::new());
//! pipeline.add_detector(Box::new(ContentDetector::new(ContentOptions::new())?));
//! let scenes = pipeline.detect_scenes(&mut source)?;
//!
//! assert_eq!(scenes.len(), 2);
//! assert_eq!(scenes[1].start().frame_number(), 30);
//! # Ok::<(), scenecut::SceneCutError>(())
//! ```

use std::thread;

use image::{
    RgbImage,
    imageops::{self, FilterType},
};
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::{
    config::PipelineOptions,
    detector::Detector,
    error::SceneCutError,
    frame_time::{FrameRate, FrameTime},
    progress::ProgressTracker,
    scene::{Scene, scenes_from_boundaries},
    source::FrameSource,
    stats::StatsCache,
};

/// Whether a newly added detector needs a [`StatsCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsRequirement {
    /// The detector needs a cache; the pipeline has one (possibly just
    /// created).
    Required,
    /// The detector works without a cache.
    NotRequired,
}

/// A frame handed from the decode stage to the detection stage.
#[derive(Debug)]
struct DecodedFrame {
    position: FrameTime,
    /// `None` when the frame could not be decoded.
    image: Option<RgbImage>,
}

type DecodeMessage = Result<DecodedFrame, SceneCutError>;

/// A cut reported by one detector, before merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CutCandidate {
    pub(crate) position: FrameTime,
    /// Registration index of the reporting detector.
    pub(crate) detector: usize,
}

/// What the decode stage needs to know about the run.
#[derive(Debug, Clone, Copy)]
struct DecodePlan {
    frame_rate: FrameRate,
    first_frame: u64,
    end_frame: Option<u64>,
    frame_skip: u32,
    downscale_factor: u32,
    max_consecutive_read_errors: u32,
}

/// Runs detectors over a frame source and assembles scenes.
pub struct DetectionPipeline {
    options: PipelineOptions,
    detectors: Vec<Box<dyn Detector>>,
    stats: Option<StatsCache>,
    candidates: Vec<CutCandidate>,
    cuts: Vec<FrameTime>,
    scenes: Vec<Scene>,
    frames_processed: u64,
    downscale_factor: Option<u32>,
}

impl std::fmt::Debug for DetectionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionPipeline")
            .field("options", &self.options)
            .field("detectors", &self.detector_names())
            .field("has_stats", &self.stats.is_some())
            .field("cuts", &self.cuts.len())
            .field("frames_processed", &self.frames_processed)
            .finish()
    }
}

impl DetectionPipeline {
    /// Create a pipeline with no detectors and no stats cache.
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            detectors: Vec::new(),
            stats: None,
            candidates: Vec::new(),
            cuts: Vec::new(),
            scenes: Vec::new(),
            frames_processed: 0,
            downscale_factor: None,
        }
    }

    /// Attach a stats cache, typically one loaded from disk.
    #[must_use]
    pub fn with_stats(mut self, stats: StatsCache) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Register a detector. Detectors run in registration order.
    ///
    /// If the detector requires statistics and no cache is attached, an
    /// empty one is created.
    pub fn add_detector(&mut self, detector: Box<dyn Detector>) -> StatsRequirement {
        let requirement = if detector.requires_stats() {
            StatsRequirement::Required
        } else {
            StatsRequirement::NotRequired
        };

        if requirement == StatsRequirement::Required && self.stats.is_none() {
            log::info!(
                "Detector '{}' requires frame statistics; creating a stats cache",
                detector.name()
            );
            self.stats = Some(StatsCache::new());
        }

        log::debug!(
            "Registered detector '{}' (metrics: {})",
            detector.name(),
            detector.metric_keys().join(", ")
        );
        self.detectors.push(detector);
        requirement
    }

    /// Names of the registered detectors, in registration order.
    pub fn detector_names(&self) -> Vec<&str> {
        self.detectors.iter().map(|detector| detector.name()).collect()
    }

    /// The options this pipeline was created with.
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Merged cut positions of the last run, in order.
    pub fn cut_list(&self) -> &[FrameTime] {
        &self.cuts
    }

    /// Scenes of the last run.
    pub fn scene_list(&self) -> &[Scene] {
        &self.scenes
    }

    /// The attached stats cache, if any.
    pub fn stats(&self) -> Option<&StatsCache> {
        self.stats.as_ref()
    }

    /// Detach and return the stats cache, e.g. to save it.
    pub fn take_stats(&mut self) -> Option<StatsCache> {
        self.stats.take()
    }

    /// Frames handed to the detectors in the last run.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Downscale factor applied in the last run.
    pub fn downscale_factor(&self) -> Option<u32> {
        self.downscale_factor
    }

    /// Forget the results of the last run.
    ///
    /// Detector state is reset separately at the start of every run.
    pub fn clear(&mut self) {
        self.candidates.clear();
        self.cuts.clear();
        self.scenes.clear();
        self.frames_processed = 0;
        self.downscale_factor = None;
    }

    /// Remove every registered detector.
    pub fn clear_detectors(&mut self) {
        self.detectors.clear();
    }

    /// Analyse `source` and return its scenes.
    ///
    /// Every registered detector is [reset](Detector::reset) first, so the
    /// same pipeline can analyse a source again after
    /// [`FrameSource::reset`].
    ///
    /// # Errors
    ///
    /// - [`SceneCutError::InvalidConfiguration`] or
    ///   [`SceneCutError::FrameRateMismatch`] if the options do not fit the
    ///   source.
    /// - [`SceneCutError::NoVideoStream`] if the source reports no picture.
    /// - [`SceneCutError::FrameRead`] if too many consecutive frames fail to
    ///   decode.
    /// - [`SceneCutError::Cancelled`] if the cancellation token fires.
    pub fn detect_scenes(
        &mut self,
        source: &mut dyn FrameSource,
    ) -> Result<Vec<Scene>, SceneCutError> {
        self.clear();
        self.options.validate()?;
        for detector in &mut self.detectors {
            detector.reset();
        }

        let frame_rate = source.frame_rate();
        let resolution = source.resolution();
        if resolution.0 == 0 || resolution.1 == 0 {
            return Err(SceneCutError::NoVideoStream);
        }
        if self.detectors.is_empty() {
            log::warn!("No detectors registered; the whole range will be one scene");
        }

        let sampling = self.options.frame_skip > 0;
        if let Some(stats) = self.stats.as_mut() {
            if sampling {
                log::warn!(
                    "Frame skip is {}; the stats cache is not used for this run",
                    self.options.frame_skip
                );
            } else if stats.is_compatible(frame_rate, resolution) {
                stats.bind(frame_rate, resolution);
            } else {
                log::warn!(
                    "Stats cache was recorded for {:?} at {:?} fps, source is {}x{} at {frame_rate}; discarding cached metrics",
                    stats.resolution(),
                    stats.frame_rate().map(|rate| rate.to_string()),
                    resolution.0,
                    resolution.1,
                );
                stats.invalidate(frame_rate, resolution);
            }
        }

        let start = match self.options.start {
            Some(start) => {
                ensure_rate(frame_rate, start)?;
                if start.frame_number() > 0 {
                    source.seek(start)?;
                }
                start
            }
            None => FrameTime::from_frames(0, frame_rate),
        };
        let end_frame = match self.options.end {
            Some(end) => {
                ensure_rate(frame_rate, end)?;
                Some(end.frame_number())
            }
            None => None,
        };

        let downscale_factor = self.options.downscale.resolve(resolution.0);
        self.downscale_factor = Some(downscale_factor);
        log::debug!(
            "Analysing {}x{} @ {frame_rate} fps from frame {}, downscale factor {downscale_factor}",
            resolution.0,
            resolution.1,
            start.frame_number(),
        );

        if self.options.is_cancelled() {
            return Err(SceneCutError::Cancelled);
        }

        let plan = DecodePlan {
            frame_rate,
            first_frame: start.frame_number(),
            end_frame,
            frame_skip: self.options.frame_skip,
            downscale_factor,
            max_consecutive_read_errors: self.options.max_consecutive_read_errors,
        };
        let expected_frames = source.total_frames().map(|total| {
            let stop = end_frame.map_or(total, |end| end.min(total));
            stop.saturating_sub(plan.first_frame)
                .div_ceil(u64::from(plan.frame_skip) + 1)
        });

        let (sender, receiver) = mpsc::channel(self.options.queue_capacity.max(1));
        let range = thread::scope(|scope| {
            scope.spawn(move || decode_stage(source, sender, plan));
            let detection = scope.spawn(|| self.detection_stage(receiver, expected_frames));
            detection.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        })?;

        let Some((first, last)) = range else {
            log::info!("Source yielded no frames");
            return Ok(Vec::new());
        };

        for (index, detector) in self.detectors.iter_mut().enumerate() {
            let stats = self.stats.as_mut().filter(|_| !sampling);
            let flushed = detector.finalize(last, stats);
            self.candidates.extend(
                flushed
                    .into_iter()
                    .map(|position| CutCandidate { position, detector: index }),
            );
        }

        self.cuts = merge_candidates(&self.candidates, self.options.min_scene_len);
        self.scenes = scenes_from_boundaries(&self.cuts, first, last + 1);
        log::info!(
            "Processed {} frames: {} cut candidates, {} scenes",
            self.frames_processed,
            self.candidates.len(),
            self.scenes.len()
        );
        Ok(self.scenes.clone())
    }

    /// Receive frames until the decode stage finishes.
    ///
    /// Returns the first and last processed positions, or `None` if no frame
    /// arrived. The receiver is dropped on return, which stops the decode
    /// stage if it is still running.
    fn detection_stage(
        &mut self,
        mut receiver: Receiver<DecodeMessage>,
        expected_frames: Option<u64>,
    ) -> Result<Option<(FrameTime, FrameTime)>, SceneCutError> {
        let mut tracker = self.options.progress.clone().map(|callback| {
            ProgressTracker::new(callback, expected_frames, self.options.batch_size)
        });
        let mut range: Option<(FrameTime, FrameTime)> = None;
        let sampling = self.options.frame_skip > 0;

        while let Some(message) = receiver.blocking_recv() {
            if self.options.is_cancelled() {
                log::info!("Detection cancelled after {} frames", self.frames_processed);
                return Err(SceneCutError::Cancelled);
            }
            let frame = message?;

            for (index, detector) in self.detectors.iter_mut().enumerate() {
                let stats = self.stats.as_mut().filter(|_| !sampling);
                let cuts = detector.process_frame(frame.position, frame.image.as_ref(), stats);
                self.candidates.extend(
                    cuts.into_iter()
                        .map(|position| CutCandidate { position, detector: index }),
                );
            }

            self.frames_processed += 1;
            range = Some(match range {
                Some((first, _)) => (first, frame.position),
                None => (frame.position, frame.position),
            });
            if let Some(tracker) = tracker.as_mut() {
                tracker.advance(frame.position, self.candidates.len());
            }
        }

        if let Some(tracker) = tracker.as_mut() {
            tracker.finish(range.map(|(_, last)| last), self.candidates.len());
        }
        Ok(range)
    }
}

fn ensure_rate(frame_rate: FrameRate, position: FrameTime) -> Result<(), SceneCutError> {
    if position.frame_rate() == frame_rate {
        Ok(())
    } else {
        Err(SceneCutError::FrameRateMismatch {
            expected: frame_rate,
            found: position.frame_rate(),
        })
    }
}

/// Decode loop, run on the worker thread.
///
/// Frame numbers are counted here from the seek position. With frame skip,
/// the frame that ends the stream is always sent even when it falls between
/// samples.
fn decode_stage(source: &mut dyn FrameSource, sender: Sender<DecodeMessage>, plan: DecodePlan) {
    let stride = u64::from(plan.frame_skip) + 1;
    let mut frame_number = plan.first_frame;
    let mut consecutive_errors = 0u32;
    let mut held_back: Option<DecodedFrame> = None;

    loop {
        if plan.end_frame.is_some_and(|end| frame_number >= end) {
            break;
        }

        let image = match source.read_next_frame() {
            Ok(Some(image)) => {
                consecutive_errors = 0;
                Some(image)
            }
            Ok(None) => break,
            Err(error @ SceneCutError::FrameRead(_)) => {
                consecutive_errors += 1;
                if consecutive_errors > plan.max_consecutive_read_errors {
                    let _ = sender.blocking_send(Err(SceneCutError::FrameRead(format!(
                        "{consecutive_errors} consecutive frames failed to decode, last at frame {frame_number}: {error}"
                    ))));
                    return;
                }
                log::warn!("Frame {frame_number} could not be decoded ({error}); treating it as unchanged");
                None
            }
            Err(error) => {
                let _ = sender.blocking_send(Err(error));
                return;
            }
        };

        let frame = DecodedFrame {
            position: FrameTime::from_frames(frame_number, plan.frame_rate),
            image,
        };
        let sampled = (frame_number - plan.first_frame) % stride == 0;
        frame_number += 1;

        if !sampled {
            held_back = Some(frame);
            continue;
        }
        held_back = None;
        if !send_frame(&sender, frame, plan.downscale_factor) {
            return;
        }
    }

    if let Some(frame) = held_back {
        send_frame(&sender, frame, plan.downscale_factor);
    }
}

/// Downscale and send one frame. Returns `false` once the detection stage
/// has gone away.
fn send_frame(sender: &Sender<DecodeMessage>, mut frame: DecodedFrame, factor: u32) -> bool {
    frame.image = frame.image.map(|image| downscale(image, factor));
    if sender.blocking_send(Ok(frame)).is_err() {
        log::debug!("Detection stage stopped; ending decode");
        return false;
    }
    true
}

fn downscale(image: RgbImage, factor: u32) -> RgbImage {
    if factor <= 1 {
        return image;
    }
    let width = (image.width() / factor).max(1);
    let height = (image.height() / factor).max(1);
    imageops::resize(&image, width, height, FilterType::Triangle)
}

/// Merge candidates from several detectors into one ordered cut list.
///
/// Candidates are taken in `(frame, detector)` order. A candidate closer
/// than `min_scene_len` frames to the previous boundary is folded into it
/// unless that boundary already holds a candidate from the same detector.
/// Repeated positions are kept once.
pub(crate) fn merge_candidates(candidates: &[CutCandidate], min_scene_len: u64) -> Vec<FrameTime> {
    let mut ordered = candidates.to_vec();
    ordered.sort_by_key(|candidate| (candidate.position.frame_number(), candidate.detector));

    let mut boundaries: Vec<(FrameTime, Vec<usize>)> = Vec::new();
    for candidate in ordered {
        if let Some((boundary, detectors)) = boundaries.last_mut() {
            let distance = candidate.position.frame_number() - boundary.frame_number();
            if distance < min_scene_len && !detectors.contains(&candidate.detector) {
                detectors.push(candidate.detector);
                continue;
            }
            if distance == 0 {
                continue;
            }
        }
        boundaries.push((candidate.position, vec![candidate.detector]));
    }

    boundaries.into_iter().map(|(boundary, _)| boundary).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(frame: u64, detector: usize) -> CutCandidate {
        CutCandidate {
            position: FrameTime::from_frames(frame, FrameRate::new(25, 1).unwrap()),
            detector,
        }
    }

    fn frames(cuts: &[FrameTime]) -> Vec<u64> {
        cuts.iter().map(|cut| cut.frame_number()).collect()
    }

    #[test]
    fn merge_folds_nearby_cuts_from_other_detectors() {
        let candidates = [candidate(100, 1), candidate(104, 0), candidate(300, 0)];
        assert_eq!(frames(&merge_candidates(&candidates, 15)), vec![100, 300]);
    }

    #[test]
    fn merge_keeps_cuts_from_the_same_detector() {
        let candidates = [candidate(100, 0), candidate(104, 0)];
        assert_eq!(frames(&merge_candidates(&candidates, 15)), vec![100, 104]);
    }

    #[test]
    fn merge_deduplicates_identical_positions() {
        let candidates = [candidate(50, 0), candidate(50, 1), candidate(50, 1)];
        assert_eq!(frames(&merge_candidates(&candidates, 0)), vec![50]);
    }

    #[test]
    fn merge_is_order_independent() {
        let forward = [candidate(10, 0), candidate(12, 1), candidate(40, 1)];
        let mut backward = forward;
        backward.reverse();
        assert_eq!(
            merge_candidates(&forward, 5),
            merge_candidates(&backward, 5)
        );
    }

    #[test]
    fn downscale_divides_dimensions() {
        let image = RgbImage::new(640, 360);
        assert_eq!(downscale(image.clone(), 1).dimensions(), (640, 360));
        assert_eq!(downscale(image, 4).dimensions(), (160, 90));
        assert_eq!(downscale(RgbImage::new(3, 3), 8).dimensions(), (1, 1));
    }
}
