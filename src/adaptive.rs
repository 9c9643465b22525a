//! Adaptive cut detection.
//!
//! [`AdaptiveDetector`] scores frames like the
//! [`ContentDetector`](crate::ContentDetector), then compares each score
//! with the mean score of its neighbours. A frame is a cut when it stands
//! out from its surroundings by more than `adaptive_threshold` times, which
//! suppresses false cuts during fast camera motion where every frame scores
//! high.
//!
//! Each frame needs `window_width` frames on both sides, so cuts are
//! reported `window_width` frames late and the first `window_width` scored
//! frames are never judged. The last frames are judged against a truncated
//! window by [`Detector::finalize`].

use image::RgbImage;

use crate::{
    content::{ContentScorer, validate_threshold},
    detector::{CutSpacing, Detector},
    error::SceneCutError,
    frame_time::FrameTime,
    metrics::ComponentWeights,
    stats::StatsCache,
    window::{Evaluation, RollingWindow},
};

/// Upper bound on the adaptive ratio.
const MAX_RATIO: f64 = 255.0;

/// Neighbour means below this are treated as zero.
const MEAN_EPSILON: f64 = 1e-5;

/// Adaptive detector settings.
#[derive(Debug, Clone)]
pub struct AdaptiveOptions {
    /// Ratio of a frame's score to its neighbours' mean required for a cut.
    /// Default: 3.0.
    pub adaptive_threshold: f64,
    /// Minimum frames between two cuts. Default: 15.
    pub min_scene_len: u64,
    /// Neighbours considered on each side of a frame. Default: 2.
    pub window_width: usize,
    /// Minimum raw content score for a cut. Default: 15.0.
    pub min_content_val: f64,
    /// Weight of each HSV component in the score. Default: equal weights.
    pub weights: ComponentWeights,
}

impl Default for AdaptiveOptions {
    fn default() -> Self {
        Self {
            adaptive_threshold: 3.0,
            min_scene_len: 15,
            window_width: 2,
            min_content_val: 15.0,
            weights: ComponentWeights::DEFAULT,
        }
    }
}

impl AdaptiveOptions {
    /// Create adaptive detector settings with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ratio threshold.
    #[must_use]
    pub fn adaptive_threshold(mut self, threshold: f64) -> Self {
        self.adaptive_threshold = threshold;
        self
    }

    /// Set the minimum scene length in frames.
    #[must_use]
    pub fn min_scene_len(mut self, frames: u64) -> Self {
        self.min_scene_len = frames;
        self
    }

    /// Set the number of neighbours on each side.
    #[must_use]
    pub fn window_width(mut self, width: usize) -> Self {
        self.window_width = width;
        self
    }

    /// Set the minimum raw content score.
    #[must_use]
    pub fn min_content_val(mut self, value: f64) -> Self {
        self.min_content_val = value;
        self
    }

    /// Set the component weights.
    #[must_use]
    pub fn weights(mut self, weights: ComponentWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Score on brightness changes only.
    #[must_use]
    pub fn luma_only(mut self) -> Self {
        self.weights = ComponentWeights::LUMA_ONLY;
        self
    }

    fn validate(&self) -> Result<(), SceneCutError> {
        validate_threshold("adaptive_threshold", self.adaptive_threshold)?;
        validate_threshold("min_content_val", self.min_content_val)?;
        if self.window_width == 0 {
            return Err(SceneCutError::config("window_width", "must be at least 1"));
        }
        if !self.weights.is_valid() {
            return Err(SceneCutError::config(
                "weights",
                "weights must be finite, non-negative and not all zero",
            ));
        }
        Ok(())
    }
}

/// Detects cuts whose content change stands out from the surrounding
/// frames.
#[derive(Debug)]
pub struct AdaptiveDetector {
    adaptive_threshold: f64,
    min_content_val: f64,
    ratio_key: String,
    scorer: ContentScorer,
    window: RollingWindow,
    spacing: CutSpacing,
}

impl AdaptiveDetector {
    /// Build a detector, validating `options`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneCutError::InvalidConfiguration`] for negative or
    /// non-finite thresholds, a zero window, or unusable weights.
    pub fn new(options: AdaptiveOptions) -> Result<Self, SceneCutError> {
        options.validate()?;
        Ok(Self {
            adaptive_threshold: options.adaptive_threshold,
            min_content_val: options.min_content_val,
            ratio_key: format!("adaptive_ratio (w={})", options.window_width),
            scorer: ContentScorer::new(options.weights),
            window: RollingWindow::new(options.window_width),
            spacing: CutSpacing::new(options.min_scene_len),
        })
    }

    /// Cache key of the ratio metric, e.g. `adaptive_ratio (w=2)`.
    pub fn ratio_key(&self) -> &str {
        &self.ratio_key
    }

    fn judge(
        &mut self,
        evaluation: Evaluation,
        stats: Option<&mut StatsCache>,
    ) -> Option<FrameTime> {
        let ratio = if evaluation.neighbour_mean.abs() < MEAN_EPSILON {
            if evaluation.score >= self.min_content_val {
                MAX_RATIO
            } else {
                0.0
            }
        } else {
            (evaluation.score / evaluation.neighbour_mean).min(MAX_RATIO)
        };

        let frame_number = evaluation.position.frame_number();
        if let Some(stats) = stats {
            stats.set(frame_number, &self.ratio_key, ratio);
        }

        if ratio > self.adaptive_threshold
            && evaluation.score >= self.min_content_val
            && self.spacing.allows(frame_number)
        {
            log::trace!("adaptive: cut at frame {frame_number} (ratio {ratio:.3})");
            self.spacing.record(frame_number);
            Some(evaluation.position)
        } else {
            None
        }
    }
}

impl Detector for AdaptiveDetector {
    fn name(&self) -> &str {
        "adaptive"
    }

    fn requires_stats(&self) -> bool {
        true
    }

    fn metric_keys(&self) -> Vec<String> {
        let mut keys = ContentScorer::metric_keys();
        keys.push(self.ratio_key.clone());
        keys
    }

    fn min_scene_len(&self) -> u64 {
        self.spacing.min_scene_len()
    }

    fn reset(&mut self) {
        self.scorer.reset();
        self.window.reset();
        self.spacing.reset();
    }

    fn process_frame(
        &mut self,
        position: FrameTime,
        frame: Option<&RgbImage>,
        mut stats: Option<&mut StatsCache>,
    ) -> Vec<FrameTime> {
        let frame_number = position.frame_number();
        self.spacing.observe_start(frame_number);

        let Some(score) = self
            .scorer
            .score(frame_number, frame, stats.as_deref_mut())
        else {
            return Vec::new();
        };

        match self.window.push(position, score) {
            Some(evaluation) => self.judge(evaluation, stats).into_iter().collect(),
            None => Vec::new(),
        }
    }

    fn finalize(
        &mut self,
        _last_position: FrameTime,
        mut stats: Option<&mut StatsCache>,
    ) -> Vec<FrameTime> {
        self.window
            .drain()
            .into_iter()
            .filter_map(|evaluation| self.judge(evaluation, stats.as_deref_mut()))
            .collect()
    }
}
