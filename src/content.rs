//! Content-aware cut detection.
//!
//! [`ContentDetector`] compares each frame with the previous one in HSV
//! space and reports a cut when the weighted mean change exceeds the
//! configured threshold. Scores use the 8-bit HSV scale (hue `0..180`,
//! saturation and value `0..=255`), so a threshold of 27 means an average
//! per-channel change of 27 levels.
//!
//! # Example
//!
//! ```
//! use scenecut::{ContentDetector, ContentOptions};
//!
//! let detector = ContentDetector::new(ContentOptions::new().threshold(30.0).luma_only())?;
//! # Ok::<(), scenecut::SceneCutError>(())
//! ```

use image::RgbImage;

use crate::{
    detector::{CutSpacing, Detector},
    error::SceneCutError,
    frame_time::FrameTime,
    metrics::{ComponentDeltas, ComponentWeights, HsvFrame},
    stats::StatsCache,
};

/// Cache key of the weighted content score.
pub const CONTENT_VAL: &str = "content_val";
/// Cache key of the mean hue change.
pub const DELTA_HUE: &str = "delta_hue";
/// Cache key of the mean saturation change.
pub const DELTA_SAT: &str = "delta_sat";
/// Cache key of the mean luma change.
pub const DELTA_LUM: &str = "delta_lum";

const DELTA_KEYS: [&str; 3] = [DELTA_HUE, DELTA_SAT, DELTA_LUM];

/// Content detector settings.
#[derive(Debug, Clone)]
pub struct ContentOptions {
    /// Score above which a cut is reported. Default: 27.0.
    pub threshold: f64,
    /// Minimum frames between two cuts. Default: 15.
    pub min_scene_len: u64,
    /// Weight of each HSV component in the score. Default: equal weights.
    pub weights: ComponentWeights,
}

impl Default for ContentOptions {
    fn default() -> Self {
        Self {
            threshold: 27.0,
            min_scene_len: 15,
            weights: ComponentWeights::DEFAULT,
        }
    }
}

impl ContentOptions {
    /// Create content detector settings with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cut threshold.
    #[must_use]
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the minimum scene length in frames.
    #[must_use]
    pub fn min_scene_len(mut self, frames: u64) -> Self {
        self.min_scene_len = frames;
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

    pub(crate) fn validate(&self) -> Result<(), SceneCutError> {
        validate_threshold("threshold", self.threshold)?;
        if !self.weights.is_valid() {
            return Err(SceneCutError::config(
                "weights",
                "weights must be finite, non-negative and not all zero",
            ));
        }
        Ok(())
    }
}

pub(crate) fn validate_threshold(parameter: &'static str, value: f64) -> Result<(), SceneCutError> {
    if !value.is_finite() || value < 0.0 {
        return Err(SceneCutError::config(
            parameter,
            format!("must be a finite, non-negative number (got {value})"),
        ));
    }
    Ok(())
}

/// The previous frame, kept in whichever form is cheapest to hold.
#[derive(Debug)]
enum LastFrame {
    /// Scores came from the cache, so the frame was never converted.
    Raw(RgbImage),
    Hsv(HsvFrame),
}

impl LastFrame {
    fn into_hsv(self) -> HsvFrame {
        match self {
            LastFrame::Raw(frame) => HsvFrame::from_rgb(&frame),
            LastFrame::Hsv(hsv) => hsv,
        }
    }
}

/// Frame-to-frame HSV change scoring, shared by the content and adaptive
/// detectors.
#[derive(Debug)]
pub(crate) struct ContentScorer {
    weights: ComponentWeights,
    last_frame: Option<LastFrame>,
    started: bool,
}

impl ContentScorer {
    pub(crate) fn new(weights: ComponentWeights) -> Self {
        Self {
            weights,
            last_frame: None,
            started: false,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.last_frame = None;
        self.started = false;
    }

    pub(crate) fn metric_keys() -> Vec<String> {
        [CONTENT_VAL, DELTA_HUE, DELTA_SAT, DELTA_LUM]
            .iter()
            .map(|key| key.to_string())
            .collect()
    }

    /// Score the change from the previous frame.
    ///
    /// Returns `None` for the first frame seen.
    pub(crate) fn score(
        &mut self,
        frame_number: u64,
        frame: Option<&RgbImage>,
        mut stats: Option<&mut StatsCache>,
    ) -> Option<f64> {
        if !self.started {
            self.started = true;
            self.last_frame = frame.map(|frame| LastFrame::Raw(frame.clone()));
            return None;
        }

        let cached = stats
            .as_deref()
            .and_then(|stats| stats.get_many(frame_number, &DELTA_KEYS));
        if let Some(values) = cached {
            let deltas = ComponentDeltas {
                hue: values[0],
                saturation: values[1],
                luma: values[2],
            };
            let score = deltas.score(&self.weights);
            if let Some(stats) = stats {
                stats.set(frame_number, CONTENT_VAL, score);
            }
            if let Some(frame) = frame {
                self.last_frame = Some(LastFrame::Raw(frame.clone()));
            }
            return Some(score);
        }

        let Some(frame) = frame else {
            log::debug!("Frame {frame_number} is unreadable; scoring it as unchanged");
            return Some(0.0);
        };

        let current = HsvFrame::from_rgb(frame);
        let previous = self.last_frame.take().map(LastFrame::into_hsv);
        let deltas = previous.as_ref().and_then(|previous| current.delta(previous));
        let score = match (deltas, previous) {
            (Some(deltas), _) => {
                let score = deltas.score(&self.weights);
                if let Some(stats) = stats.as_deref_mut() {
                    stats.set(frame_number, DELTA_HUE, deltas.hue);
                    stats.set(frame_number, DELTA_SAT, deltas.saturation);
                    stats.set(frame_number, DELTA_LUM, deltas.luma);
                    stats.set(frame_number, CONTENT_VAL, score);
                }
                score
            }
            (None, Some(previous)) => {
                log::warn!(
                    "Frame {frame_number} is {:?} but the previous frame was {:?}; scoring it as unchanged",
                    current.dimensions(),
                    previous.dimensions(),
                );
                0.0
            }
            (None, None) => 0.0,
        };
        self.last_frame = Some(LastFrame::Hsv(current));
        Some(score)
    }
}

/// Detects fast cuts from frame-to-frame changes in hue, saturation and
/// brightness.
#[derive(Debug)]
pub struct ContentDetector {
    threshold: f64,
    scorer: ContentScorer,
    spacing: CutSpacing,
}

impl ContentDetector {
    /// Build a detector, validating `options`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneCutError::InvalidConfiguration`] for a negative or
    /// non-finite threshold or unusable weights.
    pub fn new(options: ContentOptions) -> Result<Self, SceneCutError> {
        options.validate()?;
        Ok(Self {
            threshold: options.threshold,
            scorer: ContentScorer::new(options.weights),
            spacing: CutSpacing::new(options.min_scene_len),
        })
    }

    /// The configured threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl Detector for ContentDetector {
    fn name(&self) -> &str {
        "content"
    }

    fn metric_keys(&self) -> Vec<String> {
        ContentScorer::metric_keys()
    }

    fn min_scene_len(&self) -> u64 {
        self.spacing.min_scene_len()
    }

    fn reset(&mut self) {
        self.scorer.reset();
        self.spacing.reset();
    }

    fn process_frame(
        &mut self,
        position: FrameTime,
        frame: Option<&RgbImage>,
        stats: Option<&mut StatsCache>,
    ) -> Vec<FrameTime> {
        let frame_number = position.frame_number();
        self.spacing.observe_start(frame_number);

        match self.scorer.score(frame_number, frame, stats) {
            Some(score) if score > self.threshold && self.spacing.allows(frame_number) => {
                log::trace!("content: cut at frame {frame_number} (score {score:.3})");
                self.spacing.record(frame_number);
                vec![position]
            }
            _ => Vec::new(),
        }
    }
}
