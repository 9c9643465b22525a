//! Fade detection.
//!
//! [`ThresholdDetector`] tracks the average intensity of each frame and
//! reports cuts where the picture fades to black (or any level below the
//! threshold) and back.
//!
//! # Example
//!
//! ```
//! use scenecut::{FadeCut, ThresholdDetector, ThresholdOptions};
//!
//! let options = ThresholdOptions::new()
//!     .threshold(20.0)
//!     .fade_bias(-1.0)
//!     .add_final_scene(true);
//! let detector = ThresholdDetector::new(options)?;
//! # Ok::<(), scenecut::SceneCutError>(())
//! ```

use image::RgbImage;

use crate::{
    content::validate_threshold,
    detector::{CutSpacing, Detector},
    error::SceneCutError,
    frame_time::FrameTime,
    metrics::average_intensity,
    stats::StatsCache,
};

/// Cache key of the mean channel intensity.
pub const AVERAGE_RGB: &str = "average_rgb";

/// Where cuts are placed for a completed fade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FadeCut {
    /// One cut between the fade-out and fade-in frames, placed by
    /// `fade_bias`.
    #[default]
    Biased,
    /// Two cuts, at the fade-out and the fade-in frames, so the faded
    /// section becomes its own scene.
    Edges,
}

/// Threshold detector settings.
#[derive(Debug, Clone)]
pub struct ThresholdOptions {
    /// Intensity below which a frame counts as faded. Default: 12.0.
    pub threshold: f64,
    /// Minimum frames between two cuts. Default: 15.
    pub min_scene_len: u64,
    /// Cut placement in `[-1, 1]`: -1 at the fade-out frame, 0 halfway, 1 at
    /// the fade-in frame. Only used by [`FadeCut::Biased`]. Default: 0.0.
    pub fade_bias: f64,
    /// Cut at a fade-out the video never recovers from. Default: false.
    pub add_final_scene: bool,
    /// Cut placement strategy. Default: [`FadeCut::Biased`].
    pub mode: FadeCut,
}

impl Default for ThresholdOptions {
    fn default() -> Self {
        Self {
            threshold: 12.0,
            min_scene_len: 15,
            fade_bias: 0.0,
            add_final_scene: false,
            mode: FadeCut::Biased,
        }
    }
}

impl ThresholdOptions {
    /// Create threshold detector settings with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the intensity threshold.
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

    /// Set the cut placement bias.
    #[must_use]
    pub fn fade_bias(mut self, bias: f64) -> Self {
        self.fade_bias = bias;
        self
    }

    /// Enable or disable the trailing fade-out cut.
    #[must_use]
    pub fn add_final_scene(mut self, enabled: bool) -> Self {
        self.add_final_scene = enabled;
        self
    }

    /// Set the cut placement strategy.
    #[must_use]
    pub fn mode(mut self, mode: FadeCut) -> Self {
        self.mode = mode;
        self
    }

    fn validate(&self) -> Result<(), SceneCutError> {
        validate_threshold("threshold", self.threshold)?;
        if !(-1.0..=1.0).contains(&self.fade_bias) {
            return Err(SceneCutError::config(
                "fade_bias",
                format!("must be within [-1, 1] (got {})", self.fade_bias),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Above,
    Below,
}

/// Detects fades in and out of a dark (or any low-intensity) picture.
#[derive(Debug)]
pub struct ThresholdDetector {
    options: ThresholdOptions,
    spacing: CutSpacing,
    level: Option<Level>,
    fade_out: Option<u64>,
}

impl ThresholdDetector {
    /// Build a detector, validating `options`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneCutError::InvalidConfiguration`] for a negative or
    /// non-finite threshold or a bias outside `[-1, 1]`.
    pub fn new(options: ThresholdOptions) -> Result<Self, SceneCutError> {
        options.validate()?;
        Ok(Self {
            spacing: CutSpacing::new(options.min_scene_len),
            options,
            level: None,
            fade_out: None,
        })
    }

    fn intensity(
        frame_number: u64,
        frame: Option<&RgbImage>,
        stats: Option<&mut StatsCache>,
    ) -> Option<f64> {
        if let Some(cached) = stats.as_deref().and_then(|s| s.get(frame_number, AVERAGE_RGB)) {
            return Some(cached);
        }
        let value = average_intensity(frame?);
        if let Some(stats) = stats {
            stats.set(frame_number, AVERAGE_RGB, value);
        }
        Some(value)
    }

    fn split(&self, fade_out: u64, fade_in: u64) -> u64 {
        let span = fade_in.saturating_sub(fade_out) as f64;
        let offset = (self.options.fade_bias * span).floor() as i64;
        let total = (fade_in + fade_out) as i64 + offset;
        (total / 2).max(0) as u64
    }

    /// Cuts for a fade that ended at `fade_in`.
    fn fade_completed(&mut self, fade_out: u64, fade_in: FrameTime) -> Vec<FrameTime> {
        let at = |frame: u64| FrameTime::from_frames(frame, fade_in.frame_rate());
        let fade_in = fade_in.frame_number();
        match self.options.mode {
            FadeCut::Biased => {
                if !self.spacing.allows(fade_in) {
                    return Vec::new();
                }
                self.spacing.record(fade_in);
                vec![at(self.split(fade_out, fade_in))]
            }
            FadeCut::Edges => {
                let mut cuts = Vec::with_capacity(2);
                for edge in [fade_out, fade_in] {
                    if self.spacing.allows(edge) {
                        self.spacing.record(edge);
                        cuts.push(at(edge));
                    }
                }
                cuts
            }
        }
    }
}

impl Detector for ThresholdDetector {
    fn name(&self) -> &str {
        "threshold"
    }

    fn metric_keys(&self) -> Vec<String> {
        vec![AVERAGE_RGB.to_string()]
    }

    fn min_scene_len(&self) -> u64 {
        self.spacing.min_scene_len()
    }

    fn reset(&mut self) {
        self.spacing.reset();
        self.level = None;
        self.fade_out = None;
    }

    fn process_frame(
        &mut self,
        position: FrameTime,
        frame: Option<&RgbImage>,
        stats: Option<&mut StatsCache>,
    ) -> Vec<FrameTime> {
        let frame_number = position.frame_number();
        self.spacing.observe_start(frame_number);

        let Some(intensity) = Self::intensity(frame_number, frame, stats) else {
            log::debug!("Frame {frame_number} is unreadable; keeping fade state");
            return Vec::new();
        };
        let level = if intensity < self.options.threshold {
            Level::Below
        } else {
            Level::Above
        };

        let previous = self.level.replace(level);
        match (previous, level) {
            (None, Level::Below) | (Some(Level::Above), Level::Below) => {
                self.fade_out = Some(frame_number);
                Vec::new()
            }
            (Some(Level::Below), Level::Above) => match self.fade_out.take() {
                Some(fade_out) => {
                    let cuts = self.fade_completed(fade_out, position);
                    if !cuts.is_empty() {
                        log::trace!("threshold: fade {fade_out}..{frame_number} -> {cuts:?}");
                    }
                    cuts
                }
                None => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    fn finalize(
        &mut self,
        last_position: FrameTime,
        _stats: Option<&mut StatsCache>,
    ) -> Vec<FrameTime> {
        if !self.options.add_final_scene || self.level != Some(Level::Below) {
            return Vec::new();
        }
        let Some(fade_out) = self.fade_out.take() else {
            return Vec::new();
        };
        let last = last_position.frame_number();
        if !self.spacing.allows(last) {
            return Vec::new();
        }
        self.spacing.record(last);

        let frame = match self.options.mode {
            FadeCut::Biased => self.split(fade_out, last),
            FadeCut::Edges => fade_out,
        };
        vec![FrameTime::from_frames(frame, last_position.frame_rate())]
    }
}
