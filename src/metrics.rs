//! Per-frame metric kernels.
//!
//! Pixel-level computations shared by the detectors: RGB → HSV conversion,
//! per-channel mean absolute differences between two frames, and average
//! frame intensity. With the `rayon` feature the kernels split the pixel
//! buffer across worker threads; the sums are integers, so results are
//! identical to the sequential path.

use image::RgbImage;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[cfg(feature = "rayon")]
const PARALLEL_CHUNK: usize = 16 * 1024;

/// A frame converted to HSV using the 8-bit OpenCV convention:
/// hue in `0..180`, saturation and value in `0..=255`.
#[derive(Debug, Clone)]
pub struct HsvFrame {
    width: u32,
    height: u32,
    pixels: Vec<[u8; 3]>,
}

impl HsvFrame {
    /// Convert an RGB frame.
    pub fn from_rgb(frame: &RgbImage) -> Self {
        let raw = frame.as_raw();

        #[cfg(feature = "rayon")]
        let pixels = raw
            .par_chunks_exact(3)
            .map(|pixel| rgb_to_hsv(pixel[0], pixel[1], pixel[2]))
            .collect();

        #[cfg(not(feature = "rayon"))]
        let pixels = raw
            .chunks_exact(3)
            .map(|pixel| rgb_to_hsv(pixel[0], pixel[1], pixel[2]))
            .collect();

        Self {
            width: frame.width(),
            height: frame.height(),
            pixels,
        }
    }

    /// Frame dimensions as `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Per-channel mean absolute difference against `other`.
    ///
    /// Returns `None` when the frames differ in size.
    pub fn delta(&self, other: &HsvFrame) -> Option<ComponentDeltas> {
        if self.dimensions() != other.dimensions() {
            return None;
        }
        if self.pixels.is_empty() {
            return Some(ComponentDeltas::default());
        }

        let sums = channel_difference_sums(&self.pixels, &other.pixels);
        let count = self.pixels.len() as f64;
        Some(ComponentDeltas {
            hue: sums[0] as f64 / count,
            saturation: sums[1] as f64 / count,
            luma: sums[2] as f64 / count,
        })
    }
}

#[cfg(not(feature = "rayon"))]
fn channel_difference_sums(current: &[[u8; 3]], previous: &[[u8; 3]]) -> [u64; 3] {
    current
        .iter()
        .zip(previous)
        .fold([0u64; 3], |sums, (a, b)| add_pixel_difference(sums, a, b))
}

#[cfg(feature = "rayon")]
fn channel_difference_sums(current: &[[u8; 3]], previous: &[[u8; 3]]) -> [u64; 3] {
    current
        .par_chunks(PARALLEL_CHUNK)
        .zip(previous.par_chunks(PARALLEL_CHUNK))
        .map(|(a, b)| {
            a.iter()
                .zip(b)
                .fold([0u64; 3], |sums, (a, b)| add_pixel_difference(sums, a, b))
        })
        .reduce(
            || [0u64; 3],
            |left, right| [left[0] + right[0], left[1] + right[1], left[2] + right[2]],
        )
}

fn add_pixel_difference(mut sums: [u64; 3], a: &[u8; 3], b: &[u8; 3]) -> [u64; 3] {
    for channel in 0..3 {
        sums[channel] += a[channel].abs_diff(b[channel]) as u64;
    }
    sums
}

/// Mean absolute per-channel differences between two HSV frames.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ComponentDeltas {
    /// Mean hue difference.
    pub hue: f64,
    /// Mean saturation difference.
    pub saturation: f64,
    /// Mean value (luma) difference.
    pub luma: f64,
}

/// Relative weight of each HSV component in the content score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentWeights {
    /// Weight of the hue delta.
    pub hue: f64,
    /// Weight of the saturation delta.
    pub saturation: f64,
    /// Weight of the luma delta.
    pub luma: f64,
}

impl ComponentWeights {
    /// Equal weights for all three components.
    pub const DEFAULT: ComponentWeights = ComponentWeights {
        hue: 1.0,
        saturation: 1.0,
        luma: 1.0,
    };

    /// Only the luma component contributes.
    pub const LUMA_ONLY: ComponentWeights = ComponentWeights {
        hue: 0.0,
        saturation: 0.0,
        luma: 1.0,
    };

    pub(crate) fn total(&self) -> f64 {
        self.hue + self.saturation + self.luma
    }

    pub(crate) fn is_valid(&self) -> bool {
        let components = [self.hue, self.saturation, self.luma];
        components
            .iter()
            .all(|weight| weight.is_finite() && *weight >= 0.0)
            && self.total() > 0.0
    }
}

impl Default for ComponentWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl ComponentDeltas {
    /// Weighted average of the component deltas.
    pub fn score(&self, weights: &ComponentWeights) -> f64 {
        (self.hue * weights.hue + self.saturation * weights.saturation + self.luma * weights.luma)
            / weights.total()
    }
}

/// Mean of every channel value of every pixel.
pub fn average_intensity(frame: &RgbImage) -> f64 {
    let raw = frame.as_raw();
    if raw.is_empty() {
        return 0.0;
    }

    #[cfg(feature = "rayon")]
    let total: u64 = raw
        .par_chunks(PARALLEL_CHUNK)
        .map(|chunk| chunk.iter().map(|&value| value as u64).sum::<u64>())
        .sum();

    #[cfg(not(feature = "rayon"))]
    let total: u64 = raw.iter().map(|&value| value as u64).sum();

    total as f64 / raw.len() as f64
}

/// Convert one RGB pixel to 8-bit HSV.
pub fn rgb_to_hsv(red: u8, green: u8, blue: u8) -> [u8; 3] {
    let max = red.max(green).max(blue);
    let min = red.min(green).min(blue);
    let chroma = (max - min) as f32;

    let saturation = if max == 0 {
        0.0
    } else {
        255.0 * chroma / max as f32
    };

    let hue_degrees = if chroma == 0.0 {
        0.0
    } else if max == red {
        60.0 * (green as f32 - blue as f32) / chroma
    } else if max == green {
        120.0 + 60.0 * (blue as f32 - red as f32) / chroma
    } else {
        240.0 + 60.0 * (red as f32 - green as f32) / chroma
    };
    let hue_degrees = if hue_degrees < 0.0 {
        hue_degrees + 360.0
    } else {
        hue_degrees
    };

    let hue = (hue_degrees / 2.0).round() as u32 % 180;
    [hue as u8, saturation.round() as u8, max]
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[test]
    fn primary_colours() {
        assert_eq!(rgb_to_hsv(255, 0, 0), [0, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 255, 0), [60, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 0, 255), [120, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 0, 0), [0, 0, 0]);
        assert_eq!(rgb_to_hsv(128, 128, 128), [0, 0, 128]);
    }

    #[test]
    fn hue_wraps_below_180() {
        let [hue, _, _] = rgb_to_hsv(255, 0, 1);
        assert!(hue < 180);
    }

    #[test]
    fn identical_frames_have_zero_delta() {
        let frame = RgbImage::from_pixel(8, 8, Rgb([10, 200, 30]));
        let hsv = HsvFrame::from_rgb(&frame);
        assert_eq!(hsv.delta(&hsv.clone()), Some(ComponentDeltas::default()));
    }

    #[test]
    fn luma_delta_of_grey_frames() {
        let dark = HsvFrame::from_rgb(&RgbImage::from_pixel(4, 4, Rgb([10, 10, 10])));
        let light = HsvFrame::from_rgb(&RgbImage::from_pixel(4, 4, Rgb([110, 110, 110])));
        let deltas = light.delta(&dark).unwrap();
        assert_eq!(deltas.hue, 0.0);
        assert_eq!(deltas.saturation, 0.0);
        assert_eq!(deltas.luma, 100.0);
        assert!((deltas.score(&ComponentWeights::DEFAULT) - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(deltas.score(&ComponentWeights::LUMA_ONLY), 100.0);
    }

    #[test]
    fn size_mismatch_has_no_delta() {
        let small = HsvFrame::from_rgb(&RgbImage::new(4, 4));
        let large = HsvFrame::from_rgb(&RgbImage::new(8, 4));
        assert!(small.delta(&large).is_none());
    }

    #[test]
    fn average_intensity_of_mixed_frame() {
        let mut frame = RgbImage::from_pixel(2, 1, Rgb([0, 0, 0]));
        frame.put_pixel(1, 0, Rgb([30, 60, 90]));
        assert_eq!(average_intensity(&frame), 30.0);
        assert_eq!(average_intensity(&RgbImage::new(0, 0)), 0.0);
    }

    #[test]
    fn weights_validation() {
        assert!(ComponentWeights::DEFAULT.is_valid());
        assert!(ComponentWeights::LUMA_ONLY.is_valid());
        let zero = ComponentWeights {
            hue: 0.0,
            saturation: 0.0,
            luma: 0.0,
        };
        assert!(!zero.is_valid());
        let negative = ComponentWeights {
            hue: -1.0,
            ..ComponentWeights::DEFAULT
        };
        assert!(!negative.is_valid());
    }
}
