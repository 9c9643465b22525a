//! FFmpeg-backed frame source.
//!
//! [`FfmpegSource`] demuxes and decodes the best video stream of a media
//! file with [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next), converts
//! every frame to packed RGB24 at the native resolution, and hands it to the
//! detection pipeline as an [`image::RgbImage`].
//!
//! FFmpeg has its own console logging, separate from the Rust
//! [`log`](https://crates.io/crates/log) crate; [`set_ffmpeg_log_level`]
//! tunes it.
//!
//! This module is available when the `ffmpeg` feature is enabled.
//!
//! # Example
//!
//! ```no_run
//! use scenecut::{ContentDetector, ContentOptions, DetectionPipeline, FfmpegSource, PipelineOptions};
//!
//! let mut source = FfmpegSource::open("input.mp4")?;
//! let mut pipeline = DetectionPipeline::new(PipelineOptions::new());
//! pipeline.add_detector(Box::new(ContentDetector::new(ContentOptions::new())?));
//! let scenes = pipeline.detect_scenes(&mut source)?;
//! println!("{} scenes", scenes.len());
//! # Ok::<(), scenecut::SceneCutError>(())
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

use ffmpeg_next::{
    Error as FfmpegError, Packet, Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
    util::log::Level,
};
use image::RgbImage;

use crate::{
    error::SceneCutError,
    frame_time::{FrameRate, FrameTime},
    source::FrameSource,
};

/// Consecutive failed packet reads before the stream is given up on.
const MAX_PACKET_READ_ERRORS: u32 = 16;

/// RGB24 conversion context.
struct Scaler(ScalingContext);

// SAFETY: the scaling context is owned by exactly one `FfmpegSource` and is
// only ever used through `&mut self`, so it is never touched from two
// threads at once.
unsafe impl Send for Scaler {}

/// A [`FrameSource`] decoding a media file through FFmpeg.
pub struct FfmpegSource {
    input_context: Input,
    decoder: VideoDecoder,
    scaler: Scaler,
    video_stream_index: usize,
    time_base: Rational,
    frame_rate: FrameRate,
    resolution: (u32, u32),
    total_frames: Option<u64>,
    decoded_frame: VideoFrame,
    rgb_frame: VideoFrame,
    /// After a seek, decoded frames before this frame number are dropped.
    discard_before: Option<u64>,
    eof_sent: bool,
    file_path: PathBuf,
}

impl Debug for FfmpegSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("FfmpegSource")
            .field("file_path", &self.file_path)
            .field("video_stream_index", &self.video_stream_index)
            .field("frame_rate", &self.frame_rate)
            .field("resolution", &self.resolution)
            .field("total_frames", &self.total_frames)
            .finish_non_exhaustive()
    }
}

impl FfmpegSource {
    /// Open a media file and prepare its best video stream for decoding.
    ///
    /// # Errors
    ///
    /// Returns [`SceneCutError::FileOpen`] if the file cannot be opened or
    /// decoded, and [`SceneCutError::NoVideoStream`] if it has no video.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SceneCutError> {
        let path = path.as_ref();
        let file_path = path.to_path_buf();
        let open_error = |reason: String| SceneCutError::FileOpen {
            path: file_path.clone(),
            reason,
        };

        log::debug!("Opening video source: {}", file_path.display());

        ffmpeg_next::init()
            .map_err(|error| open_error(format!("FFmpeg initialisation failed: {error}")))?;

        let input_context =
            ffmpeg_next::format::input(&path).map_err(|error| open_error(error.to_string()))?;

        let stream = input_context
            .streams()
            .best(Type::Video)
            .ok_or(SceneCutError::NoVideoStream)?;
        let video_stream_index = stream.index();
        let time_base = stream.time_base();

        let decoder_context = CodecContext::from_parameters(stream.parameters())
            .map_err(|error| open_error(format!("Failed to read codec parameters: {error}")))?;
        let decoder = decoder_context
            .decoder()
            .video()
            .map_err(|error| open_error(format!("Failed to create video decoder: {error}")))?;

        let average_rate = stream.avg_frame_rate();
        let rate = if average_rate.numerator() > 0 && average_rate.denominator() > 0 {
            average_rate
        } else {
            stream.rate()
        };
        let frame_rate = FrameRate::try_from(rate)
            .map_err(|error| open_error(format!("Unusable frame rate: {error}")))?;

        let resolution = (decoder.width(), decoder.height());
        if resolution.0 == 0 || resolution.1 == 0 {
            return Err(open_error("Video stream reports zero dimensions".to_string()));
        }

        let total_frames = if stream.frames() > 0 {
            Some(stream.frames() as u64)
        } else if input_context.duration() > 0 {
            let seconds = input_context.duration() as f64 / 1_000_000.0;
            Some((seconds * frame_rate.as_f64()).round() as u64)
        } else {
            None
        };

        let scaler = ScalingContext::get(
            decoder.format(),
            resolution.0,
            resolution.1,
            Pixel::RGB24,
            resolution.0,
            resolution.1,
            ScalingFlags::BILINEAR,
        )
        .map_err(|error| open_error(format!("Failed to create RGB converter: {error}")))?;

        log::debug!(
            "Video stream {video_stream_index}: {}x{} @ {frame_rate} fps, {total_frames:?} frames",
            resolution.0,
            resolution.1,
        );

        Ok(Self {
            input_context,
            decoder,
            scaler: Scaler(scaler),
            video_stream_index,
            time_base,
            frame_rate,
            resolution,
            total_frames,
            decoded_frame: VideoFrame::empty(),
            rgb_frame: VideoFrame::empty(),
            discard_before: None,
            eof_sent: false,
            file_path,
        })
    }

    /// Path the source was opened from.
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn pts_to_frame_number(&self, pts: i64) -> u64 {
        let seconds =
            pts as f64 * self.time_base.numerator() as f64 / self.time_base.denominator() as f64;
        (seconds * self.frame_rate.as_f64()).round().max(0.0) as u64
    }

    /// Convert the current `decoded_frame` to an `RgbImage`.
    fn convert_current_frame(&mut self) -> Result<RgbImage, SceneCutError> {
        let input = self.scaler.0.input();
        let (format, width, height) = (input.format, input.width, input.height);
        if format != self.decoded_frame.format()
            || width != self.decoded_frame.width()
            || height != self.decoded_frame.height()
        {
            log::debug!(
                "Decoded frame properties changed to {:?} {}x{}; rebuilding converter",
                self.decoded_frame.format(),
                self.decoded_frame.width(),
                self.decoded_frame.height(),
            );
            self.scaler = Scaler(ScalingContext::get(
                self.decoded_frame.format(),
                self.decoded_frame.width(),
                self.decoded_frame.height(),
                Pixel::RGB24,
                self.resolution.0,
                self.resolution.1,
                ScalingFlags::BILINEAR,
            )?);
        }

        self.scaler
            .0
            .run(&self.decoded_frame, &mut self.rgb_frame)
            .map_err(|error| SceneCutError::FrameRead(error.to_string()))?;

        let (width, height) = self.resolution;
        RgbImage::from_raw(width, height, packed_rgb_buffer(&self.rgb_frame, width, height))
            .ok_or_else(|| {
                SceneCutError::FrameRead(
                    "Failed to construct RGB image from decoded frame data".to_string(),
                )
            })
    }
}

impl FrameSource for FfmpegSource {
    fn read_next_frame(&mut self) -> Result<Option<RgbImage>, SceneCutError> {
        let mut read_errors = 0u32;
        loop {
            if self.decoder.receive_frame(&mut self.decoded_frame).is_ok() {
                if let Some(target) = self.discard_before {
                    let current = self
                        .decoded_frame
                        .pts()
                        .map(|pts| self.pts_to_frame_number(pts))
                        .unwrap_or(target);
                    if current < target {
                        continue;
                    }
                    self.discard_before = None;
                }
                return self.convert_current_frame().map(Some);
            }

            if self.eof_sent {
                return Ok(None);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input_context) {
                Ok(()) => {
                    read_errors = 0;
                    if packet.stream() != self.video_stream_index {
                        continue;
                    }
                    // A rejected packet yields no frame, so it must not
                    // count as one.
                    if let Err(error) = self.decoder.send_packet(&packet) {
                        log::warn!(
                            "Skipping undecodable packet at pts {:?}: {error}",
                            packet.pts()
                        );
                    }
                }
                Err(FfmpegError::Eof) => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
                Err(error) => {
                    read_errors += 1;
                    if read_errors > MAX_PACKET_READ_ERRORS {
                        return Err(SceneCutError::FfmpegError(format!(
                            "{read_errors} consecutive packet reads failed: {error}"
                        )));
                    }
                    log::warn!("Packet read failed ({error}); retrying");
                }
            }
        }
    }

    fn seek(&mut self, position: FrameTime) -> Result<(), SceneCutError> {
        if position.frame_rate() != self.frame_rate {
            return Err(SceneCutError::FrameRateMismatch {
                expected: self.frame_rate,
                found: position.frame_rate(),
            });
        }

        // Container-level seeking expects AV_TIME_BASE (microseconds).
        let timestamp = (position.seconds() * 1_000_000.0) as i64;
        log::debug!("Seeking to frame {} ({timestamp} us)", position.frame_number());
        self.input_context.seek(timestamp, ..timestamp)?;
        self.decoder.flush();
        self.eof_sent = false;
        self.discard_before = (position.frame_number() > 0).then_some(position.frame_number());
        Ok(())
    }

    fn frame_rate(&self) -> FrameRate {
        self.frame_rate
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn total_frames(&self) -> Option<u64> {
        self.total_frames
    }

    fn reset(&mut self) -> Result<(), SceneCutError> {
        self.seek(FrameTime::from_frames(0, self.frame_rate))
    }
}

/// Copy an RGB24 frame into a tightly-packed buffer, dropping row padding.
fn packed_rgb_buffer(video_frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_bytes = (width as usize) * 3;
    let data = video_frame.data(0);

    if stride == row_bytes {
        data[..row_bytes * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_bytes * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_bytes]);
        }
        buffer
    }
}

/// FFmpeg internal log verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print nothing.
    Quiet,
    /// Only unrecoverable errors.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Debugging output.
    Debug,
}

impl FfmpegLogLevel {
    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Debug => Level::Debug,
        }
    }
}

/// Set the FFmpeg internal log verbosity level.
///
/// This controls what FFmpeg itself prints to stderr, not the `log` crate
/// output of this library.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}
