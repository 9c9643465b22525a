//! # scenecut
//!
//! Frame-accurate scene cut detection for video.
//!
//! `scenecut` reads decoded frames from a [`FrameSource`], runs one or more
//! [`Detector`]s over them and returns the video split into [`Scene`]s.
//! Three detectors are included:
//!
//! - [`ContentDetector`] finds hard cuts from changes in hue, saturation and
//!   brightness between consecutive frames.
//! - [`ThresholdDetector`] finds fades to and from black (or any intensity
//!   level).
//! - [`AdaptiveDetector`] compares each frame's change with that of its
//!   neighbours, which keeps fast camera motion from triggering cuts.
//!
//! Per-frame metrics can be recorded in a [`StatsCache`], saved to disk and
//! reused, so tuning a threshold does not require decoding the video again.
//!
//! ## Quick Start
//!
//! ```no_run
//! use scenecut::{
//!     ContentDetector, ContentOptions, DetectionPipeline, FfmpegSource, PipelineOptions,
//! };
//!
//! let mut source = FfmpegSource::open("input.mp4")?;
//! let mut pipeline = DetectionPipeline::new(PipelineOptions::new());
//! pipeline.add_detector(Box::new(ContentDetector::new(ContentOptions::new())?));
//!
//! for scene in pipeline.detect_scenes(&mut source)? {
//!     println!("{} ({} frames)", scene, scene.frame_count());
//! }
//! # Ok::<(), scenecut::SceneCutError>(())
//! ```
//!
//! ### Reusing statistics
//!
//! ```no_run
//! use scenecut::{
//!     ContentDetector, ContentOptions, DetectionPipeline, FfmpegSource, PipelineOptions,
//!     StatsCache,
//! };
//!
//! let stats = StatsCache::load("input.stats.csv").unwrap_or_default();
//! let mut pipeline = DetectionPipeline::new(PipelineOptions::new()).with_stats(stats);
//! pipeline.add_detector(Box::new(ContentDetector::new(ContentOptions::new().threshold(32.0))?));
//! pipeline.detect_scenes(&mut FfmpegSource::open("input.mp4")?)?;
//!
//! if let Some(stats) = pipeline.take_stats() {
//!     stats.save("input.stats.csv")?;
//! }
//! # Ok::<(), scenecut::SceneCutError>(())
//! ```
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ffmpeg` | [`FfmpegSource`], decoding video files through FFmpeg (default) |
//! | `async` | `detect_scenes_async`, running a pipeline on Tokio's blocking pool |
//! | `rayon` | Parallel pixel kernels for large frames |
//! | `cli` | The `scenecut` command-line tool (implies `ffmpeg`) |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! The `ffmpeg` feature needs the FFmpeg development libraries installed on
//! your system. The core crate has no native dependencies.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod adaptive;
pub mod config;
pub mod content;
pub mod detector;
pub mod error;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
pub mod frame_time;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod scene;
pub mod source;
pub mod stats;
#[cfg(feature = "async")]
pub mod stream;
pub mod threshold;
mod window;

pub use adaptive::{AdaptiveDetector, AdaptiveOptions};
pub use config::{Downscale, PipelineOptions};
pub use content::{ContentDetector, ContentOptions};
pub use detector::Detector;
pub use error::SceneCutError;
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::{FfmpegLogLevel, FfmpegSource, set_ffmpeg_log_level};
pub use frame_time::{FrameRate, FrameTime};
pub use metrics::ComponentWeights;
pub use pipeline::{DetectionPipeline, StatsRequirement};
pub use progress::{CancellationToken, ProgressCallback, ProgressInfo};
pub use scene::{Scene, cut_timecodes};
pub use source::{FrameSource, MemorySource};
pub use stats::StatsCache;
#[cfg(feature = "async")]
pub use stream::{AsyncDetection, DetectionFuture, detect_scenes_async};
pub use threshold::{FadeCut, ThresholdDetector, ThresholdOptions};
