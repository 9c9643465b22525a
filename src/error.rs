//! Error types for the `scenecut` crate.
//!
//! This module defines [`SceneCutError`], the unified error type returned by
//! all fallible operations in the crate. Errors carry enough context to tell
//! a configuration mistake apart from a decoding or persistence failure.

use std::{io::Error as IoError, path::PathBuf};

use thiserror::Error;

use crate::frame_time::FrameRate;

/// The unified error type for all `scenecut` operations.
///
/// Configuration errors are raised while building detectors or starting a
/// pipeline, never in the middle of a run. Single-frame decode failures
/// ([`SceneCutError::FrameRead`]) are recovered by the pipeline and only
/// surface when a source keeps failing.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SceneCutError {
    /// A detector or pipeline option has an invalid value.
    #[error("Invalid configuration for {parameter}: {reason}")]
    InvalidConfiguration {
        /// Name of the offending option.
        parameter: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// Two frame positions with different frame rates were combined.
    #[error("Frame rate mismatch: expected {expected}, found {found}")]
    FrameRateMismatch {
        /// The frame rate in effect.
        expected: FrameRate,
        /// The frame rate that was supplied.
        found: FrameRate,
    },

    /// A timecode string could not be parsed.
    #[error("Invalid timecode: {0}")]
    InvalidTimecode(String),

    /// A frame rate was zero, negative or not a number.
    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(String),

    /// The video source could not be opened.
    #[error("Failed to open video source at {path}: {reason}")]
    FileOpen {
        /// Path that was passed to the source constructor.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The source does not contain a video stream.
    #[error("No video stream found in source")]
    NoVideoStream,

    /// A single frame could not be read or decoded.
    #[error("Failed to read video frame: {0}")]
    FrameRead(String),

    /// A persisted stats file is malformed.
    #[error("Failed to parse stats file at line {line}: {reason}")]
    StatsParse {
        /// One-based line number of the offending row.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error originating from the FFmpeg libraries.
    #[cfg(feature = "ffmpeg")]
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,
}

impl SceneCutError {
    pub(crate) fn config(parameter: &'static str, reason: impl Into<String>) -> Self {
        SceneCutError::InvalidConfiguration {
            parameter,
            reason: reason.into(),
        }
    }
}

#[cfg(feature = "ffmpeg")]
impl From<ffmpeg_next::Error> for SceneCutError {
    fn from(error: ffmpeg_next::Error) -> Self {
        SceneCutError::FfmpegError(error.to_string())
    }
}
