//! Async detection.
//!
//! [`detect_scenes_async`] runs a whole [`DetectionPipeline`] on Tokio's
//! blocking thread pool, so CPU-heavy decoding and scoring never tie up the
//! async runtime. The pipeline and the source are moved into the task and
//! handed back with the result, ready for a stats save or another run.
//!
//! This module is available when the `async` feature is enabled.
//!
//! # Example
//!
//! ```no_run
//! use scenecut::{
//!     ContentDetector, ContentOptions, DetectionPipeline, FfmpegSource, PipelineOptions,
//!     SceneCutError, detect_scenes_async,
//! };
//!
//! # async fn example() -> Result<(), SceneCutError> {
//! let mut pipeline = DetectionPipeline::new(PipelineOptions::new());
//! pipeline.add_detector(Box::new(ContentDetector::new(ContentOptions::new())?));
//!
//! let finished = detect_scenes_async(pipeline, FfmpegSource::open("input.mp4")?).await?;
//! for scene in finished.result? {
//!     println!("{scene}");
//! }
//! # Ok(())
//! # }
//! ```

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::task::JoinHandle;

use crate::{error::SceneCutError, pipeline::DetectionPipeline, scene::Scene, source::FrameSource};

/// A completed background run.
#[derive(Debug)]
pub struct AsyncDetection<S> {
    /// The pipeline, holding the cut list and stats of the run.
    pub pipeline: DetectionPipeline,
    /// The source, positioned wherever the run left it.
    pub source: S,
    /// The scenes, or why the run failed.
    pub result: Result<Vec<Scene>, SceneCutError>,
}

/// A future resolving to an [`AsyncDetection`].
///
/// Resolves to [`SceneCutError::Cancelled`] if the background task was
/// aborted or panicked; the pipeline and source are lost in that case.
pub struct DetectionFuture<S> {
    handle: JoinHandle<AsyncDetection<S>>,
}

impl<S> Future for DetectionFuture<S> {
    type Output = Result<AsyncDetection<S>, SceneCutError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|result| {
            result.map_err(|error| {
                log::warn!("Background detection task failed: {error}");
                SceneCutError::Cancelled
            })
        })
    }
}

/// Run `pipeline` over `source` on a blocking thread.
///
/// Must be called from within a Tokio runtime.
pub fn detect_scenes_async<S>(mut pipeline: DetectionPipeline, mut source: S) -> DetectionFuture<S>
where
    S: FrameSource + 'static,
{
    let handle = tokio::task::spawn_blocking(move || {
        let result = pipeline.detect_scenes(&mut source);
        AsyncDetection {
            pipeline,
            source,
            result,
        }
    });
    DetectionFuture { handle }
}
