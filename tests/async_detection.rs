//! Async detection tests.

#![cfg(feature = "async")]

use image::{Rgb, RgbImage};
use scenecut::{
    CancellationToken, ContentDetector, ContentOptions, DetectionPipeline, FrameRate,
    MemorySource, PipelineOptions, SceneCutError, detect_scenes_async,
};

fn source() -> MemorySource {
    let frames = [(30u8, 40usize), (220, 40)]
        .iter()
        .flat_map(|&(level, count)| {
            std::iter::repeat_n(RgbImage::from_pixel(8, 8, Rgb([level, level, level])), count)
        })
        .collect();
    MemorySource::new(frames, FrameRate::new(25, 1).unwrap()).unwrap()
}

fn pipeline(options: PipelineOptions) -> DetectionPipeline {
    let mut pipeline = DetectionPipeline::new(options);
    pipeline.add_detector(Box::new(ContentDetector::new(ContentOptions::new()).unwrap()));
    pipeline
}

#[tokio::test]
async fn async_detection_returns_pipeline_and_source() {
    let finished = detect_scenes_async(pipeline(PipelineOptions::new()), source())
        .await
        .expect("Background task failed");

    let scenes = finished.result.unwrap();
    assert_eq!(scenes.len(), 2);
    assert_eq!(scenes[1].start().frame_number(), 40);
    assert_eq!(finished.pipeline.frames_processed(), 80);
    assert_eq!(finished.source.position(), 80);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn async_detection_reports_cancellation() {
    let token = CancellationToken::new();
    token.cancel();

    let options = PipelineOptions::new().with_cancellation(token);
    let finished = detect_scenes_async(pipeline(options), source()).await.unwrap();
    assert!(matches!(finished.result, Err(SceneCutError::Cancelled)));
}
