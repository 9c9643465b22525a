//! Progress and cancellation integration tests.

use std::sync::{Arc, Mutex};

use image::{Rgb, RgbImage};
use scenecut::{
    CancellationToken, ContentDetector, ContentOptions, DetectionPipeline, FrameRate,
    MemorySource, PipelineOptions, ProgressCallback, ProgressInfo, SceneCutError,
};

fn source(frame_count: usize) -> MemorySource {
    let frames = (0..frame_count)
        .map(|index| {
            let level = if (index / 30) % 2 == 0 { 30 } else { 210 };
            RgbImage::from_pixel(8, 8, Rgb([level, level, level]))
        })
        .collect();
    MemorySource::new(frames, FrameRate::new(25, 1).unwrap()).unwrap()
}

fn pipeline(options: PipelineOptions) -> DetectionPipeline {
    let mut pipeline = DetectionPipeline::new(options);
    pipeline.add_detector(Box::new(ContentDetector::new(ContentOptions::new()).unwrap()));
    pipeline
}

#[derive(Default)]
struct RecordingProgress {
    infos: Mutex<Vec<ProgressInfo>>,
}

impl ProgressCallback for RecordingProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.infos.lock().unwrap().push(info.clone());
    }
}

/// Cancels the run from inside the first progress report.
struct CancelOnFirstReport {
    token: CancellationToken,
    reports: Mutex<u32>,
}

impl ProgressCallback for CancelOnFirstReport {
    fn on_progress(&self, _info: &ProgressInfo) {
        *self.reports.lock().unwrap() += 1;
        self.token.cancel();
    }
}

// ── CancellationToken ──────────────────────────────────────────────

#[test]
fn cancellation_token_clone_shares_state() {
    let token = CancellationToken::default();
    let clone = token.clone();
    assert!(!clone.is_cancelled());

    token.cancel();
    assert!(clone.is_cancelled());
}

#[test]
fn cancelled_before_start_returns_error() {
    let token = CancellationToken::new();
    token.cancel();

    let mut pipeline = pipeline(PipelineOptions::new().with_cancellation(token));
    let result = pipeline.detect_scenes(&mut source(90));

    match result {
        Err(SceneCutError::Cancelled) => {}
        other => panic!("Expected Cancelled, got: {other:?}"),
    }
    assert_eq!(pipeline.frames_processed(), 0);
}

#[test]
fn cancelling_mid_run_stops_before_the_next_frame() {
    let token = CancellationToken::new();
    let callback = Arc::new(CancelOnFirstReport {
        token: token.clone(),
        reports: Mutex::new(0),
    });
    let options = PipelineOptions::new()
        .with_cancellation(token)
        .with_progress(callback.clone())
        .with_batch_size(10);

    let mut pipeline = pipeline(options);
    let result = pipeline.detect_scenes(&mut source(300));

    assert!(matches!(result, Err(SceneCutError::Cancelled)));
    assert_eq!(pipeline.frames_processed(), 10);
    assert_eq!(*callback.reports.lock().unwrap(), 1);
    assert!(pipeline.scene_list().is_empty());
}

// ── ProgressInfo ───────────────────────────────────────────────────

#[test]
fn progress_is_reported_per_batch_and_at_the_end() {
    let recorder = Arc::new(RecordingProgress::default());
    let options = PipelineOptions::new()
        .with_progress(recorder.clone())
        .with_batch_size(10);

    let mut pipeline = pipeline(options);
    pipeline.detect_scenes(&mut source(95)).unwrap();

    let infos = recorder.infos.lock().unwrap();
    assert_eq!(infos.len(), 10);
    let counts: Vec<u64> = infos.iter().map(|info| info.frames_processed).collect();
    assert_eq!(counts, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 95]);

    for info in infos.iter() {
        assert_eq!(info.total_frames, Some(95));
        let position = info.position.unwrap();
        assert_eq!(position.frame_number() + 1, info.frames_processed);
    }
}

#[test]
fn final_report_is_complete() {
    let recorder = Arc::new(RecordingProgress::default());
    let mut pipeline = pipeline(PipelineOptions::new().with_progress(recorder.clone()));
    pipeline.detect_scenes(&mut source(95)).unwrap();

    let infos = recorder.infos.lock().unwrap();
    let last = infos.last().unwrap();
    assert_eq!(last.percentage, Some(100.0));
    assert_eq!(last.estimated_remaining, Some(std::time::Duration::ZERO));
    // Cuts at 30, 60 and 90.
    assert_eq!(last.cuts_detected, 3);
}

#[test]
fn cut_count_never_decreases() {
    let recorder = Arc::new(RecordingProgress::default());
    let options = PipelineOptions::new()
        .with_progress(recorder.clone())
        .with_batch_size(1);

    let mut pipeline = pipeline(options);
    pipeline.detect_scenes(&mut source(95)).unwrap();

    let infos = recorder.infos.lock().unwrap();
    for window in infos.windows(2) {
        assert!(window[1].frames_processed >= window[0].frames_processed);
        assert!(window[1].cuts_detected >= window[0].cuts_detected);
    }
    assert_eq!(infos[29].cuts_detected, 0);
    assert_eq!(infos[30].cuts_detected, 1);
}
