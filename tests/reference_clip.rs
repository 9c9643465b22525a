//! Detection over real video files.
//!
//! Tests require fixture files from `tests/fixtures/generate_fixtures.sh`;
//! the reference clip has to be copied in by hand. Missing fixtures skip the
//! test.

#![cfg(feature = "ffmpeg")]

use std::path::Path;

use scenecut::{
    ContentDetector, ContentOptions, DetectionPipeline, FfmpegSource, FrameSource, FrameTime,
    PipelineOptions, StatsCache,
};

fn shots_path() -> &'static str {
    "tests/fixtures/shots.mp4"
}

fn reference_clip_path() -> &'static str {
    "tests/fixtures/goldeneye.mp4"
}

fn frames(cuts: &[FrameTime]) -> Vec<u64> {
    cuts.iter().map(|cut| cut.frame_number()).collect()
}

// ── FfmpegSource ───────────────────────────────────────────────────

#[test]
fn source_reports_stream_properties() {
    let path = shots_path();
    if !Path::new(path).exists() {
        return;
    }

    let source = FfmpegSource::open(path).expect("Failed to open fixture");
    assert_eq!(source.frame_rate().to_string(), "25");
    assert_eq!(source.resolution(), (320, 240));
    let total = source.total_frames().expect("Expected a frame count");
    assert!((149..=151).contains(&total), "total frames {total}");
    assert_eq!(source.path(), Path::new(path));
}

#[test]
fn seek_lands_on_the_requested_frame() {
    let path = shots_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut source = FfmpegSource::open(path).expect("Failed to open fixture");
    let rate = source.frame_rate();

    // Frame 75 sits in the orange shot.
    source.seek(FrameTime::from_frames(75, rate)).unwrap();
    let frame = source.read_next_frame().unwrap().expect("Expected a frame");
    let pixel = frame.get_pixel(160, 120);
    assert!(pixel[0] > 200 && pixel[2] < 60, "pixel {pixel:?}");

    source.reset().unwrap();
    let frame = source.read_next_frame().unwrap().expect("Expected a frame");
    let pixel = frame.get_pixel(160, 120);
    assert!(pixel[0] < 40 && pixel[2] > 90, "pixel {pixel:?}");
}

#[test]
fn missing_file_fails_to_open() {
    let result = FfmpegSource::open("tests/fixtures/does_not_exist.mp4");
    assert!(matches!(result, Err(scenecut::SceneCutError::FileOpen { .. })));
}

#[test]
fn damaged_packets_never_add_frames() {
    let path = shots_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut bytes = std::fs::read(path).expect("Failed to read fixture");
    // The sample table is written last, so the middle of the file is
    // picture data.
    let middle = bytes.len() / 2;
    for byte in &mut bytes[middle..middle + 2048] {
        *byte = 0xA5;
    }
    let dir = tempfile::tempdir().unwrap();
    let damaged = dir.path().join("damaged.mp4");
    std::fs::write(&damaged, bytes).unwrap();

    let mut source = FfmpegSource::open(&damaged).expect("Failed to open damaged copy");
    let total = source.total_frames().expect("Expected a frame count");
    let mut pipeline = DetectionPipeline::new(PipelineOptions::new());
    pipeline.add_detector(Box::new(ContentDetector::new(ContentOptions::new()).unwrap()));
    let scenes = pipeline.detect_scenes(&mut source).expect("Detection failed");

    assert!(pipeline.frames_processed() <= total);
    assert!(scenes.last().unwrap().end().frame_number() <= total);
}

// ── Detection ──────────────────────────────────────────────────────

#[test]
fn synthetic_shots_are_split() {
    let path = shots_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut pipeline = DetectionPipeline::new(PipelineOptions::new()).with_stats(StatsCache::new());
    pipeline.add_detector(Box::new(ContentDetector::new(ContentOptions::new()).unwrap()));
    let mut source = FfmpegSource::open(path).expect("Failed to open fixture");
    let scenes = pipeline.detect_scenes(&mut source).unwrap();

    assert_eq!(frames(pipeline.cut_list()), vec![50, 100]);
    assert_eq!(scenes.len(), 3);
    assert_eq!(pipeline.downscale_factor(), Some(1));
    assert!(pipeline.stats().unwrap().len() >= 148);
}

#[test]
fn reference_clip_reproduces_known_cuts() {
    let path = reference_clip_path();
    if !Path::new(path).exists() {
        return;
    }

    let mut source = FfmpegSource::open(path).expect("Failed to open reference clip");
    let rate = source.frame_rate();
    let start = FrameTime::parse("00:00:50", rate).unwrap();
    let end = FrameTime::parse("00:01:19", rate).unwrap();

    let options = PipelineOptions::new().with_start(start).with_end(end);
    let mut pipeline = DetectionPipeline::new(options);
    pipeline.add_detector(Box::new(
        ContentDetector::new(ContentOptions::new().threshold(30.0)).unwrap(),
    ));
    let scenes = pipeline.detect_scenes(&mut source).unwrap();

    assert_eq!(scenes[0].start(), start);
    let starts: Vec<u64> = scenes[1..].iter().map(|scene| scene.start().frame_number()).collect();
    assert_eq!(starts, vec![1226, 1260, 1281, 1334, 1365, 1697, 1871]);
    assert_eq!(scenes.last().unwrap().end(), end);
}
