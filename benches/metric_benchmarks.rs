//! Benchmarks for the per-frame metric kernels and full pipeline runs.
//!
//! Run with: cargo bench
//! Run with parallel kernels: cargo bench --features rayon
//!
//! The file-backed benchmark requires fixture files from
//! `tests/fixtures/generate_fixtures.sh`.

use criterion::{BenchmarkId, Criterion};
use image::{Rgb, RgbImage};
use scenecut::{
    AdaptiveDetector, AdaptiveOptions, ContentDetector, ContentOptions, DetectionPipeline,
    FrameRate, MemorySource, PipelineOptions,
    metrics::{HsvFrame, average_intensity},
};

/// A frame with some texture, so conversions are not all one branch.
fn gradient(width: u32, height: u32, shift: u8) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x % 256) as u8 ^ shift,
            (y % 256) as u8,
            ((x + y) % 256) as u8 / 2 + shift / 2,
        ])
    })
}

fn benchmark_kernels(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("metric kernels");

    for (width, height) in [(256, 144), (640, 360), (1920, 1080)] {
        let frame = gradient(width, height, 0);
        let other = gradient(width, height, 40);
        let label = format!("{width}x{height}");

        group.bench_with_input(BenchmarkId::new("rgb to hsv", &label), &frame, |bencher, frame| {
            bencher.iter(|| HsvFrame::from_rgb(frame));
        });

        let current = HsvFrame::from_rgb(&frame);
        let previous = HsvFrame::from_rgb(&other);
        group.bench_with_input(
            BenchmarkId::new("hsv delta", &label),
            &(current, previous),
            |bencher, (current, previous)| {
                bencher.iter(|| current.delta(previous));
            },
        );

        group.bench_with_input(
            BenchmarkId::new("average intensity", &label),
            &frame,
            |bencher, frame| {
                bencher.iter(|| average_intensity(frame));
            },
        );
    }

    group.finish();
}

fn benchmark_in_memory_pipeline(criterion: &mut Criterion) {
    let frames: Vec<RgbImage> = (0..120u8).map(|index| gradient(640, 360, index / 30 * 60)).collect();
    let rate = FrameRate::new(25, 1).unwrap();

    let mut group = criterion.benchmark_group("in-memory pipeline");
    group.sample_size(20);

    group.bench_function("content", |bencher| {
        bencher.iter(|| {
            let mut pipeline = DetectionPipeline::new(PipelineOptions::new());
            pipeline.add_detector(Box::new(ContentDetector::new(ContentOptions::new()).unwrap()));
            let mut source = MemorySource::new(frames.clone(), rate).unwrap();
            pipeline.detect_scenes(&mut source).unwrap()
        });
    });

    group.bench_function("adaptive", |bencher| {
        bencher.iter(|| {
            let mut pipeline = DetectionPipeline::new(PipelineOptions::new());
            pipeline.add_detector(Box::new(AdaptiveDetector::new(AdaptiveOptions::new()).unwrap()));
            let mut source = MemorySource::new(frames.clone(), rate).unwrap();
            pipeline.detect_scenes(&mut source).unwrap()
        });
    });

    group.finish();
}

#[cfg(feature = "ffmpeg")]
fn benchmark_video_file(criterion: &mut Criterion) {
    use std::{path::Path, time::Duration};

    use scenecut::{FfmpegLogLevel, FfmpegSource, set_ffmpeg_log_level};

    const SHOTS_VIDEO: &str = "tests/fixtures/shots.mp4";

    set_ffmpeg_log_level(FfmpegLogLevel::Error);

    if !Path::new(SHOTS_VIDEO).exists() {
        eprintln!("Skipping benchmark: fixture not found");
        return;
    }

    let mut group = criterion.benchmark_group("video file");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("content detector", |bencher| {
        bencher.iter(|| {
            let mut pipeline = DetectionPipeline::new(PipelineOptions::new());
            pipeline.add_detector(Box::new(ContentDetector::new(ContentOptions::new()).unwrap()));
            let mut source = FfmpegSource::open(SHOTS_VIDEO).unwrap();
            pipeline.detect_scenes(&mut source).unwrap()
        });
    });

    group.finish();
}

#[cfg(not(feature = "ffmpeg"))]
fn benchmark_video_file(_criterion: &mut Criterion) {}

criterion::criterion_group!(
    benches,
    benchmark_kernels,
    benchmark_in_memory_pipeline,
    benchmark_video_file,
);
criterion::criterion_main!(benches);
