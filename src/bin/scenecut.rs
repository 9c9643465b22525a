use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use scenecut::{
    AdaptiveDetector, AdaptiveOptions, ContentDetector, ContentOptions, DetectionPipeline,
    Downscale, FadeCut, FfmpegLogLevel, FfmpegSource, FrameSource, FrameTime, PipelineOptions,
    ProgressCallback, ProgressInfo, StatsCache, ThresholdDetector, ThresholdOptions,
    cut_timecodes,
};

const CLI_AFTER_HELP: &str = "Examples:\n  scenecut detect input.mp4\n  scenecut detect input.mp4 --detector adaptive --stats input.stats.csv --progress\n  scenecut detect input.mp4 --detector content --detector threshold --start 00:00:50 --end 00:01:19 --json\n  scenecut completions zsh > _scenecut";

#[derive(Debug, Parser)]
#[command(
    name = "scenecut",
    version,
    about = "Detect scene cuts and fades in video files",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar.
    #[arg(long, global = true)]
    progress: bool,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DetectorKind {
    Content,
    Threshold,
    Adaptive,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Detect scenes in a video file.
    #[command(
        about = "Detect scenes",
        after_help = "Examples:\n  scenecut detect input.mp4 --threshold 30\n  scenecut detect input.mp4 --detector threshold --fade-threshold 20 --add-final-scene\n  scenecut detect input.mp4 --timecodes"
    )]
    Detect {
        /// Input video path.
        input: PathBuf,

        /// Detector to run; repeat to combine several.
        #[arg(long = "detector", value_enum, default_values_t = [DetectorKind::Content])]
        detectors: Vec<DetectorKind>,

        /// Content detector threshold.
        #[arg(long, default_value_t = 27.0)]
        threshold: f64,

        /// Score brightness changes only (content and adaptive detectors).
        #[arg(long)]
        luma_only: bool,

        /// Threshold detector intensity level.
        #[arg(long, default_value_t = 12.0)]
        fade_threshold: f64,

        /// Cut placement between fade-out (-1) and fade-in (1).
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        fade_bias: f64,

        /// Cut at both ends of each fade instead of once in between.
        #[arg(long)]
        fade_edges: bool,

        /// Cut at a final fade-out the video never recovers from.
        #[arg(long)]
        add_final_scene: bool,

        /// Adaptive detector ratio threshold.
        #[arg(long, default_value_t = 3.0)]
        adaptive_threshold: f64,

        /// Adaptive detector neighbours on each side.
        #[arg(long, default_value_t = 2)]
        window_width: usize,

        /// Adaptive detector minimum content score.
        #[arg(long, default_value_t = 15.0)]
        min_content_val: f64,

        /// Minimum scene length in frames.
        #[arg(long, default_value_t = 15)]
        min_scene_len: u64,

        /// Start position (HH:MM:SS[.fff], frame number, or seconds with `s`).
        #[arg(long)]
        start: Option<String>,

        /// End position, exclusive.
        #[arg(long)]
        end: Option<String>,

        /// Frames to skip between analysed frames.
        #[arg(long, default_value_t = 0)]
        frame_skip: u32,

        /// Downscale factor: `auto`, `none`, or an integer.
        #[arg(long, default_value = "auto")]
        downscale: String,

        /// Stats file to load metrics from and save them to.
        #[arg(long)]
        stats: Option<PathBuf>,

        /// Output scenes as machine-readable JSON.
        #[arg(long)]
        json: bool,

        /// Print only the comma-separated cut timecodes.
        #[arg(long, conflicts_with = "json")]
        timecodes: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_log_level(value: &str) -> Option<FfmpegLogLevel> {
    match value.to_ascii_lowercase().as_str() {
        "quiet" => Some(FfmpegLogLevel::Quiet),
        "fatal" => Some(FfmpegLogLevel::Fatal),
        "error" => Some(FfmpegLogLevel::Error),
        "warning" | "warn" => Some(FfmpegLogLevel::Warning),
        "info" => Some(FfmpegLogLevel::Info),
        "debug" => Some(FfmpegLogLevel::Debug),
        _ => None,
    }
}

fn parse_downscale(value: &str) -> Option<Downscale> {
    match value.to_ascii_lowercase().as_str() {
        "auto" => Some(Downscale::Auto),
        "none" | "off" => Some(Downscale::None),
        number => number
            .parse::<u32>()
            .ok()
            .filter(|&factor| factor > 0)
            .map(Downscale::Factor),
    }
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let default_filter = if global.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let level = match &global.log_level {
        Some(level) => {
            parse_log_level(level).ok_or(format!("unsupported --log-level: {level}"))?
        }
        None if global.verbose => FfmpegLogLevel::Warning,
        None => FfmpegLogLevel::Error,
    };
    scenecut::set_ffmpeg_log_level(level);
    Ok(())
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new(total: Option<u64>) -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(total.unwrap_or(0));
        let style = ProgressStyle::with_template(
            "{spinner:.green} {bar:40.cyan/blue} {pos}/{len} frames ({eta}) {msg}",
        )?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total_frames {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.frames_processed);
        self.bar.set_message(format!("{} cuts", info.cuts_detected));
    }
}

fn build_detectors(
    pipeline: &mut DetectionPipeline,
    kinds: &[DetectorKind],
    content: ContentOptions,
    threshold: ThresholdOptions,
    adaptive: AdaptiveOptions,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut registered = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        if registered.contains(&kind) {
            continue;
        }
        registered.push(kind);
        let requirement = match kind {
            DetectorKind::Content => {
                pipeline.add_detector(Box::new(ContentDetector::new(content.clone())?))
            }
            DetectorKind::Threshold => {
                pipeline.add_detector(Box::new(ThresholdDetector::new(threshold.clone())?))
            }
            DetectorKind::Adaptive => {
                pipeline.add_detector(Box::new(AdaptiveDetector::new(adaptive.clone())?))
            }
        };
        if verbose {
            eprintln!(
                "{} {kind:?} detector ({requirement:?} stats)",
                "using".cyan().bold()
            );
        }
    }
    Ok(())
}

/// Load a stats file, or start an empty cache when there is none or it
/// cannot be read.
fn load_stats(path: &Path, verbose: bool) -> StatsCache {
    if !path.exists() {
        return StatsCache::new();
    }
    match StatsCache::load(path) {
        Ok(cache) => {
            if verbose {
                eprintln!(
                    "{} {} frames of metrics from {}",
                    "loaded".cyan().bold(),
                    cache.len(),
                    path.display()
                );
            }
            cache
        }
        Err(error) => {
            log::warn!("Ignoring stats file {}: {error}", path.display());
            eprintln!(
                "{} could not load {} ({error}); metrics will be recomputed",
                "warning:".yellow().bold(),
                path.display()
            );
            StatsCache::new()
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Detect {
            input,
            detectors,
            threshold,
            luma_only,
            fade_threshold,
            fade_bias,
            fade_edges,
            add_final_scene,
            adaptive_threshold,
            window_width,
            min_content_val,
            min_scene_len,
            start,
            end,
            frame_skip,
            downscale,
            stats,
            json,
            timecodes,
        } => {
            let mut source = FfmpegSource::open(&input)?;
            let frame_rate = source.frame_rate();
            let (width, height) = source.resolution();

            let downscale = parse_downscale(&downscale)
                .ok_or(format!("unsupported --downscale: {downscale}"))?;
            let mut options = PipelineOptions::new()
                .with_downscale(downscale)
                .with_frame_skip(frame_skip)
                .with_min_scene_len(min_scene_len);
            if let Some(start) = &start {
                options = options.with_start(FrameTime::parse(start, frame_rate)?);
            }
            if let Some(end) = &end {
                options = options.with_end(FrameTime::parse(end, frame_rate)?);
            }

            let progress = if cli.global.progress {
                Some(Arc::new(TerminalProgress::new(source.total_frames())?))
            } else {
                None
            };
            if let Some(progress) = &progress {
                options = options.with_progress(progress.clone());
            }

            let mut pipeline = DetectionPipeline::new(options);
            if let Some(path) = &stats {
                pipeline = pipeline.with_stats(load_stats(path, cli.global.verbose));
            }

            let mut content = ContentOptions::new()
                .threshold(threshold)
                .min_scene_len(min_scene_len);
            let mut adaptive = AdaptiveOptions::new()
                .adaptive_threshold(adaptive_threshold)
                .window_width(window_width)
                .min_content_val(min_content_val)
                .min_scene_len(min_scene_len);
            if luma_only {
                content = content.luma_only();
                adaptive = adaptive.luma_only();
            }
            let threshold = ThresholdOptions::new()
                .threshold(fade_threshold)
                .fade_bias(fade_bias)
                .add_final_scene(add_final_scene)
                .mode(if fade_edges { FadeCut::Edges } else { FadeCut::Biased })
                .min_scene_len(min_scene_len);
            build_detectors(
                &mut pipeline,
                &detectors,
                content,
                threshold,
                adaptive,
                cli.global.verbose,
            )?;

            let scenes = pipeline.detect_scenes(&mut source);
            if let Some(progress) = &progress {
                progress.bar.finish_and_clear();
            }
            let scenes = scenes?;

            if json {
                let payload = json!({
                    "input": input.display().to_string(),
                    "frame_rate": frame_rate.to_string(),
                    "resolution": [width, height],
                    "frames_processed": pipeline.frames_processed(),
                    "downscale_factor": pipeline.downscale_factor(),
                    "cuts": pipeline
                        .cut_list()
                        .iter()
                        .map(|cut| cut.frame_number())
                        .collect::<Vec<_>>(),
                    "scenes": scenes
                        .iter()
                        .map(|scene| json!({
                            "start_frame": scene.start().frame_number(),
                            "end_frame": scene.end().frame_number(),
                            "start_timecode": scene.start().timecode(),
                            "end_timecode": scene.end().timecode(),
                            "frame_count": scene.frame_count(),
                            "duration_seconds": scene.duration_seconds(),
                        }))
                        .collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else if timecodes {
                println!("{}", cut_timecodes(&scenes));
            } else {
                println!(
                    "{} {} scenes in {} frames ({}x{} @ {} fps)",
                    "detected".green().bold(),
                    scenes.len(),
                    pipeline.frames_processed(),
                    width,
                    height,
                    frame_rate
                );
                for (index, scene) in scenes.iter().enumerate() {
                    println!(
                        "{:>4}  {}  {:>7} - {:<7} {:>8.3}s",
                        (index + 1).to_string().bold(),
                        scene,
                        scene.start().frame_number(),
                        scene.end().frame_number(),
                        scene.duration_seconds()
                    );
                }
            }

            // Results are printed even when the stats file cannot be written.
            if let (Some(path), Some(cache)) = (&stats, pipeline.take_stats()) {
                cache.save(path).map_err(|error| {
                    format!("failed to save stats to {}: {error}", path.display())
                })?;
                if cli.global.verbose {
                    eprintln!(
                        "{} {} frames of metrics to {}",
                        "saved".cyan().bold(),
                        cache.len(),
                        path.display()
                    );
                }
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "scenecut", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, load_stats, parse_downscale, parse_log_level};
    use clap::CommandFactory;
    use scenecut::Downscale;

    #[test]
    fn parse_downscale_values() {
        assert_eq!(parse_downscale("auto"), Some(Downscale::Auto));
        assert_eq!(parse_downscale("NONE"), Some(Downscale::None));
        assert_eq!(parse_downscale("3"), Some(Downscale::Factor(3)));
        assert_eq!(parse_downscale("0"), None);
        assert_eq!(parse_downscale("half"), None);
    }

    #[test]
    fn parse_log_level_aliases() {
        assert!(parse_log_level("warn").is_some());
        assert!(parse_log_level("Quiet").is_some());
        assert!(parse_log_level("verbose").is_none());
    }

    #[test]
    fn unreadable_stats_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.stats.csv");
        std::fs::write(&path, "not,a\nstats,file\n").unwrap();
        assert!(load_stats(&path, false).is_empty());
        assert!(load_stats(&dir.path().join("missing.csv"), false).is_empty());
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
