//! Per-frame metric cache.
//!
//! [`StatsCache`] maps `(frame number, metric name)` pairs to the values the
//! detectors compute, so a second analysis of the same video can skip the
//! expensive pixel work. The cache remembers the frame rate and resolution
//! it was built against and refuses to be reused for a different video.
//!
//! # File format
//!
//! ```text
//! frame_rate,24000/1001,resolution,1920x1080
//! frame_number,content_val,delta_hue,delta_sat,delta_lum
//! 1,12.5,3.25,7.125,27.125
//! ```
//!
//! The first row records the source properties, the second the column
//! headers. Missing values are written as empty cells. A file with data rows
//! must name both source properties; only an empty cache may leave them
//! blank. Floats use Rust's
//! shortest round-trip formatting, so a reloaded cache returns exactly the
//! values that were saved.
//!
//! # Example
//!
//! ```no_run
//! use scenecut::{FrameRate, StatsCache};
//!
//! let mut stats = StatsCache::new();
//! stats.bind(FrameRate::new(25, 1)?, (1920, 1080));
//! stats.set(10, "content_val", 4.5);
//! stats.save("video.stats.csv")?;
//!
//! let reloaded = StatsCache::load("video.stats.csv")?;
//! assert_eq!(reloaded.get(10, "content_val"), Some(4.5));
//! # Ok::<(), scenecut::SceneCutError>(())
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    fs::{self, File},
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use crate::{error::SceneCutError, frame_time::FrameRate};

const METADATA_FRAME_RATE: &str = "frame_rate";
const METADATA_RESOLUTION: &str = "resolution";
const FRAME_NUMBER_COLUMN: &str = "frame_number";

/// Metric values recorded for a single frame.
pub type FrameMetrics = HashMap<String, f64>;

/// Cache of per-frame metrics keyed by native frame number.
#[derive(Debug, Clone, Default)]
pub struct StatsCache {
    frames: BTreeMap<u64, FrameMetrics>,
    /// Metric names in the order they were first recorded.
    metric_names: Vec<String>,
    frame_rate: Option<FrameRate>,
    resolution: Option<(u32, u32)>,
}

impl StatsCache {
    /// Create an empty, unbound cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up one metric for one frame.
    pub fn get(&self, frame_number: u64, metric: &str) -> Option<f64> {
        self.frames.get(&frame_number)?.get(metric).copied()
    }

    /// Look up several metrics at once; `None` unless every one is present.
    pub fn get_many(&self, frame_number: u64, metrics: &[&str]) -> Option<Vec<f64>> {
        let recorded = self.frames.get(&frame_number)?;
        metrics
            .iter()
            .map(|metric| recorded.get(*metric).copied())
            .collect()
    }

    /// Returns `true` if every listed metric is recorded for the frame.
    pub fn contains(&self, frame_number: u64, metrics: &[&str]) -> bool {
        self.frames
            .get(&frame_number)
            .is_some_and(|recorded| metrics.iter().all(|metric| recorded.contains_key(*metric)))
    }

    /// Record a metric value, replacing any previous value.
    pub fn set(&mut self, frame_number: u64, metric: &str, value: f64) {
        if !self.metric_names.iter().any(|name| name == metric) {
            self.metric_names.push(metric.to_string());
        }
        self.frames
            .entry(frame_number)
            .or_default()
            .insert(metric.to_string(), value);
    }

    /// Number of frames with at least one recorded metric.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if no metrics have been recorded.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Metric names in first-seen order.
    pub fn metric_names(&self) -> &[String] {
        &self.metric_names
    }

    /// Frame numbers that carry metrics, in ascending order.
    pub fn frame_numbers(&self) -> impl Iterator<Item = u64> + '_ {
        self.frames.keys().copied()
    }

    /// The frame rate the cache is bound to, if any.
    pub fn frame_rate(&self) -> Option<FrameRate> {
        self.frame_rate
    }

    /// The `(width, height)` the cache is bound to, if any.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.resolution
    }

    /// Returns `true` if values in this cache may be reused for a source
    /// with the given properties.
    ///
    /// An unbound cache is compatible with anything.
    pub fn is_compatible(&self, frame_rate: FrameRate, resolution: (u32, u32)) -> bool {
        self.frame_rate.is_none_or(|rate| rate == frame_rate)
            && self.resolution.is_none_or(|size| size == resolution)
    }

    fn is_bound(&self) -> bool {
        self.frame_rate.is_some() && self.resolution.is_some()
    }

    /// Record the source properties the cached values belong to.
    pub fn bind(&mut self, frame_rate: FrameRate, resolution: (u32, u32)) {
        self.frame_rate = Some(frame_rate);
        self.resolution = Some(resolution);
    }

    /// Drop every cached value and rebind to new source properties.
    pub fn invalidate(&mut self, frame_rate: FrameRate, resolution: (u32, u32)) {
        self.frames.clear();
        self.metric_names.clear();
        self.bind(frame_rate, resolution);
    }

    /// Write the cache to `path`.
    ///
    /// The data is written to a temporary sibling file first and then
    /// renamed over the destination.
    ///
    /// # Errors
    ///
    /// Returns [`SceneCutError::InvalidConfiguration`] if the cache holds
    /// metrics but was never [bound](StatsCache::bind), and
    /// [`SceneCutError::IoError`] if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SceneCutError> {
        let path = path.as_ref();
        let mut temporary_name = path.as_os_str().to_owned();
        temporary_name.push(".partial");
        let temporary_path = Path::new(&temporary_name);

        log::debug!(
            "Saving stats for {} frames to {}",
            self.frames.len(),
            path.display()
        );

        let result = File::create(temporary_path)
            .map_err(SceneCutError::from)
            .and_then(|file| {
                let mut writer = BufWriter::new(file);
                self.save_to_writer(&mut writer)?;
                writer.flush()?;
                Ok(())
            });

        match result {
            Ok(()) => {
                fs::rename(temporary_path, path)?;
                Ok(())
            }
            Err(error) => {
                let _ = fs::remove_file(temporary_path);
                Err(error)
            }
        }
    }

    /// Serialise the cache into any writer.
    ///
    /// # Errors
    ///
    /// Same as [`save`](StatsCache::save).
    pub fn save_to_writer<W: Write>(&self, writer: &mut W) -> Result<(), SceneCutError> {
        if !self.is_empty() && !self.is_bound() {
            return Err(SceneCutError::config(
                "stats",
                "metrics cannot be saved without the frame rate and resolution they belong to",
            ));
        }
        let frame_rate = self
            .frame_rate
            .map(|rate| rate.to_string())
            .unwrap_or_default();
        let resolution = self
            .resolution
            .map(|(width, height)| format!("{width}x{height}"))
            .unwrap_or_default();
        writeln!(
            writer,
            "{METADATA_FRAME_RATE},{frame_rate},{METADATA_RESOLUTION},{resolution}"
        )?;

        let mut header = vec![FRAME_NUMBER_COLUMN.to_string()];
        header.extend(self.metric_names.iter().map(|name| quote_field(name)));
        writeln!(writer, "{}", header.join(","))?;

        for (frame_number, metrics) in &self.frames {
            let mut row = vec![frame_number.to_string()];
            row.extend(self.metric_names.iter().map(|name| {
                metrics
                    .get(name)
                    .map(|value| value.to_string())
                    .unwrap_or_default()
            }));
            writeln!(writer, "{}", row.join(","))?;
        }
        Ok(())
    }

    /// Load a cache previously written by [`save`](StatsCache::save).
    ///
    /// # Errors
    ///
    /// Returns [`SceneCutError::IoError`] if the file cannot be read, or
    /// [`SceneCutError::StatsParse`] if it is malformed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SceneCutError> {
        let path = path.as_ref();
        log::debug!("Loading stats from {}", path.display());
        let file = File::open(path)?;
        Self::load_from_reader(BufReader::new(file))
    }

    /// Parse a cache from any buffered reader.
    pub fn load_from_reader<R: BufRead>(reader: R) -> Result<Self, SceneCutError> {
        let mut lines = reader.lines().enumerate();
        let mut cache = StatsCache::new();

        let (_, metadata) = lines.next().ok_or_else(|| SceneCutError::StatsParse {
            line: 1,
            reason: "file is empty".to_string(),
        })?;
        parse_metadata(&split_fields(&metadata?), &mut cache)?;

        let (_, header) = lines.next().ok_or_else(|| SceneCutError::StatsParse {
            line: 2,
            reason: "missing column header row".to_string(),
        })?;
        let header = split_fields(&header?);
        if header.first().map(String::as_str) != Some(FRAME_NUMBER_COLUMN) {
            return Err(SceneCutError::StatsParse {
                line: 2,
                reason: format!("first column must be '{FRAME_NUMBER_COLUMN}'"),
            });
        }
        let columns = &header[1..];
        cache.metric_names = columns.to_vec();

        for (index, line) in lines {
            let line_number = index + 1;
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_fields(&line);
            if fields.len() != header.len() {
                return Err(SceneCutError::StatsParse {
                    line: line_number,
                    reason: format!("expected {} fields, found {}", header.len(), fields.len()),
                });
            }

            let frame_number: u64 =
                fields[0]
                    .trim()
                    .parse()
                    .map_err(|_| SceneCutError::StatsParse {
                        line: line_number,
                        reason: format!("invalid frame number '{}'", fields[0]),
                    })?;

            for (name, cell) in columns.iter().zip(&fields[1..]) {
                if cell.is_empty() {
                    continue;
                }
                let value: f64 = cell.trim().parse().map_err(|_| SceneCutError::StatsParse {
                    line: line_number,
                    reason: format!("invalid value '{cell}' for metric '{name}'"),
                })?;
                cache.set(frame_number, name, value);
            }
        }

        if !cache.is_empty() && !cache.is_bound() {
            return Err(SceneCutError::StatsParse {
                line: 1,
                reason: "frame rate and resolution are required when the file has data rows"
                    .to_string(),
            });
        }
        Ok(cache)
    }
}

fn parse_metadata(fields: &[String], cache: &mut StatsCache) -> Result<(), SceneCutError> {
    let malformed = |reason: String| SceneCutError::StatsParse { line: 1, reason };

    if fields.first().map(String::as_str) != Some(METADATA_FRAME_RATE) {
        return Err(malformed("missing metadata row".to_string()));
    }

    for pair in fields.chunks(2) {
        let [key, value] = pair else {
            return Err(malformed("metadata row must contain key/value pairs".to_string()));
        };
        if value.is_empty() {
            continue;
        }
        match key.as_str() {
            METADATA_FRAME_RATE => {
                let rate = value
                    .parse::<FrameRate>()
                    .map_err(|error| malformed(error.to_string()))?;
                cache.frame_rate = Some(rate);
            }
            METADATA_RESOLUTION => {
                let parsed = value
                    .split_once('x')
                    .and_then(|(width, height)| Some((width.parse().ok()?, height.parse().ok()?)));
                let resolution =
                    parsed.ok_or_else(|| malformed(format!("invalid resolution '{value}'")))?;
                cache.resolution = Some(resolution);
            }
            other => log::debug!("Ignoring unknown stats metadata key '{other}'"),
        }
    }

    Ok(())
}

fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut characters = line.chars().peekable();

    while let Some(character) = characters.next() {
        match character {
            '"' if in_quotes && characters.peek() == Some(&'"') => {
                current.push('"');
                characters.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(character),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate() -> FrameRate {
        FrameRate::new(24_000, 1_001).unwrap()
    }

    #[test]
    fn set_and_get() {
        let mut cache = StatsCache::new();
        assert!(cache.is_empty());
        cache.set(3, "content_val", 1.5);
        cache.set(3, "content_val", 2.5);
        assert_eq!(cache.get(3, "content_val"), Some(2.5));
        assert_eq!(cache.get(3, "delta_hue"), None);
        assert_eq!(cache.get(4, "content_val"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn get_many_is_all_or_nothing() {
        let mut cache = StatsCache::new();
        cache.set(1, "a", 1.0);
        cache.set(1, "b", 2.0);
        assert_eq!(cache.get_many(1, &["a", "b"]), Some(vec![1.0, 2.0]));
        assert_eq!(cache.get_many(1, &["a", "c"]), None);
        assert!(cache.contains(1, &["b", "a"]));
        assert!(!cache.contains(2, &["a"]));
    }

    #[test]
    fn compatibility() {
        let mut cache = StatsCache::new();
        assert!(cache.is_compatible(rate(), (640, 480)));
        cache.bind(rate(), (640, 480));
        assert!(cache.is_compatible(rate(), (640, 480)));
        assert!(!cache.is_compatible(rate(), (1280, 720)));
        assert!(!cache.is_compatible(FrameRate::new(25, 1).unwrap(), (640, 480)));
    }

    #[test]
    fn invalidate_clears_everything() {
        let mut cache = StatsCache::new();
        cache.bind(rate(), (640, 480));
        cache.set(1, "a", 1.0);
        cache.invalidate(FrameRate::new(25, 1).unwrap(), (320, 240));
        assert!(cache.is_empty());
        assert!(cache.metric_names().is_empty());
        assert_eq!(cache.resolution(), Some((320, 240)));
    }

    #[test]
    fn writer_round_trip_is_exact() {
        let mut cache = StatsCache::new();
        cache.bind(rate(), (1920, 1080));
        cache.set(1, "content_val", 0.1 + 0.2);
        cache.set(1, "adaptive_ratio (w=2)", 1.0 / 3.0);
        cache.set(7, "content_val", 1e-300);
        cache.set(9, "odd, \"name\"", 42.0);

        let mut buffer = Vec::new();
        cache.save_to_writer(&mut buffer).unwrap();
        let loaded = StatsCache::load_from_reader(buffer.as_slice()).unwrap();

        assert_eq!(loaded.frame_rate(), Some(rate()));
        assert_eq!(loaded.resolution(), Some((1920, 1080)));
        assert_eq!(loaded.metric_names(), cache.metric_names());
        for frame_number in cache.frame_numbers() {
            for name in cache.metric_names() {
                assert_eq!(loaded.get(frame_number, name), cache.get(frame_number, name));
            }
        }
    }

    #[test]
    fn written_layout() {
        let mut cache = StatsCache::new();
        cache.bind(FrameRate::new(25, 1).unwrap(), (4, 2));
        cache.set(2, "b", 2.0);
        cache.set(1, "a", 0.5);

        let mut buffer = Vec::new();
        cache.save_to_writer(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text,
            "frame_rate,25,resolution,4x2\nframe_number,b,a\n1,,0.5\n2,2,\n"
        );
    }

    #[test]
    fn malformed_input() {
        assert!(matches!(
            StatsCache::load_from_reader("".as_bytes()),
            Err(SceneCutError::StatsParse { line: 1, .. })
        ));
        assert!(matches!(
            StatsCache::load_from_reader("frame_rate,25,resolution,4x2\n".as_bytes()),
            Err(SceneCutError::StatsParse { line: 2, .. })
        ));
        assert!(matches!(
            StatsCache::load_from_reader(
                "frame_rate,25,resolution,4x2\nframe_number,a\nx,1\n".as_bytes()
            ),
            Err(SceneCutError::StatsParse { line: 3, .. })
        ));
        assert!(matches!(
            StatsCache::load_from_reader(
                "frame_rate,25,resolution,4x2\nframe_number,a\n1,abc\n".as_bytes()
            ),
            Err(SceneCutError::StatsParse { line: 3, .. })
        ));
        assert!(matches!(
            StatsCache::load_from_reader("frame_rate,0,resolution,4x2\n".as_bytes()),
            Err(SceneCutError::StatsParse { line: 1, .. })
        ));
    }

    #[test]
    fn unbound_metrics_are_refused() {
        let mut cache = StatsCache::new();
        assert!(cache.save_to_writer(&mut Vec::new()).is_ok());
        cache.set(1, "content_val", 2.0);
        assert!(matches!(
            cache.save_to_writer(&mut Vec::new()),
            Err(SceneCutError::InvalidConfiguration { parameter: "stats", .. })
        ));
        assert!(matches!(
            StatsCache::load_from_reader(
                "frame_rate,25,resolution,\nframe_number,a\n1,2\n".as_bytes()
            ),
            Err(SceneCutError::StatsParse { line: 1, .. })
        ));
    }

    #[test]
    fn quoted_fields() {
        assert_eq!(split_fields("a,\"b,c\",\"d\"\"e\""), vec!["a", "b,c", "d\"e"]);
        assert_eq!(quote_field("plain"), "plain");
        assert_eq!(quote_field("x,y"), "\"x,y\"");
    }
}
