use once_cell::sync::Lazy;
use regex::Regex;

use crate::task::types::Segment;

// whisper-cli segment lines: `[HH:MM:SS.mmm --> HH:MM:SS.mmm] text`
static SEGMENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(\d{2}:\d{2}:\d{2}\.\d{3}) --> (\d{2}:\d{2}:\d{2}\.\d{3})\]\s*(.*)")
        .expect("segment pattern must compile")
});

/// Convert an `HH:MM:SS.mmm` timestamp into fractional seconds. Malformed
/// components default to 0.0 so a single bad line never aborts parsing.
pub fn timestamp_seconds(ts: &str) -> f64 {
    let fields: Vec<&str> = ts.split(':').collect();
    if fields.len() != 3 {
        return 0.0;
    }
    let hours: f64 = fields[0].parse().unwrap_or(0.0);
    let minutes: f64 = fields[1].parse().unwrap_or(0.0);
    let seconds: f64 = fields[2].parse().unwrap_or(0.0);
    hours * 3600.0 + minutes * 60.0 + seconds
}

/// Extract one timestamped segment from a line of raw output, if present.
pub fn parse_segment_line(line: &str) -> Option<Segment> {
    let caps = SEGMENT_PATTERN.captures(line.trim())?;
    Some(Segment {
        start: timestamp_seconds(&caps[1]),
        end: timestamp_seconds(&caps[2]),
        text: caps[3].trim().to_string(),
    })
}

/// Percentage of the trimmed input covered so far. The caller supplies the
/// real duration; a non-positive one yields 0.
pub fn progress_percent(position: f64, total_duration: f64) -> u8 {
    if total_duration <= 0.0 {
        return 0;
    }
    (position / total_duration * 100.0).round().clamp(0.0, 100.0) as u8
}

/// All segments of a finished output block, in file order. A block with no
/// timestamped lines becomes a single implicit segment spanning the whole
/// trimmed input, carrying the raw text verbatim.
pub fn collect_segments(output: &str, total_duration: f64) -> Vec<Segment> {
    let segments: Vec<Segment> = output.lines().filter_map(parse_segment_line).collect();
    if segments.is_empty() {
        return vec![Segment {
            start: 0.0,
            end: total_duration,
            text: output.trim().to_string(),
        }];
    }
    segments
}

/// Space-joined segment texts, for display without timestamps.
pub fn full_text(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| s.text.as_str())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
