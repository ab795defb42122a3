use crate::supervisor::parser;
use crate::task::types::Segment;

/// Seconds to the SRT clock format `HH:MM:SS,mmm`.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = total_ms % 3_600_000 / 60_000;
    let secs = total_ms % 60_000 / 1000;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}

/// Render parsed segments as an SRT document with 1-based indices.
pub fn segments_to_srt(segments: &[Segment]) -> String {
    let mut parts = Vec::new();
    for (i, segment) in segments.iter().enumerate() {
        parts.push((i + 1).to_string());
        parts.push(format!(
            "{} --> {}",
            format_timestamp(segment.start),
            format_timestamp(segment.end)
        ));
        parts.push(segment.text.trim().to_string());
        parts.push(String::new());
    }
    parts.join("\n")
}

/// Render raw timestamped output when no parsed segments were stored.
pub fn whisper_output_to_srt(output: &str, total_duration: f64) -> String {
    segments_to_srt(&parser::collect_segments(output, total_duration))
}
