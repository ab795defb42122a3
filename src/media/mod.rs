use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::task::types::TimeRange;

/// A decodable WAV produced for one run, plus the trimmed duration the
/// progress parser needs.
#[derive(Debug)]
pub struct PreparedAudio {
    pub wav_path: PathBuf,
    pub duration: f64,
}

impl PreparedAudio {
    pub async fn cleanup(self) {
        if let Err(e) = tokio::fs::remove_file(&self.wav_path).await {
            warn!("failed to remove temp file {}: {}", self.wav_path.display(), e);
        }
    }
}

/// Input duration in seconds as reported by ffprobe.
pub async fn probe_duration(input: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(input)
        .output()
        .await
        .context("failed to run ffprobe")?;

    if !output.status.success() {
        bail!(
            "ffprobe failed for {}: {}",
            input.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let text = String::from_utf8_lossy(&output.stdout);
    let duration: f64 = text
        .trim()
        .parse()
        .with_context(|| format!("unreadable ffprobe duration for {}", input.display()))?;
    Ok(duration)
}

/// Clamp a requested trim window against the real duration. Out-of-range
/// starts fall back to 0, bad or missing ends fall back to the full length.
pub fn clamp_range(range: Option<TimeRange>, duration: f64) -> (f64, f64) {
    let (mut start, mut end) = match range {
        Some(range) => (range.start, range.end.unwrap_or(duration)),
        None => (0.0, duration),
    };
    if start < 0.0 || start >= duration {
        start = 0.0;
    }
    if end > duration {
        end = duration;
    }
    if end <= start {
        end = duration;
    }
    (start, end)
}

/// Convert (and optionally trim) the input into a 16 kHz mono WAV the
/// transcription binary can decode.
pub async fn prepare_wav(
    input: &Path,
    temp_dir: &Path,
    range: Option<TimeRange>,
) -> Result<PreparedAudio> {
    let duration = probe_duration(input).await?;
    let (start, end) = clamp_range(range, duration);

    tokio::fs::create_dir_all(temp_dir)
        .await
        .with_context(|| format!("failed to create temp dir {}", temp_dir.display()))?;
    let wav_path = temp_dir.join(format!("scribe-{}.wav", Uuid::new_v4()));

    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-y"])
        .arg("-ss")
        .arg(start.to_string())
        .arg("-to")
        .arg(end.to_string())
        .arg("-i")
        .arg(input)
        .args(["-vn", "-acodec", "pcm_s16le", "-ar", "16000", "-ac", "1"])
        .arg(&wav_path)
        .output()
        .await
        .context("failed to run ffmpeg")?;

    if !output.status.success() {
        bail!(
            "ffmpeg failed for {}: {}",
            input.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    debug!(
        "prepared {} ({:.2}s-{:.2}s of {:.2}s)",
        wav_path.display(),
        start,
        end,
        duration
    );
    Ok(PreparedAudio { wav_path, duration: end - start })
}

/// Parse an `HH:MM:SS` clock value into seconds (trim request fields).
pub fn parse_clock(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
