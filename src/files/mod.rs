use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{info, warn};

const ALLOWED_EXTENSIONS: &[&str] = &[
    "wav", "mp3", "m4a", "flac", "ogg", "wma", "mp4", "mov", "avi", "mkv",
];

/// Upload folder management: sanitized, timestamped filenames with an
/// extension allow-list, plus periodic cleanup of stale files.
pub struct FileStore {
    upload_dir: PathBuf,
}

impl FileStore {
    pub fn new(upload_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&upload_dir)
            .with_context(|| format!("failed to create upload dir {}", upload_dir.display()))?;
        Ok(Self { upload_dir })
    }

    pub fn allowed(filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(OsStr::to_str)
            .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    fn sanitize(filename: &str) -> String {
        filename
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Store an uploaded file under a timestamped name to avoid collisions.
    pub async fn save(&self, filename: &str, data: &[u8]) -> Result<PathBuf> {
        if !Self::allowed(filename) {
            bail!("unsupported file type: {}", filename);
        }
        let sanitized = Self::sanitize(filename);
        let path = Path::new(&sanitized);
        let stem = path
            .file_stem()
            .and_then(OsStr::to_str)
            .unwrap_or("upload");
        let ext = path.extension().and_then(OsStr::to_str).unwrap_or("bin");

        let stored = self
            .upload_dir
            .join(format!("{}_{}.{}", stem, Utc::now().timestamp_millis(), ext));
        tokio::fs::write(&stored, data)
            .await
            .with_context(|| format!("failed to write upload {}", stored.display()))?;
        info!("stored upload {} ({} bytes)", stored.display(), data.len());
        Ok(stored)
    }

    /// Remove uploads older than `max_age_secs`. Unreadable entries are
    /// skipped with a warning.
    pub async fn clean_old_files(&self, max_age_secs: u64) -> usize {
        let max_age = Duration::from_secs(max_age_secs);
        let mut removed = 0;

        let entries = match std::fs::read_dir(&self.upload_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("failed to read upload dir {}: {}", self.upload_dir.display(), e);
                return 0;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| modified.elapsed().ok());
            if let Some(age) = age {
                if age > max_age {
                    match std::fs::remove_file(&path) {
                        Ok(()) => {
                            info!("removed stale upload {}", path.display());
                            removed += 1;
                        }
                        Err(e) => warn!("failed to remove {}: {}", path.display(), e),
                    }
                }
            }
        }
        removed
    }
}
