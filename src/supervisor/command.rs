use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use tokio::process::Command;

use crate::task::types::TaskKind;

/// One whisper-cli invocation:
/// `executable -m <model> -f <input> -bs <1..8> -l <lang|auto> [--translate] -oj`
#[derive(Debug, Clone)]
pub struct WhisperCommand {
    pub executable: PathBuf,
    pub model_path: PathBuf,
    pub input_path: PathBuf,
    pub language: String,
    pub beam_size: u32,
    pub kind: TaskKind,
}

impl WhisperCommand {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-m".to_string(),
            self.model_path.display().to_string(),
            "-f".to_string(),
            self.input_path.display().to_string(),
            "-bs".to_string(),
            self.beam_size.clamp(1, 8).to_string(),
            "-l".to_string(),
            self.language.clone(),
        ];
        if self.kind == TaskKind::Translate {
            args.push("--translate".to_string());
        }
        args.push("-oj".to_string());
        args
    }

    pub fn build(&self) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.args(self.args());
        cmd
    }
}

/// Resolve the transcription binary. A directory is taken to contain the
/// platform binary; the resolved path must exist before anything is spawned.
pub fn resolve_executable(path: &Path) -> Result<PathBuf> {
    let resolved = if path.is_dir() {
        if cfg!(windows) {
            path.join("whisper-cli.exe")
        } else {
            path.join("whisper-cli")
        }
    } else {
        path.to_path_buf()
    };
    if !resolved.exists() {
        bail!("whisper executable not found: {}", resolved.display());
    }
    Ok(resolved)
}
