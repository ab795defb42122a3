use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::media;
use crate::supervisor::{self, resolve_executable, ProcessOutcome, WhisperCommand};
use crate::task::runner::{ProgressSink, RunOutcome, RunRequest, TaskRunner};

/// Production task runner: prepares the audio, then supervises one
/// whisper-cli invocation against it.
pub struct WhisperRunner {
    models_dir: PathBuf,
    temp_dir: PathBuf,
    default_executable: PathBuf,
}

impl WhisperRunner {
    pub fn new(models_dir: PathBuf, temp_dir: PathBuf, default_executable: PathBuf) -> Self {
        Self {
            models_dir,
            temp_dir,
            default_executable,
        }
    }

    fn model_path(&self, model: &str) -> PathBuf {
        self.models_dir.join(format!("ggml-{}.bin", model))
    }

    /// Precondition checks and audio conversion. Anything failing here is a
    /// `Failed` outcome reported before a transcription process exists.
    async fn prepare(
        &self,
        req: &RunRequest,
        sink: &dyn ProgressSink,
    ) -> Result<(WhisperCommand, media::PreparedAudio)> {
        let requested: &Path = req
            .options
            .executable
            .as_deref()
            .unwrap_or(&self.default_executable);
        let executable = resolve_executable(requested)?;

        let model_path = self.model_path(&req.options.model);
        if !model_path.exists() {
            bail!("model file not found: {}", model_path.display());
        }

        sink.update(0, "Preparing audio".to_string()).await;
        let prepared = media::prepare_wav(&req.input_path, &self.temp_dir, req.options.range).await?;

        let command = WhisperCommand {
            executable,
            model_path,
            input_path: prepared.wav_path.clone(),
            language: req.options.language.clone(),
            beam_size: req.options.beam_size,
            kind: req.options.kind,
        };
        Ok((command, prepared))
    }
}

#[async_trait]
impl TaskRunner for WhisperRunner {
    async fn run(
        &self,
        req: RunRequest,
        cancel: CancellationToken,
        sink: Arc<dyn ProgressSink>,
    ) -> RunOutcome {
        let (command, prepared) = match self.prepare(&req, sink.as_ref()).await {
            Ok(prepared) => prepared,
            Err(e) => return RunOutcome::Failed(e.to_string()),
        };

        info!(
            "task {}: transcribing {} ({:.2}s of audio)",
            req.task_id,
            req.input_path.display(),
            prepared.duration
        );
        let outcome =
            supervisor::run_process(command.build(), prepared.duration, &cancel, sink.as_ref())
                .await;
        prepared.cleanup().await;

        match outcome {
            ProcessOutcome::Completed(result) => RunOutcome::Completed(result),
            ProcessOutcome::Cancelled => RunOutcome::Cancelled,
            ProcessOutcome::Failed(error) => RunOutcome::Failed(error),
        }
    }
}
