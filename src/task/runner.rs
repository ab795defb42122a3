use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::task::types::{TranscribeOptions, TranscriptionResult};

/// Everything a runner needs for one execution, cloned out of the registry so
/// its lock is never held across process I/O.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub task_id: String,
    pub input_path: PathBuf,
    pub options: TranscribeOptions,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed(TranscriptionResult),
    Cancelled,
    Failed(String),
}

/// Receives `{progress, message}` updates from a running task. The registry
/// is the production implementor; tests substitute their own.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn update(&self, progress: u8, message: String);
}

/// Executes one task to an outcome. Injected into the registry so tests can
/// observe spawn attempts without launching real processes.
#[async_trait]
pub trait TaskRunner: Send + Sync + 'static {
    async fn run(
        &self,
        req: RunRequest,
        cancel: CancellationToken,
        sink: Arc<dyn ProgressSink>,
    ) -> RunOutcome;
}
