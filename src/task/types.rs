use std::fmt::Display;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::task::events::TaskEvent;

/// Bound of the per-task event queue. Subscribers that fall further behind
/// than this skip the oldest events instead of blocking the writer.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Failed)
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    #[default]
    Transcribe,
    Translate,
}

/// Optional trim window in seconds. A missing end means "until the end of the
/// input"; validation against the real duration happens in the media step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeOptions {
    pub model: String,
    pub language: String,
    pub beam_size: u32,
    pub kind: TaskKind,
    pub range: Option<TimeRange>,
    pub executable: Option<PathBuf>,
    pub callback_url: Option<String>,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            model: "base".to_string(),
            language: "auto".to_string(),
            beam_size: 5,
            kind: TaskKind::Transcribe,
            range: None,
            executable: None,
            callback_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    /// Raw line output of the transcription binary, timestamps included.
    pub text: String,
    pub segments: Vec<Segment>,
}

/// A single transcription run. Owned exclusively by the registry; the live
/// value (with its token and event channel) never leaves it, only [`TaskView`]
/// snapshots do.
#[derive(Debug)]
pub struct Task {
    pub id: String,
    pub input_path: PathBuf,
    pub options: TranscribeOptions,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: String,
    pub result: Option<TranscriptionResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancel: CancellationToken,
    pub events: broadcast::Sender<TaskEvent>,
}

impl Task {
    pub fn new(id: String, input_path: PathBuf, options: TranscribeOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_QUEUE_CAPACITY);
        Self {
            id,
            input_path,
            options,
            status: TaskStatus::Pending,
            progress: 0,
            message: "Waiting to start".to_string(),
            result: None,
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            cancel: CancellationToken::new(),
            events,
        }
    }

    pub fn view(&self) -> TaskView {
        TaskView {
            id: self.id.clone(),
            input_path: self.input_path.clone(),
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Read-only snapshot of a task, safe to hand to any number of readers.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    pub id: String,
    pub input_path: PathBuf,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: String,
    pub result: Option<TranscriptionResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
