use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::task::types::Segment;

/// One entry in a task's ordered event stream: any number of progress
/// updates followed by exactly one terminal event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    Progress {
        task_id: String,
        progress: u8,
        message: String,
    },
    Completed {
        task_id: String,
        text: String,
        segments: Vec<Segment>,
    },
    Cancelled {
        task_id: String,
    },
    Failed {
        task_id: String,
        error: String,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::Progress { task_id, .. }
            | TaskEvent::Completed { task_id, .. }
            | TaskEvent::Cancelled { task_id }
            | TaskEvent::Failed { task_id, .. } => task_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskEvent::Progress { .. })
    }
}

/// Delivers task events to an external consumer. Delivery failures are the
/// caller's to log; they never feed back into task state.
#[async_trait]
pub trait TaskCallback: Send + Sync {
    async fn deliver(&self, event: &TaskEvent) -> Result<()>;
}

/// POSTs events as JSON to a caller-supplied webhook URL.
pub struct HttpCallback {
    client: reqwest::Client,
    callback_url: String,
}

impl HttpCallback {
    pub fn new(callback_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            callback_url,
        }
    }
}

#[async_trait]
impl TaskCallback for HttpCallback {
    async fn deliver(&self, event: &TaskEvent) -> Result<()> {
        self.client
            .post(&self.callback_url)
            .json(event)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
