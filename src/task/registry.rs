use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::task::events::{HttpCallback, TaskCallback, TaskEvent};
use crate::task::runner::{ProgressSink, RunOutcome, RunRequest, TaskRunner};
use crate::task::types::{Task, TaskStatus, TaskView, TranscribeOptions};

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Hard cap on stored tasks. Creation beyond it evicts the oldest tasks
    /// by creation time, running ones included.
    pub capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// Single source of truth for task existence and state. All status
/// transitions happen under one lock; execution runs outside it.
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, Task>>,
    config: RegistryConfig,
    runner: Arc<dyn TaskRunner>,
}

/// Routes a running task's progress back into the registry, which is the
/// only writer of task state.
struct RegistrySink {
    registry: Arc<TaskRegistry>,
    task_id: String,
}

#[async_trait]
impl ProgressSink for RegistrySink {
    async fn update(&self, progress: u8, message: String) {
        self.registry.update_progress(&self.task_id, progress, message).await;
    }
}

impl TaskRegistry {
    pub fn new(runner: Arc<dyn TaskRunner>, config: RegistryConfig) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            config,
            runner,
        }
    }

    /// Create a task. A missing input file is a valid creation outcome, not
    /// an exception: the task lands directly in `Failed` and no process is
    /// ever spawned for it.
    pub async fn create_task(
        &self,
        input_path: PathBuf,
        options: TranscribeOptions,
        id: Option<String>,
    ) -> Result<TaskView> {
        let id = id.unwrap_or_else(|| format!("task-{}", Uuid::new_v4()));
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&id) {
            bail!("task id already in use: {}", id);
        }

        let mut task = Task::new(id.clone(), input_path, options);
        if !task.input_path.exists() {
            let message = format!("input file does not exist: {}", task.input_path.display());
            warn!("task {}: {}", id, message);
            task.status = TaskStatus::Failed;
            task.message = format!("Task failed: {}", message);
            task.error = Some(message);
        } else {
            info!("created task {} for {}", id, task.input_path.display());
        }

        let view = task.view();
        tasks.insert(id, task);
        self.evict_over_capacity(&mut tasks);
        Ok(view)
    }

    fn evict_over_capacity(&self, tasks: &mut HashMap<String, Task>) {
        while tasks.len() > self.config.capacity {
            let oldest = tasks.values().min_by_key(|t| t.created_at).map(|t| t.id.clone());
            let Some(id) = oldest else { break };
            if let Some(task) = tasks.remove(&id) {
                if task.status == TaskStatus::Running {
                    // Caller-visible risk of the capacity policy: the
                    // supervisor observes the token and tears down.
                    warn!("evicting running task {} to stay within capacity", id);
                    task.cancel.cancel();
                } else {
                    info!("evicted task {} to stay within capacity", id);
                }
            }
        }
    }

    /// `Pending -> Running` check-and-flip under the lock, so at most one
    /// supervisor ever runs per task. Returns false for anything else.
    pub async fn start_task(self: Arc<Self>, id: &str) -> bool {
        let (req, cancel, sink) = {
            let mut tasks = self.tasks.lock().await;
            let Some(task) = tasks.get_mut(id) else {
                warn!("start requested for unknown task {}", id);
                return false;
            };
            if task.status != TaskStatus::Pending {
                debug!("task {} not startable from {}", id, task.status);
                return false;
            }
            task.status = TaskStatus::Running;
            task.message = "Transcription running".to_string();
            task.updated_at = Utc::now();
            (
                RunRequest {
                    task_id: task.id.clone(),
                    input_path: task.input_path.clone(),
                    options: task.options.clone(),
                },
                task.cancel.clone(),
                Arc::new(RegistrySink {
                    registry: Arc::clone(&self),
                    task_id: task.id.clone(),
                }) as Arc<dyn ProgressSink>,
            )
        };

        let registry = Arc::clone(&self);
        let runner = Arc::clone(&self.runner);
        let task_id = id.to_string();
        tokio::spawn(async move {
            let outcome = runner.run(req, cancel, sink).await;
            registry.finish(&task_id, outcome).await;
        });
        info!("started task {}", id);
        true
    }

    /// Raise the cancellation signal of a running task. Returns immediately;
    /// completion of the cancellation is observed through status or events.
    pub async fn cancel_task(&self, id: &str) -> bool {
        let tasks = self.tasks.lock().await;
        match tasks.get(id) {
            Some(task) if task.status == TaskStatus::Running => {
                info!("cancellation requested for task {}", id);
                task.cancel.cancel();
                true
            }
            Some(task) => {
                // A cancel that lost the race against completion is a no-op.
                debug!("ignoring cancel for task {} in state {}", id, task.status);
                false
            }
            None => {
                warn!("cancel requested for unknown task {}", id);
                false
            }
        }
    }

    pub async fn get_task(&self, id: &str) -> Option<TaskView> {
        self.tasks.lock().await.get(id).map(Task::view)
    }

    /// Current snapshot plus a receiver over the task's ordered event queue,
    /// taken atomically so no event between the two can be missed.
    pub async fn subscribe(&self, id: &str) -> Option<(TaskView, broadcast::Receiver<TaskEvent>)> {
        let tasks = self.tasks.lock().await;
        tasks.get(id).map(|task| (task.view(), task.events.subscribe()))
    }

    async fn update_progress(&self, id: &str, progress: u8, message: String) {
        let mut tasks = self.tasks.lock().await;
        let Some(task) = tasks.get_mut(id) else { return };
        if task.status != TaskStatus::Running {
            return;
        }
        // Progress never goes backwards within a run.
        task.progress = task.progress.max(progress);
        task.message = message.clone();
        task.updated_at = Utc::now();
        // Sent while holding the lock, so subscribers observe a task's
        // updates in emission order.
        let _ = task.events.send(TaskEvent::Progress {
            task_id: task.id.clone(),
            progress: task.progress,
            message,
        });
    }

    /// Apply a runner outcome. Only a `Running` task can transition, which
    /// makes the terminal transition happen exactly once.
    async fn finish(&self, id: &str, outcome: RunOutcome) {
        let (event, callback_url) = {
            let mut tasks = self.tasks.lock().await;
            let Some(task) = tasks.get_mut(id) else {
                debug!("outcome for task {} arrived after eviction", id);
                return;
            };
            if task.status != TaskStatus::Running {
                warn!("discarding outcome for task {} in terminal state {}", id, task.status);
                return;
            }
            let event = match outcome {
                RunOutcome::Completed(result) => {
                    task.status = TaskStatus::Completed;
                    task.progress = 100;
                    task.message = "Transcription completed".to_string();
                    task.result = Some(result.clone());
                    info!("task {} completed with {} segments", id, result.segments.len());
                    TaskEvent::Completed {
                        task_id: task.id.clone(),
                        text: result.text,
                        segments: result.segments,
                    }
                }
                RunOutcome::Cancelled => {
                    task.status = TaskStatus::Cancelled;
                    task.message = "Transcription cancelled".to_string();
                    info!("task {} cancelled", id);
                    TaskEvent::Cancelled { task_id: task.id.clone() }
                }
                RunOutcome::Failed(error) => {
                    task.status = TaskStatus::Failed;
                    task.message = format!("Task failed: {}", error);
                    task.error = Some(error.clone());
                    error!("task {} failed: {}", id, error);
                    TaskEvent::Failed {
                        task_id: task.id.clone(),
                        error,
                    }
                }
            };
            task.updated_at = Utc::now();
            let _ = task.events.send(event.clone());
            (event, task.options.callback_url.clone())
        };

        // Webhook delivery stays outside the lock and never feeds back into
        // task state.
        if let Some(url) = callback_url {
            let callback = HttpCallback::new(url);
            if let Err(e) = callback.deliver(&event).await {
                warn!("callback delivery failed for task {}: {}", id, e);
            }
        }
    }

    /// Remove tasks that reached a terminal state more than `max_age_secs`
    /// ago. Driven by a periodic housekeeping loop.
    pub async fn evict_terminal(&self, max_age_secs: i64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::seconds(max_age_secs);
        let mut tasks = self.tasks.lock().await;
        let expired: Vec<String> = tasks
            .values()
            .filter(|t| t.status.is_terminal() && t.updated_at < cutoff)
            .map(|t| t.id.clone())
            .collect();
        let count = expired.len();
        for id in expired {
            tasks.remove(&id);
            info!("evicted terminal task {}", id);
        }
        count
    }

    pub async fn stats(&self) -> TaskStats {
        let tasks = self.tasks.lock().await;
        let mut stats = TaskStats::default();
        for task in tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TaskStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub failed: usize,
}
