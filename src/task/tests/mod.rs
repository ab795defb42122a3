use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::task::events::TaskEvent;
use crate::task::registry::{RegistryConfig, TaskRegistry};
use crate::task::runner::{ProgressSink, RunOutcome, RunRequest, TaskRunner};
use crate::task::types::{Segment, TaskStatus, TaskView, TranscribeOptions, TranscriptionResult};

enum FakeBehavior {
    Complete,
    Fail,
    RunUntilCancelled,
}

/// Stands in for the whisper runner: no process is launched, and every run
/// attempt is counted so tests can assert nothing was spawned.
struct FakeRunner {
    behavior: FakeBehavior,
    spawned: AtomicUsize,
}

impl FakeRunner {
    fn new(behavior: FakeBehavior) -> Arc<Self> {
        Arc::new(Self { behavior, spawned: AtomicUsize::new(0) })
    }

    fn spawn_count(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskRunner for FakeRunner {
    async fn run(
        &self,
        _req: RunRequest,
        cancel: CancellationToken,
        sink: Arc<dyn ProgressSink>,
    ) -> RunOutcome {
        self.spawned.fetch_add(1, Ordering::SeqCst);
        sink.update(0, "Transcription started".to_string()).await;
        match self.behavior {
            FakeBehavior::Complete => {
                sink.update(50, "Transcribing: 50% complete".to_string()).await;
                sink.update(100, "Transcription completed".to_string()).await;
                RunOutcome::Completed(TranscriptionResult {
                    text: "[00:00:00.000 --> 00:00:01.000] hello".to_string(),
                    segments: vec![Segment { start: 0.0, end: 1.0, text: "hello".to_string() }],
                })
            }
            FakeBehavior::Fail => RunOutcome::Failed("whisper exited with code 1: boom".to_string()),
            FakeBehavior::RunUntilCancelled => {
                cancel.cancelled().await;
                RunOutcome::Cancelled
            }
        }
    }
}

fn registry_with(behavior: FakeBehavior, capacity: usize) -> (Arc<TaskRegistry>, Arc<FakeRunner>) {
    let runner = FakeRunner::new(behavior);
    let registry = Arc::new(TaskRegistry::new(runner.clone(), RegistryConfig { capacity }));
    (registry, runner)
}

fn temp_input() -> NamedTempFile {
    tempfile::Builder::new()
        .suffix(".wav")
        .tempfile()
        .expect("temp input file")
}

async fn wait_for_terminal(registry: &TaskRegistry, id: &str) -> TaskView {
    for _ in 0..100 {
        if let Some(view) = registry.get_task(id).await {
            if view.status.is_terminal() {
                return view;
            }
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("task {} did not reach a terminal state", id);
}

#[tokio::test]
async fn complete_task_lifecycle() {
    let (registry, runner) = registry_with(FakeBehavior::Complete, 10);
    let input = temp_input();

    let view = registry
        .create_task(input.path().to_path_buf(), TranscribeOptions::default(), None)
        .await
        .unwrap();
    assert_eq!(view.status, TaskStatus::Pending);
    assert_eq!(view.progress, 0);

    assert!(registry.clone().start_task(&view.id).await);

    let done = wait_for_terminal(&registry, &view.id).await;
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.progress, 100);
    assert!(done.result.is_some());
    assert!(done.error.is_none());
    assert_eq!(runner.spawn_count(), 1);
}

#[tokio::test]
async fn missing_input_fails_without_spawning() {
    let (registry, runner) = registry_with(FakeBehavior::Complete, 10);

    let view = registry
        .create_task(
            PathBuf::from("/no/such/input.wav"),
            TranscribeOptions::default(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(view.status, TaskStatus::Failed);
    assert!(view.error.unwrap().contains("does not exist"));
    assert!(view.result.is_none());

    // A failed-at-creation task is terminal and can never be started.
    assert!(!registry.clone().start_task(&view.id).await);
    sleep(Duration::from_millis(20)).await;
    assert_eq!(runner.spawn_count(), 0);
}

#[tokio::test]
async fn cancel_running_task() {
    let (registry, _runner) = registry_with(FakeBehavior::RunUntilCancelled, 10);
    let input = temp_input();

    let view = registry
        .create_task(input.path().to_path_buf(), TranscribeOptions::default(), None)
        .await
        .unwrap();
    assert!(registry.clone().start_task(&view.id).await);
    sleep(Duration::from_millis(20)).await;

    assert!(registry.cancel_task(&view.id).await);

    let done = wait_for_terminal(&registry, &view.id).await;
    assert_eq!(done.status, TaskStatus::Cancelled);
    assert!(done.result.is_none());
    assert!(done.error.is_none());
}

#[tokio::test]
async fn cancel_is_idempotent_while_running() {
    let (registry, _runner) = registry_with(FakeBehavior::RunUntilCancelled, 10);
    let input = temp_input();

    let view = registry
        .create_task(input.path().to_path_buf(), TranscribeOptions::default(), None)
        .await
        .unwrap();
    assert!(registry.clone().start_task(&view.id).await);
    sleep(Duration::from_millis(20)).await;

    // Both requests race the supervisor's observation of the token; at least
    // the first lands while the task is still Running.
    assert!(registry.cancel_task(&view.id).await);
    registry.cancel_task(&view.id).await;

    let done = wait_for_terminal(&registry, &view.id).await;
    assert_eq!(done.status, TaskStatus::Cancelled);
}

#[tokio::test]
async fn cancel_after_completion_is_ignored() {
    let (registry, _runner) = registry_with(FakeBehavior::Complete, 10);
    let input = temp_input();

    let view = registry
        .create_task(input.path().to_path_buf(), TranscribeOptions::default(), None)
        .await
        .unwrap();
    assert!(registry.clone().start_task(&view.id).await);
    let done = wait_for_terminal(&registry, &view.id).await;
    assert_eq!(done.status, TaskStatus::Completed);

    // The process already finished: the cancel request loses the race and
    // the terminal state stays Completed.
    assert!(!registry.cancel_task(&view.id).await);
    let after = registry.get_task(&view.id).await.unwrap();
    assert_eq!(after.status, TaskStatus::Completed);
    assert!(after.result.is_some());
}

#[tokio::test]
async fn failed_run_records_error() {
    let (registry, _runner) = registry_with(FakeBehavior::Fail, 10);
    let input = temp_input();

    let view = registry
        .create_task(input.path().to_path_buf(), TranscribeOptions::default(), None)
        .await
        .unwrap();
    assert!(registry.clone().start_task(&view.id).await);

    let done = wait_for_terminal(&registry, &view.id).await;
    assert_eq!(done.status, TaskStatus::Failed);
    assert!(done.error.unwrap().contains("code 1"));
    assert!(done.result.is_none());
}

#[tokio::test]
async fn start_is_exclusive() {
    let (registry, runner) = registry_with(FakeBehavior::RunUntilCancelled, 10);
    let input = temp_input();

    let view = registry
        .create_task(input.path().to_path_buf(), TranscribeOptions::default(), None)
        .await
        .unwrap();
    assert!(registry.clone().start_task(&view.id).await);
    assert!(!registry.clone().start_task(&view.id).await);
    assert!(!registry.clone().start_task("task-unknown").await);

    sleep(Duration::from_millis(20)).await;
    assert_eq!(runner.spawn_count(), 1);
    registry.cancel_task(&view.id).await;
}

#[tokio::test]
async fn duplicate_explicit_id_is_rejected() {
    let (registry, _runner) = registry_with(FakeBehavior::Complete, 10);
    let input = temp_input();

    registry
        .create_task(
            input.path().to_path_buf(),
            TranscribeOptions::default(),
            Some("task-dup".to_string()),
        )
        .await
        .unwrap();
    let second = registry
        .create_task(
            input.path().to_path_buf(),
            TranscribeOptions::default(),
            Some("task-dup".to_string()),
        )
        .await;
    assert!(second.is_err());
}

#[tokio::test]
async fn capacity_evicts_oldest_task() {
    let (registry, _runner) = registry_with(FakeBehavior::Complete, 2);
    let input = temp_input();

    let mut ids = Vec::new();
    for _ in 0..3 {
        let view = registry
            .create_task(input.path().to_path_buf(), TranscribeOptions::default(), None)
            .await
            .unwrap();
        ids.push(view.id);
        // distinct creation timestamps for a deterministic eviction order
        sleep(Duration::from_millis(5)).await;
    }

    assert!(registry.get_task(&ids[0]).await.is_none());
    assert!(registry.get_task(&ids[1]).await.is_some());
    assert!(registry.get_task(&ids[2]).await.is_some());
}

#[tokio::test]
async fn eviction_cancels_a_running_task() {
    let (registry, _runner) = registry_with(FakeBehavior::RunUntilCancelled, 1);
    let input = temp_input();

    let first = registry
        .create_task(input.path().to_path_buf(), TranscribeOptions::default(), None)
        .await
        .unwrap();
    assert!(registry.clone().start_task(&first.id).await);
    sleep(Duration::from_millis(20)).await;

    let second = registry
        .create_task(input.path().to_path_buf(), TranscribeOptions::default(), None)
        .await
        .unwrap();

    assert!(registry.get_task(&first.id).await.is_none());
    assert!(registry.get_task(&second.id).await.is_some());
}

#[tokio::test]
async fn terminal_tasks_are_evicted_after_retention() {
    let (registry, _runner) = registry_with(FakeBehavior::Complete, 10);
    let input = temp_input();

    let view = registry
        .create_task(input.path().to_path_buf(), TranscribeOptions::default(), None)
        .await
        .unwrap();
    assert!(registry.clone().start_task(&view.id).await);
    wait_for_terminal(&registry, &view.id).await;

    // still within the retention window
    assert_eq!(registry.evict_terminal(3600).await, 0);

    sleep(Duration::from_millis(20)).await;
    assert_eq!(registry.evict_terminal(0).await, 1);
    assert!(registry.get_task(&view.id).await.is_none());
}

#[tokio::test]
async fn pending_tasks_survive_terminal_eviction() {
    let (registry, _runner) = registry_with(FakeBehavior::Complete, 10);
    let input = temp_input();

    let view = registry
        .create_task(input.path().to_path_buf(), TranscribeOptions::default(), None)
        .await
        .unwrap();
    sleep(Duration::from_millis(20)).await;
    assert_eq!(registry.evict_terminal(0).await, 0);
    assert!(registry.get_task(&view.id).await.is_some());
}

#[tokio::test]
async fn events_arrive_in_order_with_one_terminal() {
    let (registry, _runner) = registry_with(FakeBehavior::Complete, 10);
    let input = temp_input();

    let view = registry
        .create_task(input.path().to_path_buf(), TranscribeOptions::default(), None)
        .await
        .unwrap();
    let (snapshot, mut rx) = registry.subscribe(&view.id).await.unwrap();
    assert_eq!(snapshot.status, TaskStatus::Pending);

    assert!(registry.clone().start_task(&view.id).await);

    let mut progress_seen = Vec::new();
    let mut terminal_events = 0;
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event stream stalled");
        match event {
            Ok(TaskEvent::Progress { progress, .. }) => progress_seen.push(progress),
            Ok(TaskEvent::Completed { text, segments, .. }) => {
                terminal_events += 1;
                assert!(!text.is_empty());
                assert_eq!(segments.len(), 1);
                break;
            }
            Ok(other) => panic!("unexpected terminal event: {:?}", other),
            Err(e) => panic!("event stream closed early: {}", e),
        }
    }

    assert_eq!(terminal_events, 1);
    // progress forms a non-decreasing sequence
    assert!(progress_seen.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress_seen);
    assert_eq!(progress_seen.last(), Some(&100));
}

#[tokio::test]
async fn progress_never_decreases() {
    struct Backwards;

    #[async_trait]
    impl TaskRunner for Backwards {
        async fn run(
            &self,
            _req: RunRequest,
            _cancel: CancellationToken,
            sink: Arc<dyn ProgressSink>,
        ) -> RunOutcome {
            sink.update(60, "Transcribing: 60% complete".to_string()).await;
            // a stale lower value must not win
            sink.update(40, "Transcribing: 40% complete".to_string()).await;
            RunOutcome::Completed(TranscriptionResult { text: String::new(), segments: vec![] })
        }
    }

    let registry = Arc::new(TaskRegistry::new(Arc::new(Backwards), RegistryConfig::default()));
    let input = temp_input();

    let view = registry
        .create_task(input.path().to_path_buf(), TranscribeOptions::default(), None)
        .await
        .unwrap();
    let (_, mut rx) = registry.subscribe(&view.id).await.unwrap();
    assert!(registry.clone().start_task(&view.id).await);
    wait_for_terminal(&registry, &view.id).await;

    let mut last = 0;
    while let Ok(event) = rx.try_recv() {
        if let TaskEvent::Progress { progress, .. } = event {
            assert!(progress >= last, "progress went backwards: {} -> {}", last, progress);
            last = progress;
        }
    }
    assert_eq!(last, 60);
}

#[tokio::test]
async fn stats_reflect_task_states() {
    let (registry, _runner) = registry_with(FakeBehavior::Complete, 10);
    let input = temp_input();

    let pending = registry
        .create_task(input.path().to_path_buf(), TranscribeOptions::default(), None)
        .await
        .unwrap();
    let done = registry
        .create_task(input.path().to_path_buf(), TranscribeOptions::default(), None)
        .await
        .unwrap();
    registry
        .create_task(PathBuf::from("/no/such/file.wav"), TranscribeOptions::default(), None)
        .await
        .unwrap();

    assert!(registry.clone().start_task(&done.id).await);
    wait_for_terminal(&registry, &done.id).await;

    let stats = registry.stats().await;
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.running, 0);

    // keep the pending task alive until the end of the assertions
    assert!(registry.get_task(&pending.id).await.is_some());
}
