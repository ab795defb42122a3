use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::task::runner::ProgressSink;
use crate::task::types::TranscriptionResult;

mod command;
mod kill;
pub mod parser;

pub use command::{resolve_executable, WhisperCommand};

/// Minimum interval between throttled progress emissions.
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);
/// Bounded wait for the stderr reader once the process has exited; after
/// this it is abandoned rather than blocking shutdown.
const STDERR_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub enum ProcessOutcome {
    Completed(TranscriptionResult),
    Cancelled,
    Failed(String),
}

/// Rate limit for progress updates. The 0, 90 and 100 milestones always
/// pass; everything else is limited to one emission per interval.
struct ProgressGate {
    last_emit: Option<Instant>,
    interval: Duration,
}

impl ProgressGate {
    fn new(interval: Duration) -> Self {
        Self { last_emit: None, interval }
    }

    fn admit(&mut self, progress: u8) -> bool {
        if matches!(progress, 0 | 90 | 100) {
            self.last_emit = Some(Instant::now());
            return true;
        }
        match self.last_emit {
            Some(last) if last.elapsed() < self.interval => false,
            _ => {
                self.last_emit = Some(Instant::now());
                true
            }
        }
    }
}

/// Run one transcription process to completion, cancellation, or failure.
///
/// stderr is drained by its own task so a full pipe can never stall the
/// stdout loop. Every exit path leaves no process behind: cancellation kills
/// the whole process group, and `kill_on_drop` backstops panics.
pub async fn run_process(
    mut command: Command,
    total_duration: f64,
    cancel: &CancellationToken,
    sink: &dyn ProgressSink,
) -> ProcessOutcome {
    let program = command.as_std().get_program().to_string_lossy().to_string();
    command.stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => return ProcessOutcome::Failed(format!("failed to launch {}: {}", program, e)),
    };
    info!("{} started (pid {:?})", program, child.id());

    let stderr = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        let mut collected = String::new();
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("whisper stderr: {}", line);
                collected.push_str(&line);
                collected.push('\n');
            }
        }
        collected
    });

    let Some(stdout) = child.stdout.take() else {
        kill::terminate_tree(&mut child).await;
        return ProcessOutcome::Failed("failed to capture whisper stdout".to_string());
    };
    let mut stdout_lines = BufReader::new(stdout).lines();

    sink.update(0, "Transcription started".to_string()).await;

    let mut raw_output = String::new();
    let mut gate = ProgressGate::new(PROGRESS_INTERVAL);
    let mut was_cancelled = false;

    loop {
        // stdout is polled before the cancel branch: a process that reached
        // EOF before the cancellation check wins with its exit code, and a
        // late cancel request is ignored (the cancel/exit tie-break).
        tokio::select! {
            biased;
            read = stdout_lines.next_line() => {
                match read {
                    Ok(Some(line)) => {
                        if let Some(segment) = parser::parse_segment_line(&line) {
                            let progress = parser::progress_percent(segment.start, total_duration);
                            if gate.admit(progress) {
                                sink.update(progress, format!("Transcribing: {}% complete", progress)).await;
                            }
                        }
                        raw_output.push_str(&line);
                        raw_output.push('\n');
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("error reading whisper stdout: {}", e);
                        break;
                    }
                }
            }
            _ = cancel.cancelled() => {
                info!("cancellation observed, terminating process tree");
                kill::terminate_tree(&mut child).await;
                was_cancelled = true;
                break;
            }
        }
    }

    if was_cancelled {
        let _ = timeout(STDERR_JOIN_TIMEOUT, stderr_task).await;
        return ProcessOutcome::Cancelled;
    }

    let status = match child.wait().await {
        Ok(status) => status,
        Err(e) => {
            kill::terminate_tree(&mut child).await;
            return ProcessOutcome::Failed(format!("failed to wait for process: {}", e));
        }
    };

    let stderr_text = match timeout(STDERR_JOIN_TIMEOUT, stderr_task).await {
        Ok(Ok(text)) => text,
        _ => {
            warn!("stderr reader did not finish in time, abandoning it");
            String::new()
        }
    };

    if !status.success() {
        let code = status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "terminated by signal".to_string());
        return ProcessOutcome::Failed(format!(
            "process exited with code {}: {}",
            code,
            stderr_text.trim()
        ));
    }

    sink.update(90, "Processing transcription results".to_string()).await;
    let segments = parser::collect_segments(&raw_output, total_duration);
    sink.update(100, "Transcription completed".to_string()).await;

    ProcessOutcome::Completed(TranscriptionResult {
        text: raw_output.trim().to_string(),
        segments,
    })
}
