pub mod events;
pub mod registry;
pub mod runner;
pub mod types;

#[cfg(test)]
mod tests;

pub use events::{HttpCallback, TaskCallback, TaskEvent};
pub use registry::{RegistryConfig, TaskRegistry, TaskStats};
pub use runner::{ProgressSink, RunOutcome, RunRequest, TaskRunner};
pub use types::{
    Segment, Task, TaskKind, TaskStatus, TaskView, TimeRange, TranscribeOptions,
    TranscriptionResult,
};
