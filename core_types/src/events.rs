use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Events produced while one external tool invocation is running.
#[derive(Debug, Clone)]
pub enum ToolEvent {
    OutputLine { line: String },
    ErrorLine { line: String },
    /// Percentage parsed from the tool's own progress lines, display only.
    ToolProgress { percent: f32 },
    /// Output-file write rate over the last polling interval. A final zero
    /// sample is emitted once the process exits.
    Throughput { bytes_per_second: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum BatchPhase {
    #[strum(serialize = "Converting")]
    Converting,
    #[strum(serialize = "Verifying")]
    Verifying,
}

/// One-way batch telemetry consumed by the shell. Fire-and-forget; the core
/// never expects a reply.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    BatchStarted {
        total: usize,
    },
    ItemStarted {
        file_name: String,
    },
    Log {
        line: String,
    },
    /// Re-emitted tool progress percentage for the currently running tool.
    ToolProgress {
        percent: f32,
    },
    Throughput {
        bytes_per_second: f64,
    },
    /// Emitted on every item completion; reflects completion order under
    /// parallel dispatch.
    Progress {
        processed: usize,
        total: usize,
        file_name: String,
        phase: BatchPhase,
        percent: f32,
    },
    BatchCompleted {
        total: usize,
        succeeded: usize,
        failed: usize,
    },
}
