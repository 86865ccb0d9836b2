use thiserror::Error;
use tool_runner::error::ToolRunnerError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractError {
    #[error("Unsupported container format: {0}")]
    UnsupportedContainer(String),
    #[error("No supported image file found after extraction")]
    NoTargetFound,
    #[error("Required tool is not available: {0}")]
    ToolUnavailable(String),
    #[error("Extraction tool exited with status {0:?}")]
    ToolExecutionFailed(Option<i32>),
    #[error("Tool reported success but produced no output file")]
    OutputMissing,
    #[error("Archive error: {0}")]
    ArchiveError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Operation was cancelled")]
    Cancelled,
}

impl From<ToolRunnerError> for ExtractError {
    fn from(err: ToolRunnerError) -> Self {
        match err {
            ToolRunnerError::ToolUnavailable(tool) => ExtractError::ToolUnavailable(tool),
            ToolRunnerError::Cancelled => ExtractError::Cancelled,
            ToolRunnerError::IoError(message) => ExtractError::IoError(message),
        }
    }
}
