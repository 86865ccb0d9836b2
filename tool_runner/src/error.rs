use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolRunnerError {
    #[error("Tool not available: {0}")]
    ToolUnavailable(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Operation was cancelled")]
    Cancelled,
}
