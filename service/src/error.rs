use std::fmt::{Display, Formatter, Result};

use container_extract::error::ExtractError;
use image_descriptor::DescriptorError;
use tool_runner::error::ToolRunnerError;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    DependencyMissing(String),
    StagingFailed(String),
    ToolExecutionFailed(String),
    OutputMissing(String),
    UnsupportedContainer(String),
    NoTargetFound(String),
    ParseError(String),
    IoError(String),
    InvalidInput(String),
    OperationCancelled,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Error::DependencyMissing(message) => {
                write!(f, "Required external tool is missing: {}", message)
            }
            Error::StagingFailed(message) => write!(f, "Staging failed: {}", message),
            Error::ToolExecutionFailed(message) => {
                write!(f, "Tool execution failed: {}", message)
            }
            Error::OutputMissing(message) => write!(f, "Output missing: {}", message),
            Error::UnsupportedContainer(message) => {
                write!(f, "Unsupported container: {}", message)
            }
            Error::NoTargetFound(message) => write!(f, "No target found: {}", message),
            Error::ParseError(message) => write!(f, "Parse error: {}", message),
            Error::IoError(message) => write!(f, "IO error: {}", message),
            Error::InvalidInput(message) => write!(f, "Invalid input: {}", message),
            Error::OperationCancelled => write!(f, "Operation was cancelled"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}

impl From<ToolRunnerError> for Error {
    fn from(err: ToolRunnerError) -> Self {
        match err {
            ToolRunnerError::ToolUnavailable(tool) => Error::DependencyMissing(tool),
            ToolRunnerError::Cancelled => Error::OperationCancelled,
            ToolRunnerError::IoError(message) => Error::IoError(message),
        }
    }
}

impl From<ExtractError> for Error {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::UnsupportedContainer(format) => Error::UnsupportedContainer(format),
            ExtractError::NoTargetFound => {
                Error::NoTargetFound("No supported image file found in archive".to_string())
            }
            ExtractError::ToolUnavailable(tool) => Error::DependencyMissing(tool),
            ExtractError::ToolExecutionFailed(code) => {
                Error::StagingFailed(format!("Extraction tool exited with status {:?}", code))
            }
            ExtractError::OutputMissing => {
                Error::OutputMissing("Decompressor reported success but produced no file".to_string())
            }
            ExtractError::ArchiveError(message) => Error::StagingFailed(message),
            ExtractError::IoError(message) => Error::StagingFailed(message),
            ExtractError::Cancelled => Error::OperationCancelled,
        }
    }
}

impl From<DescriptorError> for Error {
    fn from(err: DescriptorError) -> Self {
        Error::ParseError(err.to_string())
    }
}
