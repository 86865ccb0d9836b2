use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_std::channel::Sender;
use core_types::cancel::CancellationToken;
use core_types::events::ToolEvent;

use crate::error::ToolRunnerError;
use crate::{run_tool, run_tool_with_throughput, ToolExit, ToolInvocation};

/// Trait for external tool execution.
///
/// Abstracts the process runner so pipelines can be tested without spawning
/// real processes.
#[async_trait::async_trait]
pub trait ToolRunnerOps: Send + Sync {
    /// Run the tool to completion, streaming its output as events.
    async fn run(
        &self,
        invocation: &ToolInvocation,
        events: Option<Sender<ToolEvent>>,
        token: &CancellationToken,
    ) -> Result<ToolExit, ToolRunnerError>;

    /// Run the tool while sampling the output file's growth for throughput
    /// telemetry.
    async fn run_with_throughput(
        &self,
        invocation: &ToolInvocation,
        watch_path: &Path,
        poll_interval: Duration,
        events: Option<Sender<ToolEvent>>,
        token: &CancellationToken,
    ) -> Result<ToolExit, ToolRunnerError>;
}

/// Default implementation that spawns real processes.
pub struct DefaultToolRunnerOps;

#[async_trait::async_trait]
impl ToolRunnerOps for DefaultToolRunnerOps {
    async fn run(
        &self,
        invocation: &ToolInvocation,
        events: Option<Sender<ToolEvent>>,
        token: &CancellationToken,
    ) -> Result<ToolExit, ToolRunnerError> {
        run_tool(invocation, events, token).await
    }

    async fn run_with_throughput(
        &self,
        invocation: &ToolInvocation,
        watch_path: &Path,
        poll_interval: Duration,
        events: Option<Sender<ToolEvent>>,
        token: &CancellationToken,
    ) -> Result<ToolExit, ToolRunnerError> {
        run_tool_with_throughput(invocation, watch_path, poll_interval, events, token).await
    }
}

/// A recorded call to the tool runner, for test assertions.
#[derive(Debug, Clone)]
pub struct ToolRunCall {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub watch_path: Option<PathBuf>,
}

/// Mock runner that records calls and simulates exits without spawning
/// processes. By default every call succeeds with exit code 0.
#[derive(Clone, Default)]
pub struct MockToolRunnerOps {
    error: Option<ToolRunnerError>,
    fail_when_arg_contains: Option<(String, i32)>,
    create_output_on_run: bool,
    calls: Arc<Mutex<Vec<ToolRunCall>>>,
}

impl MockToolRunnerOps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with the given runner error.
    pub fn with_error(error: ToolRunnerError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    /// Calls whose arguments contain `needle` exit with `code`; all other
    /// calls succeed.
    pub fn failing_when_arg_contains(needle: impl Into<String>, code: i32) -> Self {
        Self {
            fail_when_arg_contains: Some((needle.into(), code)),
            ..Default::default()
        }
    }

    /// Successful `run_with_throughput` calls write a marker file at the
    /// watch path, simulating a tool that produced its output.
    pub fn create_output_on_run(mut self) -> Self {
        self.create_output_on_run = true;
        self
    }

    pub fn calls(&self) -> Vec<ToolRunCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, invocation: &ToolInvocation, watch_path: Option<&Path>) {
        self.calls.lock().unwrap().push(ToolRunCall {
            program: invocation.program.clone(),
            args: invocation
                .args
                .iter()
                .map(|a| a.to_string_lossy().to_string())
                .collect(),
            watch_path: watch_path.map(Path::to_path_buf),
        });
    }

    fn simulate(
        &self,
        invocation: &ToolInvocation,
        token: &CancellationToken,
    ) -> Result<ToolExit, ToolRunnerError> {
        if token.is_cancelled() {
            return Err(ToolRunnerError::Cancelled);
        }
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        if let Some((needle, code)) = &self.fail_when_arg_contains {
            let matched = invocation
                .args
                .iter()
                .any(|a| a.to_string_lossy().contains(needle.as_str()));
            if matched {
                return Ok(ToolExit { code: Some(*code) });
            }
        }
        Ok(ToolExit { code: Some(0) })
    }
}

#[async_trait::async_trait]
impl ToolRunnerOps for MockToolRunnerOps {
    async fn run(
        &self,
        invocation: &ToolInvocation,
        _events: Option<Sender<ToolEvent>>,
        token: &CancellationToken,
    ) -> Result<ToolExit, ToolRunnerError> {
        self.record(invocation, None);
        self.simulate(invocation, token)
    }

    async fn run_with_throughput(
        &self,
        invocation: &ToolInvocation,
        watch_path: &Path,
        _poll_interval: Duration,
        events: Option<Sender<ToolEvent>>,
        token: &CancellationToken,
    ) -> Result<ToolExit, ToolRunnerError> {
        self.record(invocation, Some(watch_path));
        let result = self.simulate(invocation, token);
        if let Ok(exit) = &result {
            if exit.success() && self.create_output_on_run {
                if let Err(e) = std::fs::write(watch_path, b"converted") {
                    tracing::warn!("Mock runner could not write output: {}", e);
                }
            }
            if let Some(tx) = &events {
                let _ = tx
                    .send(ToolEvent::Throughput {
                        bytes_per_second: 0.0,
                    })
                    .await;
            }
        }
        result
    }
}
