use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_process::{Child, Command};
use async_std::channel::Sender;
use async_std::io::BufReader;
use async_std::prelude::*;
use async_std::task;

use core_types::cancel::CancellationToken;
use core_types::events::ToolEvent;

use error::ToolRunnerError;
use progress::parse_progress_percent;

pub mod error;
pub mod ops;
pub mod progress;

/// How often the wait loop wakes up to check for cancellation and exit.
const POLL_TICK: Duration = Duration::from_millis(100);

/// One external tool call: program, arguments and optional working directory.
/// The spawned process handle is owned exclusively by the runner and is
/// killed and reaped on every exit path.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Exit state of a finished tool process. `code` is `None` when the process
/// was terminated by a signal. The exit code is the sole success signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolExit {
    pub code: Option<i32>,
}

impl ToolExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Run an external tool to completion with line-buffered capture of its
/// output and error streams.
///
/// Every stdout line is forwarded as [`ToolEvent::OutputLine`]; stderr lines
/// are forwarded as [`ToolEvent::ErrorLine`] unless they carry a recognizable
/// progress percentage, in which case [`ToolEvent::ToolProgress`] is emitted
/// instead. Stderr text is diagnostic only and never a failure signal.
///
/// If the cancellation token fires while the process is alive, the process
/// is killed, reaped and `ToolRunnerError::Cancelled` is returned.
pub async fn run_tool(
    invocation: &ToolInvocation,
    events: Option<Sender<ToolEvent>>,
    token: &CancellationToken,
) -> Result<ToolExit, ToolRunnerError> {
    run_internal(invocation, None, events, token).await
}

/// As [`run_tool`], but additionally samples the length of `watch_path` once
/// per `poll_interval` while the process is alive and emits the write rate as
/// [`ToolEvent::Throughput`]. A final zero sample is emitted once the process
/// exits.
pub async fn run_tool_with_throughput(
    invocation: &ToolInvocation,
    watch_path: &Path,
    poll_interval: Duration,
    events: Option<Sender<ToolEvent>>,
    token: &CancellationToken,
) -> Result<ToolExit, ToolRunnerError> {
    let watch = (watch_path.to_path_buf(), poll_interval);
    run_internal(invocation, Some(watch), events, token).await
}

async fn run_internal(
    invocation: &ToolInvocation,
    watch: Option<(PathBuf, Duration)>,
    events: Option<Sender<ToolEvent>>,
    token: &CancellationToken,
) -> Result<ToolExit, ToolRunnerError> {
    tracing::debug!(
        program = %invocation.program.display(),
        args = ?invocation.args,
        "Starting external tool"
    );

    let mut child = spawn(invocation)?;

    let stdout_task = child
        .stdout
        .take()
        .map(|out| forward_lines(out, events.clone(), false));
    let stderr_task = child
        .stderr
        .take()
        .map(|err| forward_lines(err, events.clone(), true));

    let result = wait_for_exit(&mut child, watch, &events, token).await;

    // Pipes close when the process ends or is killed, so these finish.
    if let Some(handle) = stdout_task {
        handle.await;
    }
    if let Some(handle) = stderr_task {
        handle.await;
    }

    result
}

fn spawn(invocation: &ToolInvocation) -> Result<Child, ToolRunnerError> {
    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = &invocation.working_dir {
        command.current_dir(dir);
    }

    command.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            ToolRunnerError::ToolUnavailable(invocation.program.display().to_string())
        }
        _ => ToolRunnerError::IoError(format!(
            "Failed to start {}: {}",
            invocation.program.display(),
            e
        )),
    })
}

fn forward_lines<R>(
    reader: R,
    events: Option<Sender<ToolEvent>>,
    is_stderr: bool,
) -> task::JoinHandle<()>
where
    R: async_std::io::Read + Unpin + Send + 'static,
{
    task::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            tracing::trace!(stderr = is_stderr, line = %line, "Tool output");
            let Some(tx) = &events else { continue };
            let event = if is_stderr {
                match parse_progress_percent(&line) {
                    Some(percent) => ToolEvent::ToolProgress { percent },
                    None => ToolEvent::ErrorLine { line },
                }
            } else {
                ToolEvent::OutputLine { line }
            };
            if tx.send(event).await.is_err() {
                break;
            }
        }
    })
}

async fn wait_for_exit(
    child: &mut Child,
    watch: Option<(PathBuf, Duration)>,
    events: &Option<Sender<ToolEvent>>,
    token: &CancellationToken,
) -> Result<ToolExit, ToolRunnerError> {
    let mut last_len = watch.as_ref().map(|(path, _)| file_len(path)).unwrap_or(0);
    let mut last_sample = Instant::now();

    loop {
        if token.is_cancelled() {
            tracing::warn!("Cancellation requested, killing external tool");
            kill_and_reap(child).await;
            return Err(ToolRunnerError::Cancelled);
        }

        match child.try_status() {
            Ok(Some(status)) => {
                if watch.is_some() {
                    send_event(
                        events,
                        ToolEvent::Throughput {
                            bytes_per_second: 0.0,
                        },
                    )
                    .await;
                }
                return Ok(ToolExit {
                    code: status.code(),
                });
            }
            Ok(None) => {}
            Err(e) => {
                kill_and_reap(child).await;
                return Err(ToolRunnerError::IoError(format!(
                    "Failed to poll tool status: {}",
                    e
                )));
            }
        }

        if let Some((path, interval)) = &watch {
            let elapsed = last_sample.elapsed();
            if elapsed >= *interval {
                let len = file_len(path);
                let rate = len.saturating_sub(last_len) as f64 / elapsed.as_secs_f64();
                send_event(
                    events,
                    ToolEvent::Throughput {
                        bytes_per_second: rate,
                    },
                )
                .await;
                last_len = len;
                last_sample = Instant::now();
            }
        }

        task::sleep(POLL_TICK).await;
    }
}

fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

async fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::warn!("Failed to kill external tool: {}", e);
    }
    let _ = child.status().await;
}

async fn send_event(events: &Option<Sender<ToolEvent>>, event: ToolEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_std::channel::unbounded;

    #[async_std::test]
    async fn test_run_tool_captures_output_lines() {
        let (tx, rx) = unbounded();
        let token = CancellationToken::new();
        let invocation = ToolInvocation::new("echo").arg("hello");

        let exit = run_tool(&invocation, Some(tx), &token).await.unwrap();
        assert!(exit.success());

        let mut saw_hello = false;
        while let Ok(event) = rx.try_recv() {
            if let ToolEvent::OutputLine { line } = event {
                if line == "hello" {
                    saw_hello = true;
                }
            }
        }
        assert!(saw_hello);
    }

    #[async_std::test]
    async fn test_missing_binary_reports_tool_unavailable() {
        let token = CancellationToken::new();
        let invocation = ToolInvocation::new("/nonexistent/converter-binary");
        let result = run_tool(&invocation, None, &token).await;
        assert!(matches!(result, Err(ToolRunnerError::ToolUnavailable(_))));
    }

    #[async_std::test]
    async fn test_nonzero_exit_code_is_reported() {
        let token = CancellationToken::new();
        let invocation = ToolInvocation::new("sh").arg("-c").arg("exit 3");
        let exit = run_tool(&invocation, None, &token).await.unwrap();
        assert!(!exit.success());
        assert_eq!(exit.code, Some(3));
    }

    #[async_std::test]
    async fn test_cancellation_kills_running_tool() {
        let token = CancellationToken::new();
        let canceller = {
            let token = token.clone();
            task::spawn(async move {
                task::sleep(Duration::from_millis(300)).await;
                token.cancel();
            })
        };

        let start = Instant::now();
        let invocation = ToolInvocation::new("sleep").arg("30");
        let result = run_tool(&invocation, None, &token).await;
        canceller.await;

        assert!(matches!(result, Err(ToolRunnerError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[async_std::test]
    async fn test_throughput_ends_with_zero_sample() {
        let temp_dir = tempfile::tempdir().unwrap();
        let out_path = temp_dir.path().join("out.bin");
        let (tx, rx) = unbounded();
        let token = CancellationToken::new();

        let script = format!("printf converted > '{}'", out_path.display());
        let invocation = ToolInvocation::new("sh").arg("-c").arg(script);
        let exit = run_tool_with_throughput(
            &invocation,
            &out_path,
            Duration::from_millis(50),
            Some(tx),
            &token,
        )
        .await
        .unwrap();
        assert!(exit.success());

        let mut samples = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ToolEvent::Throughput { bytes_per_second } = event {
                samples.push(bytes_per_second);
            }
        }
        assert!(!samples.is_empty());
        assert_eq!(*samples.last().unwrap(), 0.0);
    }
}
