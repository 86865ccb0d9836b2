use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_std::channel::Sender;
use async_std::task;

use core_types::cancel::CancellationToken;
use core_types::events::{BatchEvent, ToolEvent};
use core_types::{OUTPUT_EXTENSION, SourceKind, WorkItem, lowercase_extension};
use utils::file_util;

use crate::batch::{BatchCounters, BatchSummary, ItemProcessor};
use crate::conversion::context::ConversionOps;
use crate::conversion::service::ConversionService;
use crate::error::Error;
use crate::file_system_ops::{FileSystemOps, StdFileSystemOps};
use crate::settings::{ConversionSettings, VerificationSettings};
use crate::verification::service::{VerificationOps, VerificationService};

/// Enumerates the work set, fans it out to pipeline instances under a
/// bounded worker pool, aggregates counters and emits batch telemetry.
pub struct BatchScheduler {
    fs_ops: Arc<dyn FileSystemOps>,
}

struct DispatchOptions {
    parallel: bool,
    worker_count: usize,
    smallest_first: bool,
}

impl BatchScheduler {
    pub fn new() -> Self {
        Self {
            fs_ops: Arc::new(StdFileSystemOps),
        }
    }

    pub fn new_with_ops(fs_ops: Arc<dyn FileSystemOps>) -> Self {
        Self { fs_ops }
    }

    /// Convert every supported file directly under `root`.
    ///
    /// The converter's presence is checked once up front; missing optional
    /// tools are surfaced as log events before any item runs, and again
    /// per item when it actually fails.
    pub async fn run_conversion(
        &self,
        root: &Path,
        settings: Arc<ConversionSettings>,
        ops: ConversionOps,
        token: CancellationToken,
        events: Option<Sender<BatchEvent>>,
    ) -> Result<BatchSummary, Error> {
        if !self.fs_ops.exists(&settings.tools.converter) {
            return Err(Error::DependencyMissing(
                settings.tools.converter.display().to_string(),
            ));
        }

        let items = self.discover_conversion_items(root, &settings)?;
        self.surface_missing_optional_tools(&items, &settings, &events)
            .await;

        let options = DispatchOptions {
            parallel: settings.parallel,
            worker_count: settings.worker_count,
            smallest_first: settings.smallest_first,
        };
        let processor: Arc<dyn ItemProcessor> =
            Arc::new(ConversionService::new_with_ops(settings, ops));
        self.dispatch(root, items, processor, options, token, events)
            .await
    }

    /// Verify every output-format file under `root`, optionally recursing
    /// into subdirectories.
    pub async fn run_verification(
        &self,
        root: &Path,
        settings: Arc<VerificationSettings>,
        ops: VerificationOps,
        token: CancellationToken,
        events: Option<Sender<BatchEvent>>,
    ) -> Result<BatchSummary, Error> {
        if !self.fs_ops.exists(&settings.tools.converter) {
            return Err(Error::DependencyMissing(
                settings.tools.converter.display().to_string(),
            ));
        }

        let items = self.discover_verification_items(root, settings.recursive)?;
        let options = DispatchOptions {
            parallel: settings.parallel,
            worker_count: settings.worker_count,
            smallest_first: false,
        };
        let processor: Arc<dyn ItemProcessor> =
            Arc::new(VerificationService::new_with_ops(settings, ops));
        self.dispatch(root, items, processor, options, token, events)
            .await
    }

    fn discover_conversion_items(
        &self,
        root: &Path,
        settings: &ConversionSettings,
    ) -> Result<Vec<WorkItem>, Error> {
        let entries = self
            .fs_ops
            .read_dir(root)
            .map_err(|e| Error::IoError(format!("Failed reading {}: {}", root.display(), e)))?;

        let mut items = Vec::new();
        for entry in entries {
            if !entry.is_file {
                continue;
            }
            let Some(kind) = SourceKind::classify(&entry.path) else {
                continue;
            };
            let size_bytes = self.fs_ops.file_size(&entry.path).unwrap_or(0);
            let stem = entry
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let target = settings
                .output_dir
                .join(format!("{}.{}", stem, OUTPUT_EXTENSION));
            items.push(WorkItem {
                source: entry.path,
                kind,
                target,
                size_bytes,
            });
        }
        tracing::info!(count = items.len(), root = %root.display(), "Discovered conversion work set");
        Ok(items)
    }

    fn discover_verification_items(
        &self,
        root: &Path,
        recursive: bool,
    ) -> Result<Vec<WorkItem>, Error> {
        let entries = if recursive {
            self.fs_ops.read_dir_recursive(root)
        } else {
            self.fs_ops.read_dir(root)
        }
        .map_err(|e| Error::IoError(format!("Failed reading {}: {}", root.display(), e)))?;

        let mut items = Vec::new();
        for entry in entries {
            if !entry.is_file || !file_util::has_extension(&entry.path, &[OUTPUT_EXTENSION]) {
                continue;
            }
            let size_bytes = self.fs_ops.file_size(&entry.path).unwrap_or(0);
            items.push(WorkItem {
                source: entry.path.clone(),
                kind: SourceKind::PlainImage,
                target: entry.path,
                size_bytes,
            });
        }
        tracing::info!(count = items.len(), root = %root.display(), "Discovered verification work set");
        Ok(items)
    }

    async fn surface_missing_optional_tools(
        &self,
        items: &[WorkItem],
        settings: &ConversionSettings,
        events: &Option<Sender<BatchEvent>>,
    ) {
        let needs_decompressor = items
            .iter()
            .any(|i| i.kind == SourceKind::CompressedContainer);
        if needs_decompressor && !self.tool_present(settings.tools.decompressor.as_deref()) {
            let line =
                "Decompressor is not available; compressed containers will fail".to_string();
            tracing::warn!("{}", line);
            send_event(events, BatchEvent::Log { line }).await;
        }

        let needs_seven_zip = items.iter().any(|i| {
            i.kind == SourceKind::Archive
                && matches!(
                    lowercase_extension(&i.source).as_deref(),
                    Some("7z") | Some("rar")
                )
        });
        if needs_seven_zip && !self.tool_present(settings.tools.seven_zip.as_deref()) {
            let line = "7z is not available; 7z/RAR archives will fail".to_string();
            tracing::warn!("{}", line);
            send_event(events, BatchEvent::Log { line }).await;
        }
    }

    fn tool_present(&self, tool: Option<&Path>) -> bool {
        tool.map(|p| self.fs_ops.exists(p)).unwrap_or(false)
    }

    async fn dispatch(
        &self,
        root: &Path,
        mut items: Vec<WorkItem>,
        processor: Arc<dyn ItemProcessor>,
        options: DispatchOptions,
        token: CancellationToken,
        events: Option<Sender<BatchEvent>>,
    ) -> Result<BatchSummary, Error> {
        if options.smallest_first {
            items.sort_by_key(|item| item.size_bytes);
        }
        let total = items.len();
        let started = Instant::now();
        let counters = Arc::new(BatchCounters::new());

        send_event(&events, BatchEvent::BatchStarted { total }).await;
        let (tool_tx, forwarder) = spawn_tool_event_forwarder(&events);

        if options.parallel && total > 1 {
            let (work_tx, work_rx) = flume::unbounded::<WorkItem>();
            for item in items {
                let _ = work_tx.send(item);
            }
            drop(work_tx);

            let workers: Vec<_> = (0..options.worker_count.max(1))
                .map(|_| {
                    let work_rx = work_rx.clone();
                    let processor = processor.clone();
                    let counters = counters.clone();
                    let token = token.clone();
                    let events = events.clone();
                    let tool_tx = tool_tx.clone();
                    let root = root.to_path_buf();
                    task::spawn(async move {
                        while let Ok(item) = work_rx.recv_async().await {
                            if token.is_cancelled() {
                                break;
                            }
                            process_item(
                                &processor, &item, &root, &counters, total, &token, &events,
                                &tool_tx,
                            )
                            .await;
                        }
                    })
                })
                .collect();
            for worker in workers {
                worker.await;
            }
        } else {
            for item in &items {
                if token.is_cancelled() {
                    break;
                }
                process_item(
                    &processor, item, root, &counters, total, &token, &events, &tool_tx,
                )
                .await;
            }
        }

        drop(tool_tx);
        if let Some(handle) = forwarder {
            handle.await;
        }

        // The throughput display drops to zero once the batch stops.
        send_event(
            &events,
            BatchEvent::Throughput {
                bytes_per_second: 0.0,
            },
        )
        .await;

        let summary = BatchSummary {
            total,
            succeeded: counters.succeeded(),
            failed: counters.failed(),
            elapsed: started.elapsed(),
        };
        send_event(
            &events,
            BatchEvent::BatchCompleted {
                total,
                succeeded: summary.succeeded,
                failed: summary.failed,
            },
        )
        .await;
        tracing::info!(
            total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Batch finished"
        );

        if token.is_cancelled() {
            return Err(Error::OperationCancelled);
        }
        Ok(summary)
    }
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn process_item(
    processor: &Arc<dyn ItemProcessor>,
    item: &WorkItem,
    root: &Path,
    counters: &BatchCounters,
    total: usize,
    token: &CancellationToken,
    events: &Option<Sender<BatchEvent>>,
    tool_tx: &Option<Sender<ToolEvent>>,
) {
    let file_name = item.file_name();
    send_event(
        events,
        BatchEvent::ItemStarted {
            file_name: file_name.clone(),
        },
    )
    .await;

    let processed = match processor.process(item, root, token, events, tool_tx).await {
        Ok(()) => {
            tracing::info!(file = %file_name, "Item completed");
            counters.record_success()
        }
        Err(Error::OperationCancelled) => {
            // An aborted in-flight item counts neither way.
            tracing::info!(file = %file_name, "Item cancelled");
            return;
        }
        Err(e) => {
            tracing::error!(file = %file_name, error = %e, "Item failed");
            send_event(
                events,
                BatchEvent::Log {
                    line: format!("Failed {}: {}", file_name, e),
                },
            )
            .await;
            counters.record_failure()
        }
    };

    let percent = if total == 0 {
        100.0
    } else {
        processed as f32 / total as f32 * 100.0
    };
    send_event(
        events,
        BatchEvent::Progress {
            processed,
            total,
            file_name,
            phase: processor.phase(),
            percent,
        },
    )
    .await;
}

fn spawn_tool_event_forwarder(
    events: &Option<Sender<BatchEvent>>,
) -> (Option<Sender<ToolEvent>>, Option<task::JoinHandle<()>>) {
    let Some(batch_tx) = events else {
        return (None, None);
    };
    let (tool_tx, tool_rx) = async_std::channel::unbounded::<ToolEvent>();
    let batch_tx = batch_tx.clone();
    let handle = task::spawn(async move {
        while let Ok(event) = tool_rx.recv().await {
            let mapped = match event {
                ToolEvent::OutputLine { line } | ToolEvent::ErrorLine { line } => {
                    BatchEvent::Log { line }
                }
                ToolEvent::ToolProgress { percent } => BatchEvent::ToolProgress { percent },
                ToolEvent::Throughput { bytes_per_second } => {
                    BatchEvent::Throughput { bytes_per_second }
                }
            };
            if batch_tx.send(mapped).await.is_err() {
                break;
            }
        }
    });
    (Some(tool_tx), Some(handle))
}

async fn send_event(events: &Option<Sender<BatchEvent>>, event: BatchEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}
