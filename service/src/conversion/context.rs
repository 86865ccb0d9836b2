use std::path::PathBuf;
use std::sync::Arc;

use async_std::channel::Sender;
use container_extract::ops::{DefaultExtractOps, ExtractOps};
use core_types::WorkItem;
use core_types::cancel::CancellationToken;
use core_types::events::{BatchEvent, ToolEvent};
use image_descriptor::{DefaultDescriptorResolver, DescriptorOps};
use tool_runner::ops::{DefaultToolRunnerOps, ToolRunnerOps};

use crate::file_system_ops::{FileSystemOps, StdFileSystemOps};
use crate::settings::ConversionSettings;

/// The swappable dependencies of one conversion.
#[derive(Clone)]
pub struct ConversionOps {
    pub fs_ops: Arc<dyn FileSystemOps>,
    pub tool_runner_ops: Arc<dyn ToolRunnerOps>,
    pub extract_ops: Arc<dyn ExtractOps>,
    pub descriptor_ops: Arc<dyn DescriptorOps>,
}

impl ConversionOps {
    pub fn production() -> Self {
        Self {
            fs_ops: Arc::new(StdFileSystemOps),
            tool_runner_ops: Arc::new(DefaultToolRunnerOps),
            extract_ops: Arc::new(DefaultExtractOps::new()),
            descriptor_ops: Arc::new(DefaultDescriptorResolver),
        }
    }
}

pub struct ConversionContext {
    pub item: WorkItem,
    pub settings: Arc<ConversionSettings>,
    pub ops: ConversionOps,
    pub token: CancellationToken,
    pub batch_tx: Option<Sender<BatchEvent>>,
    pub tool_tx: Option<Sender<ToolEvent>>,
    /// Staging directory created for this item, if any. Removed on every
    /// outcome by the owning service.
    pub staging_dir: Option<PathBuf>,
    /// The file actually handed to the converter.
    pub staged_input: Option<PathBuf>,
    /// True once the converter may have started writing the target, so a
    /// failed item's partial output can be removed.
    pub target_started: bool,
}

impl ConversionContext {
    pub fn new(
        item: WorkItem,
        settings: Arc<ConversionSettings>,
        ops: ConversionOps,
        token: CancellationToken,
        batch_tx: Option<Sender<BatchEvent>>,
        tool_tx: Option<Sender<ToolEvent>>,
    ) -> Self {
        Self {
            item,
            settings,
            ops,
            token,
            batch_tx,
            tool_tx,
            staging_dir: None,
            staged_input: None,
            target_started: false,
        }
    }

    pub async fn log(&self, line: impl Into<String>) {
        if let Some(tx) = &self.batch_tx {
            let _ = tx.send(BatchEvent::Log { line: line.into() }).await;
        }
    }
}
