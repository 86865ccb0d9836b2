use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_std::channel::Sender;
use core_types::cancel::CancellationToken;
use core_types::events::{BatchEvent, BatchPhase, ToolEvent};
use core_types::{ConvertMode, WorkItem};
use tool_runner::ToolInvocation;
use tool_runner::ops::{DefaultToolRunnerOps, ToolRunnerOps};

use crate::batch::ItemProcessor;
use crate::error::Error;
use crate::file_system_ops::{FileSystemOps, StdFileSystemOps};
use crate::settings::VerificationSettings;

/// The swappable dependencies of one verification.
#[derive(Clone)]
pub struct VerificationOps {
    pub fs_ops: Arc<dyn FileSystemOps>,
    pub tool_runner_ops: Arc<dyn ToolRunnerOps>,
}

impl VerificationOps {
    pub fn production() -> Self {
        Self {
            fs_ops: Arc::new(StdFileSystemOps),
            tool_runner_ops: Arc::new(DefaultToolRunnerOps),
        }
    }
}

pub struct VerificationService {
    settings: Arc<VerificationSettings>,
    ops: VerificationOps,
}

impl std::fmt::Debug for VerificationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationService").finish_non_exhaustive()
    }
}

impl VerificationService {
    pub fn new(settings: Arc<VerificationSettings>) -> Self {
        Self::new_with_ops(settings, VerificationOps::production())
    }

    pub fn new_with_ops(settings: Arc<VerificationSettings>, ops: VerificationOps) -> Self {
        Self { settings, ops }
    }

    /// Verify one output file with the external tool; exit code 0 means
    /// valid. Depending on the settings, the file is then moved into the
    /// success or failed tree, mirroring its subpath relative to the scan
    /// root. An occupied destination skips the move without failing.
    pub async fn verify_one(
        &self,
        file: &Path,
        scan_root: &Path,
        token: &CancellationToken,
        batch_tx: &Option<Sender<BatchEvent>>,
        tool_tx: Option<Sender<ToolEvent>>,
    ) -> Result<bool, Error> {
        if token.is_cancelled() {
            return Err(Error::OperationCancelled);
        }

        let invocation = ToolInvocation::new(&self.settings.tools.converter)
            .arg(ConvertMode::Verify.as_arg())
            .arg("-i")
            .arg(file.as_os_str());

        let exit = self
            .ops
            .tool_runner_ops
            .run(&invocation, tool_tx, token)
            .await?;
        let valid = exit.success();
        tracing::info!(file = %file.display(), valid, "Verified");

        if valid {
            if let Some(success_root) = &self.settings.success_root {
                self.move_preserving_subpath(file, scan_root, success_root, batch_tx)
                    .await?;
            }
        } else if let Some(failed_root) = &self.settings.failed_root {
            self.move_preserving_subpath(file, scan_root, failed_root, batch_tx)
                .await?;
        }

        Ok(valid)
    }

    async fn move_preserving_subpath(
        &self,
        file: &Path,
        scan_root: &Path,
        dest_root: &Path,
        batch_tx: &Option<Sender<BatchEvent>>,
    ) -> Result<(), Error> {
        let relative: PathBuf = match file.strip_prefix(scan_root) {
            Ok(rel) => rel.to_path_buf(),
            Err(_) => file.file_name().map(PathBuf::from).unwrap_or_default(),
        };
        let dest = dest_root.join(relative);

        if self.ops.fs_ops.exists(&dest) {
            tracing::info!("Skipping move, {} already exists", dest.display());
            if let Some(tx) = batch_tx {
                let _ = tx
                    .send(BatchEvent::Log {
                        line: format!("Skipping move, {} already exists", dest.display()),
                    })
                    .await;
            }
            return Ok(());
        }

        self.ops
            .fs_ops
            .move_file(file, &dest)
            .map_err(|e| Error::IoError(format!("Failed moving {}: {}", file.display(), e)))
    }
}

#[async_trait::async_trait]
impl ItemProcessor for VerificationService {
    fn phase(&self) -> BatchPhase {
        BatchPhase::Verifying
    }

    async fn process(
        &self,
        item: &WorkItem,
        root: &Path,
        token: &CancellationToken,
        batch_tx: &Option<Sender<BatchEvent>>,
        tool_tx: &Option<Sender<ToolEvent>>,
    ) -> Result<(), Error> {
        match self
            .verify_one(&item.source, root, token, batch_tx, tool_tx.clone())
            .await
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(Error::ToolExecutionFailed(format!(
                "Verification failed for {}",
                item.file_name()
            ))),
            Err(e) => Err(e),
        }
    }
}
