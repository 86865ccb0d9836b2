use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_std::channel::Sender;
use core_types::WorkItem;
use core_types::cancel::CancellationToken;
use core_types::events::{BatchEvent, BatchPhase, ToolEvent};

use crate::batch::ItemProcessor;
use crate::conversion::context::{ConversionContext, ConversionOps};
use crate::error::Error;
use crate::pipeline::generic_pipeline::Pipeline;
use crate::settings::ConversionSettings;

/// Bounded wait for staging cleanup so a stuck filesystem cannot block
/// shutdown.
const CLEANUP_DEADLINE: Duration = Duration::from_secs(2);

pub struct ConversionService {
    settings: Arc<ConversionSettings>,
    ops: ConversionOps,
}

impl std::fmt::Debug for ConversionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionService").finish_non_exhaustive()
    }
}

impl ConversionService {
    pub fn new(settings: Arc<ConversionSettings>) -> Self {
        Self::new_with_ops(settings, ConversionOps::production())
    }

    pub fn new_with_ops(settings: Arc<ConversionSettings>, ops: ConversionOps) -> Self {
        Self { settings, ops }
    }

    /// Convert one discovered item end to end.
    ///
    /// The item's staging directory is removed on every outcome, and a
    /// failed or cancelled conversion never leaves a partial output behind.
    /// The original source survives every failure; it is only deleted by a
    /// successful conversion when `delete_source` is set.
    pub async fn convert_one(
        &self,
        item: WorkItem,
        token: CancellationToken,
        batch_tx: Option<Sender<BatchEvent>>,
        tool_tx: Option<Sender<ToolEvent>>,
    ) -> Result<(), Error> {
        let mut context = ConversionContext::new(
            item,
            self.settings.clone(),
            self.ops.clone(),
            token,
            batch_tx,
            tool_tx,
        );
        let pipeline = Pipeline::<ConversionContext>::new();
        let result = pipeline.execute(&mut context).await;
        self.finalize(&context, &result);
        result
    }

    fn finalize(&self, context: &ConversionContext, result: &Result<(), Error>) {
        if result.is_err()
            && context.target_started
            && context.ops.fs_ops.exists(&context.item.target)
        {
            if let Err(e) = context.ops.fs_ops.remove_file(&context.item.target) {
                tracing::warn!(
                    "Failed to delete partial output {}: {}",
                    context.item.target.display(),
                    e
                );
            }
        }

        if let Some(staging_dir) = &context.staging_dir {
            if let Err(e) = context
                .ops
                .fs_ops
                .remove_dir_all(staging_dir, Some(CLEANUP_DEADLINE))
            {
                tracing::warn!(
                    "Failed to remove staging directory {}: {}",
                    staging_dir.display(),
                    e
                );
            }
        }
    }
}

#[async_trait::async_trait]
impl ItemProcessor for ConversionService {
    fn phase(&self) -> BatchPhase {
        BatchPhase::Converting
    }

    async fn process(
        &self,
        item: &WorkItem,
        _root: &Path,
        token: &CancellationToken,
        batch_tx: &Option<Sender<BatchEvent>>,
        tool_tx: &Option<Sender<ToolEvent>>,
    ) -> Result<(), Error> {
        self.convert_one(
            item.clone(),
            token.clone(),
            batch_tx.clone(),
            tool_tx.clone(),
        )
        .await
    }
}
