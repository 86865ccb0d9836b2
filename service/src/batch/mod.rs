use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_std::channel::Sender;
use core_types::WorkItem;
use core_types::cancel::CancellationToken;
use core_types::events::{BatchEvent, BatchPhase, ToolEvent};

use crate::error::Error;

pub mod scheduler;

/// Monotonic batch counters, safe to bump from concurrent pipelines.
#[derive(Debug, Default)]
pub struct BatchCounters {
    processed: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

impl BatchCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one successful item; returns the new processed total.
    pub fn record_success(&self) -> usize {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
        self.processed.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Count one failed item; returns the new processed total.
    pub fn record_failure(&self) -> usize {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.processed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

/// One batch item handler: a conversion or a verification, run end to end.
///
/// Per-item errors are returned to the scheduler, which logs and counts
/// them; only cancellation stops the batch.
#[async_trait::async_trait]
pub trait ItemProcessor: Send + Sync {
    fn phase(&self) -> BatchPhase;

    async fn process(
        &self,
        item: &WorkItem,
        root: &Path,
        token: &CancellationToken,
        batch_tx: &Option<Sender<BatchEvent>>,
        tool_tx: &Option<Sender<ToolEvent>>,
    ) -> Result<(), Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let counters = BatchCounters::new();
        assert_eq!(counters.record_success(), 1);
        assert_eq!(counters.record_failure(), 2);
        assert_eq!(counters.record_success(), 3);
        assert_eq!(counters.succeeded(), 2);
        assert_eq!(counters.failed(), 1);
        assert_eq!(counters.processed(), 3);
    }
}
