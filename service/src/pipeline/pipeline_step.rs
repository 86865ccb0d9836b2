use crate::error::Error;

/// The action to take after a step completes.
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    /// Continue to the next step
    Continue,
    /// Skip all remaining steps (successful early exit)
    Skip,
    /// Abort the pipeline with an error
    Abort(Error),
}

/// One stage of a per-item pipeline.
///
/// Each step receives a mutable reference to the item's context, can read
/// and update shared state there, and returns a [`StepAction`] to control
/// pipeline flow.
#[async_trait::async_trait]
pub trait PipelineStep<T>: Send + Sync {
    /// Returns the name of this step for logging and debugging.
    fn name(&self) -> &'static str;

    /// Determines if this step should execute based on current context.
    /// Steps that return `false` are skipped without affecting the
    /// pipeline flow.
    fn should_execute(&self, _context: &T) -> bool {
        true
    }

    /// Execute the step, modifying the context and returning the next action.
    async fn execute(&self, context: &mut T) -> StepAction;
}
