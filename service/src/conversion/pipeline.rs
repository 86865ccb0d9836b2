use crate::conversion::context::ConversionContext;
use crate::conversion::steps::{CommitStep, ConvertStep, StageInputStep};
use crate::pipeline::generic_pipeline::Pipeline;

impl Pipeline<ConversionContext> {
    pub fn new() -> Self {
        Self::with_steps(vec![
            Box::new(StageInputStep),
            Box::new(ConvertStep),
            Box::new(CommitStep),
        ])
    }
}

impl Default for Pipeline<ConversionContext> {
    fn default() -> Self {
        Self::new()
    }
}
