use crate::engine::CompositionError;
use crate::substrate::OperationError;

/// Failure that aborts a statement subtree
///
/// Propagates unchanged through enclosing sequences and parallels; nothing
/// inside the interpreter recovers from it.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error("run cancelled")]
    Cancelled,

    #[error("parallel branch {index} terminated abnormally")]
    BranchPanicked { index: usize },
}

impl ExecutionError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutionError::Cancelled)
    }
}
