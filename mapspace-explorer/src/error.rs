use mapspace_workload::{MemOperand, WorkloadError};
use thiserror::Error;

/// Errors raised while building or draining the exploration pipeline
#[derive(Error, Debug)]
pub enum ExploreError {
    #[error(transparent)]
    Workload(#[from] WorkloadError),

    /// A layer cannot be mapped to an array it has not been placed on
    #[error("layer {layer} has no core allocation")]
    NoCoreAllocation { layer: usize },

    #[error("accelerator {accelerator} has no core {id}")]
    UnknownCore { accelerator: String, id: usize },

    #[error("core {core} has no memory level holding operand {operand}")]
    NoMemoryLevel { core: usize, operand: MemOperand },

    #[error("invalid explorer configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}

pub type Result<T, E = ExploreError> = std::result::Result<T, E>;
