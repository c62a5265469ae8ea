//! Spatial mapping exploration over a workload graph.
//!
//! [`WorkloadStage`] walks the layers, [`SpatialMappingPipeline`] enumerates the
//! candidate spatial mappings of each layer and hands every candidate to a
//! downstream [`LayerPipeline`] that evaluates it.

pub mod error;
pub mod config;
pub mod hardware;
pub mod generator;
pub mod diagonal;
pub mod policy;
pub mod stage;

#[cfg(test)]
mod testing;

pub use config::ExplorerConfig;
pub use diagonal::{adapt_for_diagonal_mapping, Adaptation};
pub use error::{ExploreError, Result};
pub use generator::{SpatialMappingGenerator, UserSpatialMappingGenerator};
pub use hardware::{Accelerator, Core, MemoryHierarchy, MemoryInstance, MemoryLevel, OperationalArray, PortAllocation};
pub use policy::{InMemoryComputeSkip, NeverSkip, SkipPolicy};
pub use stage::{Evaluation, LayerPipeline, SpatialMappingGeneratorStage, SpatialMappingPipeline, StageIter, WorkloadStage};
