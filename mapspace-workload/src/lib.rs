pub mod ids;
pub mod error;
pub mod sizes;
pub mod mapping;
pub mod relevance;
pub mod layer;
pub mod graph;
pub mod factory;

pub use error::{Result, WorkloadError};
pub use factory::{LayerNodeFactory, LayerSpec, MappingFactory, MappingSpec, WorkloadFactory};
pub use graph::{DummyNode, Workload, WorkloadNode, WorkloadSource};
pub use ids::{LayerDim, LayerOperand, MemOperand, OADimension, OperandRole};
pub use layer::{LayerAttrs, LayerNode, LayerPadding, OperandInfo};
pub use mapping::{MappingSingleOADim, SpatialMapping, SpatialMappingHint};
pub use relevance::{LoopRelevance, Relevancy};
pub use sizes::LayerDimSizes;
