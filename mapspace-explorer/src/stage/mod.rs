//! # Stage pipeline
//!
//! A chain of lazy, pull-based stages. Each stage is launched with the hardware
//! and the layer it works on and hands out `(result, extra)` pairs one at a time.
//! Nothing runs ahead of the consumer: dropping an iterator stops the exploration.
//!
//! ```text
//! WorkloadStage                  (result, (layer, (mapping, extra)))
//!   -> SpatialMappingPipeline    (result, (mapping, extra))
//!     -> downstream pipeline     (result, extra)
//! ```
//!
//! The first `Err` ends the sequence it appears in.

mod spatial;
pub use spatial::*;
mod workload;
pub use workload::*;

use auto_impl::auto_impl;
use mapspace_workload::LayerNode;
use std::sync::Arc;

use crate::error::{ExploreError, Result};
use crate::hardware::Accelerator;

pub type StageIter<'a, R, X> = Box<dyn Iterator<Item = Result<(R, X), ExploreError>> + 'a>;

/// Result of evaluating one mapping. It remembers the accelerator it was evaluated on.
#[auto_impl(&mut, Box)]
pub trait Evaluation {
    fn accelerator(&self) -> &Arc<Accelerator>;
    fn set_accelerator(&mut self, accelerator: Arc<Accelerator>);
}

/// Stages below a given point of the chain, seen as one unit
#[auto_impl(&, Box, Arc)]
pub trait LayerPipeline {
    type Output;
    type Extra;

    fn launch<'a>(&'a self, accelerator: Arc<Accelerator>, layer: Arc<LayerNode>) -> Result<StageIter<'a, Self::Output, Self::Extra>>;
}
