use auto_impl::auto_impl;
use mapspace_workload::{LayerNode, WorkloadSource};
use std::collections::BTreeSet;

use crate::hardware::Core;

/// Decides which layers the workload walk leaves out
#[auto_impl(&, Box, Arc)]
pub trait SkipPolicy {
    fn skip(&self, layer: &LayerNode, core: &Core, source: WorkloadSource) -> bool;
}

/// In-memory compute arrays execute some data movement operators for free.
///
/// Those layers are skipped on such cores, unless the workload came from a
/// structural source that already encodes every operator explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryComputeSkip {
    pe_type: String,
    operators: BTreeSet<String>,
}

impl InMemoryComputeSkip {
    pub const PE_TYPE: &'static str = "in_sram_computing";

    pub fn new<S: Into<String>>(pe_type: &str, operators: impl IntoIterator<Item = S>) -> Self {
        InMemoryComputeSkip { pe_type: pe_type.to_owned(), operators: operators.into_iter().map(Into::into).collect() }
    }
}

impl Default for InMemoryComputeSkip {
    fn default() -> Self { InMemoryComputeSkip::new(Self::PE_TYPE, ["Pooling", "Add"]) }
}

impl SkipPolicy for InMemoryComputeSkip {
    fn skip(&self, layer: &LayerNode, core: &Core, source: WorkloadSource) -> bool {
        source != WorkloadSource::Structural
            && core.operational_array.pe_type() == Some(self.pe_type.as_str())
            && layer.layer_type().is_some_and(|t| self.operators.contains(t))
    }
}

/// Visit every layer
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverSkip;

impl SkipPolicy for NeverSkip {
    fn skip(&self, _: &LayerNode, _: &Core, _: WorkloadSource) -> bool { false }
}
