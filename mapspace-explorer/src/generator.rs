use auto_impl::auto_impl;
use itertools::Itertools;
use log::debug;
use mapspace_workload::{LayerDim, LayerNode, MappingSingleOADim, OADimension, SpatialMapping};
use std::collections::BTreeSet;

use crate::hardware::Core;

/// Source of complete spatial mapping candidates for one layer on one core.
///
/// Every yielded mapping has an entry for each array axis of the core and never
/// unrolls an axis beyond its size. The sequence is finite; calling again restarts it.
#[auto_impl(&, Box, Arc)]
pub trait SpatialMappingGenerator {
    fn enumerate<'g>(
        &'g self,
        layer: &LayerNode,
        core: &Core,
        provided: &SpatialMapping,
        mix: bool,
    ) -> Box<dyn Iterator<Item = SpatialMapping> + 'g>;
}

/// Completes the user mapping axis by axis, then combines the axes lazily.
/// With `maximize_hardware_utilization` only the complete mappings unrolling the most
/// points in total are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserSpatialMappingGenerator {
    maximize_hardware_utilization: bool,
}

impl UserSpatialMappingGenerator {
    pub fn new(maximize_hardware_utilization: bool) -> Self {
        UserSpatialMappingGenerator { maximize_hardware_utilization }
    }

    fn axis_candidates(&self, layer: &LayerNode, oa_dim: &OADimension, capacity: u32, taken: &BTreeSet<LayerDim>, mix: bool) -> Vec<MappingSingleOADim> {
        let size_of = |d: &LayerDim| layer.dim_sizes().get(d).unwrap_or(1).min(u32::MAX as u64) as u32;
        let capacity = capacity.max(1);
        let pool: Vec<LayerDim> = match layer.spatial_mapping_hint().get(oa_dim) {
            Some(hint) => hint.iter().filter(|d| size_of(d) > 1).cloned().collect(),
            None => layer.dim_sizes().loop_dims().cloned().collect(),
        };
        let pool: Vec<LayerDim> = pool.into_iter().filter(|d| !taken.contains(d)).collect();
        let mut out: Vec<MappingSingleOADim> = pool.iter()
            .map(|d| MappingSingleOADim::new().with(d.clone(), size_of(d).min(capacity)))
            .collect();
        if mix {
            for pair in pool.iter().permutations(2) {
                let first = size_of(pair[0]).min(capacity);
                let second = size_of(pair[1]).min(capacity / first);
                if second > 1 {
                    out.push(MappingSingleOADim::new().with(pair[0].clone(), first).with(pair[1].clone(), second));
                }
            }
        }
        out.retain(|m| !m.is_empty());
        out = out.into_iter().unique().collect();
        // an idle axis keeps layers with fewer loop dims than axes mappable
        out.push(MappingSingleOADim::new());
        out
    }
}

impl Default for UserSpatialMappingGenerator {
    fn default() -> Self { UserSpatialMappingGenerator::new(true) }
}

// points unrolled by a complete mapping over the whole array
fn utilization(sm: &SpatialMapping) -> u64 {
    sm.iter().map(|(_, m)| m.utilization()).product()
}

// dataflow entry of a core, restricted to what the layer can unroll
fn clip_to_layer(layer: &LayerNode, fixed: &MappingSingleOADim) -> MappingSingleOADim {
    fixed.iter().fold(MappingSingleOADim::new(), |m, (d, u)| {
        let size = layer.dim_sizes().get(d).unwrap_or(1).min(u32::MAX as u64) as u32;
        m.with(d.clone(), u.min(size))
    })
}

impl SpatialMappingGenerator for UserSpatialMappingGenerator {
    fn enumerate<'g>(
        &'g self,
        layer: &LayerNode,
        core: &Core,
        provided: &SpatialMapping,
        mix: bool,
    ) -> Box<dyn Iterator<Item = SpatialMapping> + 'g> {
        let array = &core.operational_array;
        let taken = provided.layer_dims();
        let mut axes = Vec::new();
        let mut per_axis = Vec::new();
        for oa_dim in array.dimensions() {
            let candidates = if let Some(fixed) = provided.get(oa_dim) {
                vec![fixed.clone()]
            } else if let Some(fixed) = core.dataflows.as_ref().and_then(|df| df.get(oa_dim)) {
                vec![clip_to_layer(layer, fixed)]
            } else {
                let capacity = array.size(oa_dim).unwrap_or(1);
                self.axis_candidates(layer, oa_dim, capacity, &taken, mix)
            };
            debug!("{} candidate(s) on {oa_dim} for {layer}", candidates.len());
            axes.push(oa_dim.clone());
            per_axis.push(candidates);
        }
        let complete = per_axis.into_iter()
            .map(|c| c.into_iter())
            .multi_cartesian_product()
            .filter(|combo| {
                // one loop dimension lives on one axis only
                let mut seen = BTreeSet::new();
                combo.iter().flat_map(|m| m.dims()).all(|d| seen.insert(d.clone()))
            })
            .map(move |combo| axes.iter().cloned().zip(combo).fold(SpatialMapping::empty(), |sm, (a, m)| sm.with(a, m)));
        if !self.maximize_hardware_utilization {
            return Box::new(complete);
        }
        // first pass finds the best utilization, the second one only yields mappings reaching it
        let best = complete.clone().map(|sm| utilization(&sm)).max().unwrap_or(1);
        debug!("Best spatial utilization for {layer}: {best}");
        Box::new(complete.filter(move |sm| utilization(sm) == best))
    }
}
