//! Memory resizing for diagonal (overlapping) spatial unrolls.
//!
//! When a weight-stationary layer unrolls dimensions the weights do not depend on
//! (`OX`, `OY` of a convolution) along the axis its activation register file
//! broadcasts to, that register file has to hold one window per unrolled position.
//! The adapter scales exactly that memory by the product of those unroll factors.
//! Every other level, port and served dimension is left untouched.

use log::{debug, info};
use mapspace_workload::{LayerNode, SpatialMapping};
use std::sync::Arc;

use crate::error::{ExploreError, Result};
use crate::hardware::{Accelerator, Core};

pub const DIAGONAL_MAP_SUFFIX: &str = "-supporting-diagonal-map";

#[derive(Debug, Clone)]
pub enum Adaptation {
    /// keep using the accelerator that was passed in
    Unchanged,
    Adapted(Arc<Accelerator>),
}

impl Adaptation {
    pub fn is_adapted(&self) -> bool { matches!(self, Adaptation::Adapted(_)) }
}

/// Decide whether `mapping` needs a bigger activation memory and build the adapted accelerator.
///
/// An accelerator that is itself an adaptation is resized from its origin, so
/// repeated adaptation never compounds. Only a missing or unknown core is an error,
/// every other unmet condition leaves the accelerator unchanged.
pub fn adapt_for_diagonal_mapping(accelerator: &Arc<Accelerator>, layer: &LayerNode, mapping: &SpatialMapping) -> Result<Adaptation> {
    let base = accelerator.origin().unwrap_or(accelerator);
    let core_id = layer.core_allocation().ok_or(ExploreError::NoCoreAllocation { layer: layer.id() })?;
    let core = base.core(core_id)?;

    let [constant] = layer.constant_operands() else {
        debug!("{layer}: not weight stationary, no diagonal adaptation");
        return Ok(Adaptation::Unchanged);
    };
    let Some(activation) = layer.input_operands().find(|op| *op != constant) else {
        debug!("{layer}: no activation operand");
        return Ok(Adaptation::Unchanged);
    };
    let Ok(weight_irrelevant) = layer.operand_irrelevant_dims(constant) else {
        debug!("{layer}: constant operand {constant} is not in the equation");
        return Ok(Adaptation::Unchanged);
    };
    let Some(mem_operand) = layer.memory_operand_links().get(activation) else {
        debug!("{layer}: activation {activation} has no memory operand");
        return Ok(Adaptation::Unchanged);
    };
    let Some((index, level)) = core.memory_hierarchy.innermost_for(mem_operand) else {
        debug!("{layer}: no memory holds {mem_operand} on core {core_id}");
        return Ok(Adaptation::Unchanged);
    };
    let mut served = level.served_dimensions.iter();
    let (Some(oa_dim), None) = (served.next(), served.next()) else {
        debug!("{layer}: {} serves {} array dimensions", level.instance.name, level.served_dimensions.len());
        return Ok(Adaptation::Unchanged);
    };

    let factor: u64 = mapping.get(oa_dim).into_iter()
        .flat_map(|single| single.iter())
        .filter(|(dim, _)| weight_irrelevant.contains(dim))
        .map(|(_, unroll)| unroll as u64)
        .product();
    if factor == 1 {
        debug!("{layer}: nothing irrelevant to {constant} unrolled on {oa_dim}");
        return Ok(Adaptation::Unchanged);
    }

    info!("{layer}: scaling {} by {factor} for diagonal mapping on {oa_dim}", level.instance.name);
    let hierarchy = &core.memory_hierarchy;
    let core = Core {
        memory_hierarchy: Arc::new(hierarchy.with_scaled_level(&format!("{}{DIAGONAL_MAP_SUFFIX}", hierarchy.name()), index, factor)),
        ..Core::clone(core)
    };
    Ok(Adaptation::Adapted(Arc::new(base.derive(format!("{}{DIAGONAL_MAP_SUFFIX}", base.name()), core))))
}
