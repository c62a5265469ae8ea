// shared fixtures for the unit tests of this crate

use mapspace_workload::{LayerAttrs, LayerNode, MemOperand, OADimension, SpatialMapping};
use std::{cell::RefCell, sync::Arc};

use crate::error::{ExploreError, Result};
use crate::hardware::{Accelerator, Core, MemoryHierarchy, MemoryInstance, MemoryLevel, OperationalArray, PortAllocation};
use crate::stage::{Evaluation, LayerPipeline, StageIter};

fn level(name: &str, size: u64, operands: &[&str], served: &[&str]) -> MemoryLevel {
    MemoryLevel::new(
        MemoryInstance::new(name, size),
        operands.iter().map(|o| MemOperand::new(o)),
        served.iter().map(|d| OADimension::new(d)),
    )
}

/// Core 1 is a 16x16 array whose activation register file is broadcast along D2.
/// Core 2 is a bare 4-wide array.
pub(crate) fn accelerator(pe_type: Option<&str>) -> Accelerator {
    let mut array = OperationalArray::new([("D1", 16), ("D2", 16)]);
    if let Some(pe) = pe_type { array = array.with_pe_type(pe); }
    let ports = PortAllocation { fh: Some("w_port_1".into()), tl: Some("r_port_1".into()), ..Default::default() };
    let hierarchy = MemoryHierarchy::new("mh", vec![
        level("rf_w", 64, &["I2"], &[]),
        level("rf_i", 128, &["I1"], &["D2"]).with_port_alloc("I1".into(), ports),
        level("rf_o", 256, &["O"], &["D2"]),
        level("sram", 1 << 20, &["I1", "I2", "O"], &["D1", "D2"]),
    ]);
    let small = Core::new(2, OperationalArray::new([("D1", 4)]), MemoryHierarchy::new("mh2", vec![]));
    Accelerator::new("acc", [Core::new(1, array, hierarchy), small])
}

/// Same as [`accelerator`] but the activation register file serves both axes
pub(crate) fn broadcast_accelerator() -> Accelerator {
    let array = OperationalArray::new([("D1", 16), ("D2", 16)]);
    let hierarchy = MemoryHierarchy::new("mh", vec![
        level("rf_w", 64, &["I2"], &[]),
        level("rf_i", 128, &["I1"], &["D1", "D2"]),
        level("sram", 1 << 20, &["I1", "I2", "O"], &["D1", "D2"]),
    ]);
    Accelerator::new("acc", [Core::new(1, array, hierarchy)])
}

/// 3x3 convolution on core 1
pub(crate) fn conv_attrs(constant: &[&str]) -> LayerAttrs {
    LayerAttrs {
        name: Some("conv".into()),
        layer_type: Some("Conv".into()),
        equation: "O[b][k][oy][ox]+=W[k][c][fy][fx]*I[b][c][iy][ix]".into(),
        dim_sizes: [("B", 1), ("K", 16), ("C", 8), ("OY", 4), ("OX", 4), ("FY", 3), ("FX", 3)].into_iter().collect(),
        dimension_relations: vec!["ix=1*ox+1*fx".into(), "iy=1*oy+1*fy".into()],
        operand_precision: [("O", 16), ("W", 8), ("I", 8)].into_iter().map(|(o, p)| (o.into(), p)).collect(),
        constant_operands: constant.iter().map(|o| (*o).into()).collect(),
        core_allocation: Some(1),
        memory_operand_links: [("O", "O"), ("W", "I2"), ("I", "I1")].into_iter().map(|(l, m)| (l.into(), m.into())).collect(),
        ..Default::default()
    }
}

pub(crate) fn conv_layer(constant: &[&str], spatial_mapping: SpatialMapping) -> LayerNode {
    LayerNode::new(0, LayerAttrs { spatial_mapping, ..conv_attrs(constant) }).unwrap()
}

#[derive(Debug, Clone)]
pub(crate) struct Eval {
    pub accelerator: Arc<Accelerator>,
    pub layer: Arc<LayerNode>,
}

impl Evaluation for Eval {
    fn accelerator(&self) -> &Arc<Accelerator> { &self.accelerator }
    fn set_accelerator(&mut self, accelerator: Arc<Accelerator>) { self.accelerator = accelerator; }
}

/// Yields `per_launch` evaluations per launch and records what it was launched with
#[derive(Default)]
pub(crate) struct Recorder {
    pub per_launch: usize,
    pub fail_at: Option<usize>,
    pub launches: RefCell<Vec<(Arc<Accelerator>, Arc<LayerNode>)>>,
}

impl LayerPipeline for Recorder {
    type Output = Eval;
    type Extra = usize;

    fn launch<'a>(&'a self, accelerator: Arc<Accelerator>, layer: Arc<LayerNode>) -> Result<StageIter<'a, Eval, usize>> {
        self.launches.borrow_mut().push((Arc::clone(&accelerator), Arc::clone(&layer)));
        let fail_at = self.fail_at;
        Ok(Box::new((0..self.per_launch).map(move |i| match fail_at == Some(i) {
            true => Err(ExploreError::NoCoreAllocation { layer: 99 }),
            false => Ok((Eval { accelerator: Arc::clone(&accelerator), layer: Arc::clone(&layer) }, i)),
        })))
    }
}
