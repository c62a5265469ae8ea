use std::{collections::BTreeMap, fmt, sync::Arc};

use smallvec::SmallVec;

use crate::error::{Result, WorkloadError};
use crate::ids::{LayerDim, LayerOperand, MemOperand, OperandRole};
use crate::mapping::{SpatialMapping, SpatialMappingHint};
use crate::relevance::{overlap, DimRelation, Equation, LoopRelevance, OperandRelevance, Relevancy};
use crate::sizes::LayerDimSizes;

/// Padding `(before, after)` on partially relevant dimensions
pub type LayerPadding = BTreeMap<LayerDim, (u64, u64)>;

/// Validated attributes of a layer, before derived information is computed
#[derive(Debug, Clone, Default)]
pub struct LayerAttrs {
    pub name: Option<String>,
    pub layer_type: Option<String>,
    pub equation: String,
    pub dim_sizes: LayerDimSizes,
    pub pr_dim_sizes: Option<LayerDimSizes>,
    pub dimension_relations: Vec<String>,
    pub operand_precision: BTreeMap<LayerOperand, u32>,
    pub constant_operands: Vec<LayerOperand>,
    pub input_operand_source: BTreeMap<LayerOperand, Vec<usize>>,
    pub padding: LayerPadding,
    pub core_allocation: Option<usize>,
    pub memory_operand_links: BTreeMap<LayerOperand, MemOperand>,
    pub spatial_mapping: SpatialMapping,
    pub spatial_mapping_hint: SpatialMappingHint,
}

/// Per-operand totals derived from the loop sizes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperandInfo {
    pub size_elements: u64,
    pub size_bits: u64,
    pub data_reuse_factor: f64,
}

// immutable part of a layer, shared between the per-candidate copies
#[derive(Debug)]
struct LayerShared {
    id: usize,
    name: Option<String>,
    layer_type: Option<String>,
    dim_sizes: LayerDimSizes,
    pr_dim_sizes: LayerDimSizes,
    relevance: LoopRelevance,
    padding: LayerPadding,
    operand_precision: BTreeMap<LayerOperand, u32>,
    constant_operands: SmallVec<[LayerOperand; 2]>,
    input_operand_source: BTreeMap<LayerOperand, Vec<usize>>,
    core_allocation: Option<usize>,
    memory_operand_links: BTreeMap<LayerOperand, MemOperand>,
    spatial_mapping_hint: SpatialMappingHint,
    total_mac_count: u64,
    operand_info: BTreeMap<LayerOperand, OperandInfo>,
}

/// One layer of a workload.
/// Cloning is cheap, and a clone only differs from its origin in the spatial mapping it carries.
#[derive(Debug, Clone)]
pub struct LayerNode {
    shared: Arc<LayerShared>,
    spatial_mapping: SpatialMapping,
}

impl LayerNode {
    pub fn new(id: usize, attrs: LayerAttrs) -> Result<Self> {
        for sizes in std::iter::once(&attrs.dim_sizes).chain(attrs.pr_dim_sizes.as_ref()) {
            if let Some(dim) = sizes.first_empty() {
                Err(WorkloadError::NonPositiveSize { dim: dim.clone(), size: 0 })?
            }
        }
        let equation = Equation::parse(&attrs.equation)?;
        let relations = attrs.dimension_relations.iter()
            .map(|r| DimRelation::parse(r))
            .collect::<Result<Vec<_>>>()?;
        let relevance = LoopRelevance::build(equation, &attrs.dim_sizes, relations)?;
        // supplied pr sizes win over the computed ones
        let pr_dim_sizes = match attrs.pr_dim_sizes {
            Some(sizes) if !sizes.is_empty() => sizes,
            _ => relevance.pr_loop().keys()
                .map(|dim| Ok((dim.clone(), pr_dim_size_total(&relevance, &attrs.dim_sizes, &attrs.padding, dim)?)))
                .collect::<Result<LayerDimSizes>>()?,
        };
        for term in relevance.equation().terms() {
            if !attrs.operand_precision.contains_key(&term.operand) {
                Err(WorkloadError::MissingPrecision(term.operand.clone()))?
            }
        }
        let mut shared = LayerShared {
            id,
            name: attrs.name,
            layer_type: attrs.layer_type,
            dim_sizes: attrs.dim_sizes,
            pr_dim_sizes,
            relevance,
            padding: attrs.padding,
            operand_precision: attrs.operand_precision,
            constant_operands: attrs.constant_operands.into_iter().collect(),
            input_operand_source: attrs.input_operand_source,
            core_allocation: attrs.core_allocation,
            memory_operand_links: attrs.memory_operand_links,
            spatial_mapping_hint: attrs.spatial_mapping_hint,
            total_mac_count: 0,
            operand_info: BTreeMap::new(),
        };
        shared.total_mac_count = shared.dim_sizes.product()?;
        let mut info = BTreeMap::new();
        for term in shared.relevance.equation().terms() {
            let size_elements = tensor_size(&shared, &term.operand, &shared.dim_sizes)?;
            info.insert(term.operand.clone(), OperandInfo {
                size_elements,
                size_bits: size_elements.checked_mul(shared.operand_precision[&term.operand] as u64)
                    .ok_or(WorkloadError::Arithmetic("operand size in bits overflows u64"))?,
                data_reuse_factor: shared.total_mac_count as f64 / size_elements as f64,
            });
        }
        shared.operand_info = info;
        Ok(LayerNode { shared: Arc::new(shared), spatial_mapping: attrs.spatial_mapping })
    }

    /// Copy of this layer carrying another spatial mapping
    pub fn with_spatial_mapping(&self, spatial_mapping: SpatialMapping) -> LayerNode {
        LayerNode { shared: Arc::clone(&self.shared), spatial_mapping }
    }

    pub fn id(&self) -> usize { self.shared.id }

    pub fn name(&self) -> Option<&str> { self.shared.name.as_deref() }

    pub fn layer_type(&self) -> Option<&str> { self.shared.layer_type.as_deref() }

    pub fn equation(&self) -> &Equation { self.shared.relevance.equation() }

    pub fn relevance(&self) -> &LoopRelevance { &self.shared.relevance }

    pub fn dim_sizes(&self) -> &LayerDimSizes { &self.shared.dim_sizes }

    pub fn pr_dim_sizes(&self) -> &LayerDimSizes { &self.shared.pr_dim_sizes }

    pub fn padding(&self) -> &LayerPadding { &self.shared.padding }

    pub fn operand_precision(&self, operand: &LayerOperand) -> Option<u32> {
        self.shared.operand_precision.get(operand).copied()
    }

    pub fn constant_operands(&self) -> &[LayerOperand] { &self.shared.constant_operands }

    pub fn input_operand_source(&self) -> &BTreeMap<LayerOperand, Vec<usize>> { &self.shared.input_operand_source }

    pub fn core_allocation(&self) -> Option<usize> { self.shared.core_allocation }

    pub fn memory_operand_links(&self) -> &BTreeMap<LayerOperand, MemOperand> { &self.shared.memory_operand_links }

    pub fn spatial_mapping(&self) -> &SpatialMapping { &self.spatial_mapping }

    pub fn spatial_mapping_hint(&self) -> &SpatialMappingHint { &self.shared.spatial_mapping_hint }

    pub fn total_mac_count(&self) -> u64 { self.shared.total_mac_count }

    pub fn operand_info(&self, operand: &LayerOperand) -> Result<&OperandInfo> {
        self.shared.operand_info.get(operand).ok_or_else(|| WorkloadError::UnknownOperand(operand.clone()))
    }

    pub fn output_operand(&self) -> &LayerOperand { &self.equation().output().operand }

    pub fn input_operands(&self) -> impl Iterator<Item = &LayerOperand> + '_ {
        self.equation().terms().iter().filter(|t| t.role == OperandRole::Input).map(|t| &t.operand)
    }

    /// Inputs that are produced by other layers
    pub fn variable_input_operands(&self) -> impl Iterator<Item = &LayerOperand> + '_ {
        self.input_operands().filter(|op| !self.shared.constant_operands.contains(op))
    }

    pub fn operand_relevance(&self, operand: &LayerOperand) -> Result<&OperandRelevance> {
        self.shared.relevance.operand(operand)
    }

    pub fn operand_irrelevant_dims(&self, operand: &LayerOperand) -> Result<&[LayerDim]> {
        Ok(&self.operand_relevance(operand)?.irrelevant)
    }

    pub fn classify(&self, operand: &LayerOperand, dim: &LayerDim) -> Result<Option<Relevancy>> {
        Ok(self.operand_relevance(operand)?.classify(dim))
    }

    pub fn operand_dimensionality_order(&self, operand: &LayerOperand) -> Result<&[LayerDim]> {
        self.shared.relevance.dimensionality_order(operand)
    }

    /// Layer operand stored under the given memory operand
    pub fn layer_operand_for(&self, mem_operand: &MemOperand) -> Result<&LayerOperand> {
        self.shared.memory_operand_links.iter()
            .find(|(_, m)| *m == mem_operand)
            .map(|(op, _)| op)
            .ok_or_else(|| WorkloadError::UnknownMemOperand { layer: self.shared.id, mem_operand: mem_operand.clone() })
    }

    /// Extent of a partially relevant dimension when its generators iterate over `sizes`,
    /// clipped to the padded total
    pub fn pr_dim_size(&self, dim: &LayerDim, sizes: &LayerDimSizes) -> Result<u64> {
        pr_dim_size(&self.shared, dim, sizes)
    }

    /// Tensor extent per relevant and partially relevant dimension of `operand`
    pub fn tensor_dims(&self, operand: &LayerOperand, sizes: &LayerDimSizes) -> Result<LayerDimSizes> {
        tensor_dims(&self.shared, operand, sizes)
    }

    /// Number of elements of `operand` under the given loop sizes
    pub fn tensor_size(&self, operand: &LayerOperand, sizes: &LayerDimSizes) -> Result<u64> {
        tensor_size(&self.shared, operand, sizes)
    }
}

fn pr_dim_size_total(relevance: &LoopRelevance, sizes: &LayerDimSizes, padding: &LayerPadding, dim: &LayerDim) -> Result<u64> {
    let pairs = relevance.generator_pairs(dim, |g| Some(sizes.get(g).unwrap_or(1)))?;
    let total = overlap::count_unique_pairs(&pairs)? as i64;
    let (before, after) = padding.get(dim).copied().unwrap_or((0, 0));
    let size = total - (before + after) as i64;
    if size <= 0 { Err(WorkloadError::NonPositiveSize { dim: dim.clone(), size })? }
    Ok(size as u64)
}

fn pr_dim_size(shared: &LayerShared, dim: &LayerDim, sizes: &LayerDimSizes) -> Result<u64> {
    let pairs = shared.relevance.generator_pairs(dim, |g| Some(sizes.get(g).unwrap_or(1)))?;
    let size = overlap::count_unique_pairs(&pairs)?;
    let total = shared.pr_dim_sizes.get(dim).ok_or_else(|| WorkloadError::UnknownDimension(dim.clone()))?;
    Ok(size.min(total))
}

fn tensor_dims(shared: &LayerShared, operand: &LayerOperand, sizes: &LayerDimSizes) -> Result<LayerDimSizes> {
    let rel = shared.relevance.operand(operand)?;
    let mut out = LayerDimSizes::new();
    for dim in &rel.relevant {
        let size = sizes.get(dim).ok_or_else(|| WorkloadError::UnknownDimension(dim.clone()))?;
        out.insert(dim.clone(), size);
    }
    for dim in rel.partially_relevant.keys() {
        out.insert(dim.clone(), pr_dim_size(shared, dim, sizes)?);
    }
    Ok(out)
}

fn tensor_size(shared: &LayerShared, operand: &LayerOperand, sizes: &LayerDimSizes) -> Result<u64> {
    tensor_dims(shared, operand, sizes)?.product()
}

impl fmt::Display for LayerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayerNode_{}", self.shared.id)
    }
}
