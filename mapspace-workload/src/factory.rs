//! Typed records for user payloads and the factories that turn them into layers.

use log::warn;
use serde::Deserialize;
use std::{collections::BTreeMap, sync::Arc};

use crate::error::{Result, WorkloadError};
use crate::graph::{Workload, WorkloadNode, WorkloadSource};
use crate::ids::{LayerDim, LayerOperand, MemOperand, OADimension};
use crate::layer::{LayerAttrs, LayerNode};
use crate::mapping::{MappingSingleOADim, SpatialMapping, SpatialMappingHint};
use crate::sizes::LayerDimSizes;

/// A single workload layer as written by the user
#[derive(Debug, Clone, Deserialize)]
pub struct LayerSpec {
    pub id: usize,
    #[serde(default)]
    pub name: Option<String>,
    pub operator_type: String,
    pub equation: String,
    #[serde(default)]
    pub dimension_relations: Vec<String>,
    pub loop_dims: Vec<LayerDim>,
    pub loop_sizes: Vec<u64>,
    pub operand_precision: BTreeMap<LayerOperand, u32>,
    /// producer layer per operand; an operand sourced from the layer itself is constant
    #[serde(default)]
    pub operand_source: BTreeMap<LayerOperand, usize>,
    #[serde(default)]
    pub pr_loop_dims: Vec<LayerDim>,
    #[serde(default)]
    pub pr_loop_sizes: Option<Vec<u64>>,
    #[serde(default)]
    pub padding: Option<Vec<(u64, u64)>>,
}

fn default_core_allocation() -> usize { 1 }

fn default_memory_operand_links() -> BTreeMap<LayerOperand, MemOperand> {
    [("O", "O"), ("I", "I1"), ("W", "I2")].into_iter().map(|(l, m)| (l.into(), m.into())).collect()
}

/// Mapping directives for one operator type, or for `default`
#[derive(Debug, Clone, Deserialize)]
pub struct MappingSpec {
    pub name: String,
    #[serde(default = "default_core_allocation")]
    pub core_allocation: usize,
    #[serde(default)]
    pub spatial_mapping: Option<BTreeMap<OADimension, Vec<String>>>,
    #[serde(default)]
    pub spatial_mapping_hint: Option<BTreeMap<OADimension, Vec<LayerDim>>>,
    #[serde(default = "default_memory_operand_links")]
    pub memory_operand_links: BTreeMap<LayerOperand, MemOperand>,
}

pub const DEFAULT_MAPPING: &str = "default";

/// Picks the mapping entry of an operator type and builds the mapping-side attributes
pub struct MappingFactory<'m> {
    spec: &'m MappingSpec,
}

impl<'m> MappingFactory<'m> {
    pub fn new(operator_type: &str, mappings: &'m [MappingSpec]) -> Result<Self> {
        if let Some(spec) = mappings.iter().find(|m| m.name == operator_type) {
            return Ok(MappingFactory { spec });
        }
        let spec = mappings.iter().find(|m| m.name == DEFAULT_MAPPING)
            .ok_or_else(|| WorkloadError::MissingMapping(operator_type.to_owned()))?;
        warn!("Operator {operator_type} not defined in mapping. Using default mapping instead.");
        Ok(MappingFactory { spec })
    }

    pub fn core_allocation(&self) -> usize { self.spec.core_allocation }

    pub fn spatial_mapping(&self) -> Result<SpatialMapping> {
        let mut out = SpatialMapping::empty();
        for (oa_dim, entries) in self.spec.spatial_mapping.iter().flatten() {
            out.insert(oa_dim.clone(), MappingSingleOADim::parse_user_input(entries)?);
        }
        Ok(out)
    }

    pub fn spatial_mapping_hint(&self) -> SpatialMappingHint {
        self.spec.spatial_mapping_hint.iter().flatten()
            .fold(SpatialMappingHint::empty(), |h, (oa_dim, dims)| h.with(oa_dim.clone(), dims.iter().cloned()))
    }

    pub fn memory_operand_links(&self) -> BTreeMap<LayerOperand, MemOperand> {
        self.spec.memory_operand_links.clone()
    }
}

/// Builds one [`LayerNode`] from its payload and the mapping entries
pub struct LayerNodeFactory<'a> {
    spec: &'a LayerSpec,
    mappings: &'a [MappingSpec],
}

impl<'a> LayerNodeFactory<'a> {
    pub fn new(spec: &'a LayerSpec, mappings: &'a [MappingSpec]) -> Self {
        LayerNodeFactory { spec, mappings }
    }

    fn invalid(&self, reason: &str) -> WorkloadError {
        WorkloadError::InvalidPayload { layer: self.spec.id, reason: reason.to_owned() }
    }

    // values keyed by the partially relevant dims, in order
    fn per_pr_dim<T: Clone>(&self, values: &[T], what: &str) -> Result<Vec<(LayerDim, T)>> {
        if values.len() != self.spec.pr_loop_dims.len() {
            Err(self.invalid(&format!("{what} does not match pr_loop_dims")))?
        }
        Ok(self.spec.pr_loop_dims.iter().cloned().zip(values.iter().cloned()).collect())
    }

    pub fn create(&self) -> Result<LayerNode> {
        let spec = self.spec;
        if spec.loop_dims.len() != spec.loop_sizes.len() {
            Err(self.invalid("loop_dims and loop_sizes differ in length"))?
        }
        let dim_sizes: LayerDimSizes = spec.loop_dims.iter().cloned().zip(spec.loop_sizes.iter().copied()).collect();
        let pr_dim_sizes = match &spec.pr_loop_sizes {
            Some(sizes) => Some(self.per_pr_dim(sizes, "pr_loop_sizes")?.into_iter().collect()),
            None => None,
        };
        let padding = match &spec.padding {
            Some(padding) => self.per_pr_dim(padding, "padding")?.into_iter().collect(),
            None => BTreeMap::new(),
        };
        let constant_operands = spec.operand_source.iter()
            .filter(|(_, src)| **src == spec.id)
            .map(|(op, _)| op.clone())
            .collect();
        let input_operand_source = spec.operand_source.iter()
            .filter(|(_, src)| **src != spec.id)
            .map(|(op, src)| (op.clone(), vec![*src]))
            .collect();
        let mapping = MappingFactory::new(&spec.operator_type, self.mappings)?;
        let attrs = LayerAttrs {
            name: Some(spec.name.clone().unwrap_or_else(|| format!("Layer{}", spec.id))),
            layer_type: Some(spec.operator_type.clone()),
            equation: spec.equation.clone(),
            dim_sizes,
            pr_dim_sizes,
            dimension_relations: spec.dimension_relations.clone(),
            operand_precision: spec.operand_precision.clone(),
            constant_operands,
            input_operand_source,
            padding,
            core_allocation: Some(mapping.core_allocation()),
            memory_operand_links: mapping.memory_operand_links(),
            spatial_mapping: mapping.spatial_mapping()?,
            spatial_mapping_hint: mapping.spatial_mapping_hint(),
        };
        LayerNode::new(spec.id, attrs)
    }
}

/// Builds a user-defined [`Workload`] from validated payloads
pub struct WorkloadFactory {
    layers: Vec<LayerSpec>,
    mappings: Vec<MappingSpec>,
}

impl WorkloadFactory {
    pub fn new(layers: Vec<LayerSpec>, mappings: Vec<MappingSpec>) -> Self {
        WorkloadFactory { layers, mappings }
    }

    pub fn from_json(layers: &str, mappings: &str) -> Result<Self> {
        let decode = |e: serde_json::Error| WorkloadError::Decode(e.to_string());
        Ok(WorkloadFactory::new(
            serde_json::from_str(layers).map_err(decode)?,
            serde_json::from_str(mappings).map_err(decode)?,
        ))
    }

    pub fn create(&self) -> Result<Workload> {
        let nodes = self.layers.iter()
            .map(|spec| Ok(WorkloadNode::Layer(Arc::new(LayerNodeFactory::new(spec, &self.mappings).create()?))))
            .collect::<Result<Vec<_>>>()?;
        Workload::new(nodes, WorkloadSource::UserDefined)
    }
}
