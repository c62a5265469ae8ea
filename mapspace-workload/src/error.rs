use thiserror::Error;

use crate::ids::{LayerDim, LayerOperand, MemOperand};

/// Errors raised while building layers and workload graphs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkloadError {
    /// Equation could not be split into operand terms
    #[error("malformed equation `{0}`")]
    MalformedEquation(String),

    /// Dimension relation does not have the form `a = c2*b + c3*c`
    #[error("dimension relation `{relation}` is malformed: {reason}")]
    MalformedRelation { relation: String, reason: &'static str },

    /// Dimension relation names a number of generators other than two
    #[error("dimension relation `{relation}` relates {found} generator dimensions, expected 2")]
    GeneratorCount { relation: String, found: usize },

    /// A `*` in a relation is not preceded by an integer coefficient
    #[error("dimension relation `{relation}` lacks a scaling factor for `{dim}`")]
    MissingScalingFactor { relation: String, dim: String },

    /// Free constants are not allowed in a relation
    #[error("dimension relation `{relation}` contains a constant term")]
    ConstantInRelation { relation: String },

    /// Overlap arithmetic called outside of its domain
    #[error("overlap arithmetic precondition violated: {0}")]
    Arithmetic(&'static str),

    /// A dimension is empty, as given or after padding
    #[error("dimension {dim} has non-positive size {size}")]
    NonPositiveSize { dim: LayerDim, size: i64 },

    /// A dimension was referenced but never sized
    #[error("dimension {0} has no size")]
    UnknownDimension(LayerDim),

    /// Operand is not part of the layer equation
    #[error("operand {0} does not appear in the layer equation")]
    UnknownOperand(LayerOperand),

    /// Memory operand is not linked to any layer operand
    #[error("memory operand {mem_operand} is not linked in layer {layer}")]
    UnknownMemOperand { layer: usize, mem_operand: MemOperand },

    /// Operand precision missing for an operand of the equation
    #[error("operand {0} has no precision")]
    MissingPrecision(LayerOperand),

    /// Operand source refers to a layer that does not exist (yet)
    #[error("layer {layer} refers to non-existent layer {source_id}")]
    UnknownSource { layer: usize, source_id: usize },

    /// Same id used twice in one workload
    #[error("layer id {0} is defined twice")]
    DuplicateLayer(usize),

    /// Workload graph is not acyclic
    #[error("workload graph contains a cycle")]
    Cycle,

    /// Textual spatial mapping entry is not `DIM, FACTOR`
    #[error("spatial mapping entry `{0}` is malformed")]
    MalformedMappingEntry(String),

    /// Payload fields are inconsistent with each other
    #[error("invalid layer payload for layer {layer}: {reason}")]
    InvalidPayload { layer: usize, reason: String },

    /// Payload text is not valid json for the expected record
    #[error("cannot decode payload: {0}")]
    Decode(String),

    /// No mapping entry for the operator and no `default` either
    #[error("no mapping entry for operator `{0}` and no default mapping")]
    MissingMapping(String),
}

pub type Result<T, E = WorkloadError> = std::result::Result<T, E>;
