//! # Loop relevance
//!
//! For every operand of a layer equation, each loop dimension is either
//!
//! + relevant: it indexes the operand directly (`K` for `W[k][c]`),
//! + irrelevant: the operand does not change along it (`OX` for `W[k][c]`),
//! + partially relevant: the operand is indexed by an affine combination of two loop
//!   dimensions (`IX = OX + FX` for `I[c][ix]`), so iterating either of them moves the
//!   index but the iteration space overlaps.
//!
//! Partially relevant dimensions are keyed by the data dimension (`IX`) and
//! carry their two generators (`OX`, `FX`) together with their scaling factors.

mod equation;
pub use equation::*;
mod relation;
pub use relation::*;
pub mod overlap;

use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, WorkloadError};
use crate::ids::{LayerDim, LayerOperand};
use crate::sizes::LayerDimSizes;

pub const RELEVANT_SUFFIX: &str = "-relevant";
pub const IRRELEVANT_SUFFIX: &str = "-irrelevant";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relevancy {
    Relevant,
    Irrelevant,
    PartiallyRelevant,
}

/// Partially relevant data dimension -> its two generator loop dimensions
pub type PrLoop = BTreeMap<LayerDim, [LayerDim; 2]>;

/// Classification of the loop dimensions for one operand
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperandRelevance {
    pub relevant: SmallVec<[LayerDim; 6]>,
    pub irrelevant: SmallVec<[LayerDim; 6]>,
    pub partially_relevant: PrLoop,
}

impl OperandRelevance {
    pub fn classify(&self, dim: &LayerDim) -> Option<Relevancy> {
        if self.relevant.contains(dim) { Some(Relevancy::Relevant) }
        else if self.irrelevant.contains(dim) { Some(Relevancy::Irrelevant) }
        else if self.partially_relevant.contains_key(dim)
            || self.partially_relevant.values().any(|g| g.contains(dim)) { Some(Relevancy::PartiallyRelevant) }
        else { None }
    }
}

/// Flat view where every partially relevant dimension `X` is replaced by the synthetic
/// `X-relevant` and `X-irrelevant` dimensions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatRelevance {
    pub relevant: SmallVec<[LayerDim; 8]>,
    pub irrelevant: SmallVec<[LayerDim; 8]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopRelevance {
    equation: Equation,
    relations: Vec<DimRelation>,
    pr_loop: PrLoop,
    operands: BTreeMap<LayerOperand, OperandRelevance>,
}

impl LoopRelevance {
    pub fn build(equation: Equation, sizes: &LayerDimSizes, relations: Vec<DimRelation>) -> Result<Self> {
        let mut pr_loop = PrLoop::new();
        for r in &relations {
            if pr_loop.insert(r.dim.clone(), r.generators.clone()).is_some() {
                Err(WorkloadError::MalformedRelation {
                    relation: r.to_string(), reason: "dimension is related more than once",
                })?
            }
        }
        let size_of = |dim: &LayerDim| sizes.get(dim).ok_or_else(|| WorkloadError::UnknownDimension(dim.clone()));
        let mut operands = BTreeMap::new();
        for term in equation.terms() {
            let present: PrLoop = term.dims.iter()
                .filter_map(|d| pr_loop.get_key_value(d))
                .map(|(k, g)| (k.clone(), g.clone()))
                .collect();
            // generators of a present pr dimension are accounted for through it
            let stripped: BTreeSet<&LayerDim> = present.iter()
                .flat_map(|(k, g)| std::iter::once(k).chain(g.iter()))
                .collect();
            let mut relevant = SmallVec::new();
            for d in term.dims.iter().filter(|d| !pr_loop.contains_key(*d) && !stripped.contains(d)) {
                if size_of(d)? > 1 && !relevant.contains(d) { relevant.push(d.clone()); }
            }
            let irrelevant = sizes.loop_dims()
                .filter(|d| !term.dims.contains(d) && !pr_loop.contains_key(*d) && !stripped.contains(d))
                .cloned()
                .collect();
            operands.insert(term.operand.clone(), OperandRelevance { relevant, irrelevant, partially_relevant: present });
        }
        for (dim, gens) in &pr_loop {
            for g in gens {
                if !sizes.contains(g) { Err(WorkloadError::UnknownDimension(g.clone()))? }
            }
            log::trace!("partially relevant {dim} <- {gens:?}");
        }
        Ok(LoopRelevance { equation, relations, pr_loop, operands })
    }

    pub fn equation(&self) -> &Equation { &self.equation }

    pub fn relations(&self) -> &[DimRelation] { &self.relations }

    pub fn pr_loop(&self) -> &PrLoop { &self.pr_loop }

    pub fn relation(&self, dim: &LayerDim) -> Option<&DimRelation> {
        self.relations.iter().find(|r| &r.dim == dim)
    }

    pub fn operand(&self, operand: &LayerOperand) -> Result<&OperandRelevance> {
        self.operands.get(operand).ok_or_else(|| WorkloadError::UnknownOperand(operand.clone()))
    }

    pub fn operands(&self) -> impl Iterator<Item = (&LayerOperand, &OperandRelevance)> + '_ {
        self.operands.iter()
    }

    /// Dimensions of an operand in the order they index its tensor
    pub fn dimensionality_order(&self, operand: &LayerOperand) -> Result<&[LayerDim]> {
        self.equation.term(operand).map(|t| &t.dims[..]).ok_or_else(|| WorkloadError::UnknownOperand(operand.clone()))
    }

    pub fn reform(&self) -> BTreeMap<LayerOperand, FlatRelevance> {
        self.operands.iter().map(|(op, rel)| {
            let mut flat = FlatRelevance {
                relevant: rel.relevant.iter().cloned().collect(),
                irrelevant: rel.irrelevant.iter().cloned().collect(),
            };
            for dim in rel.partially_relevant.keys() {
                flat.relevant.push(dim.suffixed(RELEVANT_SUFFIX));
                flat.irrelevant.push(dim.suffixed(IRRELEVANT_SUFFIX));
            }
            (op.clone(), flat)
        }).collect()
    }

    /// `(scaling, size)` pairs of the two generators of `dim`, in relation order
    pub fn generator_pairs(&self, dim: &LayerDim, size_of: impl Fn(&LayerDim) -> Option<u64>) -> Result<[(u64, u64); 2]> {
        let r = self.relation(dim).ok_or_else(|| WorkloadError::UnknownDimension(dim.clone()))?;
        let pair = |i: usize| -> Result<(u64, u64)> {
            let g = &r.generators[i];
            Ok((r.scaling[i] as u64, size_of(g).ok_or_else(|| WorkloadError::UnknownDimension(g.clone()))?))
        };
        Ok([pair(0)?, pair(1)?])
    }
}
