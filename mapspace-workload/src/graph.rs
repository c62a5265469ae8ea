use smallvec::SmallVec;
use std::{collections::{BTreeMap, VecDeque}, fmt, sync::Arc};

use crate::error::{Result, WorkloadError};
use crate::layer::LayerNode;

/// Placeholder for an operator the hardware does not accelerate.
/// It only keeps the graph structure intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DummyNode {
    pub id: usize,
    pub name: Option<String>,
    pub op_type: Option<String>,
    pub preds: Vec<usize>,
}

impl DummyNode {
    // dummy nodes sit on a core that does not exist
    pub const CORE_ALLOCATION: i64 = -1;

    pub fn new(id: usize, preds: Vec<usize>) -> Self {
        DummyNode { id, name: None, op_type: None, preds }
    }
}

impl fmt::Display for DummyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DummyNode({})", self.id)
    }
}

#[derive(Debug, Clone)]
pub enum WorkloadNode {
    Layer(Arc<LayerNode>),
    Dummy(DummyNode),
}

impl WorkloadNode {
    pub fn id(&self) -> usize {
        match self {
            WorkloadNode::Layer(l) => l.id(),
            WorkloadNode::Dummy(d) => d.id,
        }
    }

    // ids of the nodes feeding this one
    fn preds(&self) -> SmallVec<[usize; 2]> {
        match self {
            WorkloadNode::Layer(l) => l.input_operand_source().values().flatten().copied().collect(),
            WorkloadNode::Dummy(d) => d.preds.iter().copied().collect(),
        }
    }
}

/// Where a workload graph came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkloadSource {
    /// written by hand, operator types are meaningful
    #[default]
    UserDefined,
    /// imported from a model graph that already encodes every operator explicitly
    Structural,
}

/// Acyclic graph of layers. Edges follow the operand sources of each node.
#[derive(Debug, Clone)]
pub struct Workload {
    nodes: Vec<WorkloadNode>,
    // downstream links for quick lookup
    fwd_links: Vec<SmallVec<[usize; 2]>>,
    // upstream links
    bwd_links: Vec<SmallVec<[usize; 2]>>,
    index: BTreeMap<usize, usize>,
    source: WorkloadSource,
}

impl Workload {
    /// Build a graph from nodes listed in any order.
    /// Cycles are only reported by [`Workload::topological_order`].
    pub fn new(nodes: Vec<WorkloadNode>, source: WorkloadSource) -> Result<Self> {
        let mut index = BTreeMap::new();
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.id(), i).is_some() { Err(WorkloadError::DuplicateLayer(node.id()))? }
        }
        let mut fwd_links: Vec<SmallVec<[usize; 2]>> = vec![SmallVec::new(); nodes.len()];
        let mut bwd_links: Vec<SmallVec<[usize; 2]>> = vec![SmallVec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            for p in node.preds() {
                let Some(&j) = index.get(&p) else {
                    return Err(WorkloadError::UnknownSource { layer: node.id(), source_id: p });
                };
                // one edge per producer, however many operands it feeds
                if !bwd_links[i].contains(&j) {
                    fwd_links[j].push(i);
                    bwd_links[i].push(j);
                }
            }
        }
        Ok(Workload { nodes, fwd_links, bwd_links, index, source })
    }

    pub fn source(&self) -> WorkloadSource { self.source }

    pub fn len(&self) -> usize { self.nodes.len() }

    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    pub fn node(&self, id: usize) -> Option<&WorkloadNode> {
        self.index.get(&id).map(|i| &self.nodes[*i])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &WorkloadNode> + '_ { self.nodes.iter() }

    pub fn layers(&self) -> impl Iterator<Item = &Arc<LayerNode>> + '_ {
        self.nodes.iter().filter_map(|n| match n { WorkloadNode::Layer(l) => Some(l), _ => None })
    }

    pub fn successors(&self, id: usize) -> impl Iterator<Item = &WorkloadNode> + '_ {
        let links = self.index.get(&id).map(|i| &self.fwd_links[*i][..]).unwrap_or(&[]);
        links.iter().map(|j| &self.nodes[*j])
    }

    pub fn predecessors(&self, id: usize) -> impl Iterator<Item = &WorkloadNode> + '_ {
        let links = self.index.get(&id).map(|i| &self.bwd_links[*i][..]).unwrap_or(&[]);
        links.iter().map(|j| &self.nodes[*j])
    }

    /// Nodes in an order where every producer comes before its consumers.
    /// Ties are broken by insertion order.
    pub fn topological_order(&self) -> Result<Vec<&WorkloadNode>> {
        let mut indegree: Vec<usize> = self.bwd_links.iter().map(|l| l.len()).collect();
        let mut ready: VecDeque<usize> = (0..self.nodes.len()).filter(|i| indegree[*i] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(i) = ready.pop_front() {
            order.push(&self.nodes[i]);
            for &j in &self.fwd_links[i] {
                indegree[j] -= 1;
                if indegree[j] == 0 { ready.push_back(j); }
            }
        }
        if order.len() != self.nodes.len() { Err(WorkloadError::Cycle)? }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerAttrs;

    pub(crate) fn layer(id: usize, sources: &[usize]) -> WorkloadNode {
        let attrs = LayerAttrs {
            equation: "O[k]+=W[k][c]*I[c]".into(),
            dim_sizes: [("K", 8), ("C", 8)].into_iter().collect(),
            operand_precision: [("O", 16), ("W", 8), ("I", 8)].into_iter().map(|(o, p)| (o.into(), p)).collect(),
            input_operand_source: [("I".into(), sources.to_vec())].into_iter().collect(),
            core_allocation: Some(1),
            ..Default::default()
        };
        WorkloadNode::Layer(Arc::new(LayerNode::new(id, attrs).unwrap()))
    }

    fn ids(order: &[&WorkloadNode]) -> Vec<usize> { order.iter().map(|n| n.id()).collect() }

    #[test]
    fn producers_come_first() {
        // 0 -> 1 -> 3, 0 -> dummy 2 -> 3
        let w = Workload::new(vec![
            layer(0, &[]),
            layer(1, &[0]),
            WorkloadNode::Dummy(DummyNode::new(2, vec![0])),
            layer(3, &[1, 2]),
        ], WorkloadSource::UserDefined).unwrap();
        let order = w.topological_order().unwrap();
        assert_eq!(ids(&order), [0, 1, 2, 3]);
        assert_eq!(w.successors(0).map(|n| n.id()).collect::<Vec<_>>(), [1, 2]);
        assert_eq!(w.predecessors(3).map(|n| n.id()).collect::<Vec<_>>(), [1, 2]);
        assert_eq!(w.layers().count(), 3);
    }

    #[test]
    fn unknown_and_duplicate_ids() {
        let err = Workload::new(vec![layer(0, &[5])], WorkloadSource::UserDefined).unwrap_err();
        assert_eq!(err, WorkloadError::UnknownSource { layer: 0, source_id: 5 });
        let err = Workload::new(vec![layer(0, &[]), layer(0, &[])], WorkloadSource::UserDefined).unwrap_err();
        assert_eq!(err, WorkloadError::DuplicateLayer(0));
    }

    #[test]
    fn listing_order_does_not_matter() {
        let w = Workload::new(vec![
            layer(2, &[1]),
            layer(1, &[0]),
            layer(0, &[]),
        ], WorkloadSource::UserDefined).unwrap();
        assert_eq!(ids(&w.topological_order().unwrap()), [0, 1, 2]);
    }

    #[test]
    fn cycles_are_reported() {
        // 0 -> 1 -> 2 -> 1
        let w = Workload::new(vec![
            layer(0, &[]),
            layer(1, &[0, 2]),
            layer(2, &[1]),
        ], WorkloadSource::UserDefined).unwrap();
        assert_eq!(w.topological_order().unwrap_err(), WorkloadError::Cycle);
        // a layer feeding itself
        let w = Workload::new(vec![layer(0, &[0])], WorkloadSource::UserDefined).unwrap();
        assert_eq!(w.topological_order().unwrap_err(), WorkloadError::Cycle);
    }

    #[test]
    fn dummy_nodes_display() {
        assert_eq!(DummyNode::new(4, vec![]).to_string(), "DummyNode(4)");
    }
}
