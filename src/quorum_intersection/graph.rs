//! Flattens a map of quorum sets into a dense, bit-set-indexed graph.
//! Grounded on the reference `QBitSet`/`convertSCPQuorumSet` from
//! `QuorumIntersectionCheckerImpl.cpp`: nodes with no known quorum set are
//! dropped from their dependents' validator lists (treated as dead) rather
//! than causing a threshold adjustment.

use std::collections::HashMap;

use bit_set::BitSet;

use crate::scp::node_id::NodeId;
use crate::scp::quorum_set::QuorumSet;

#[derive(Clone, Debug)]
pub struct QBitSet {
    pub threshold: u32,
    pub nodes: BitSet,
    pub inner_sets: Vec<QBitSet>,
    pub all_successors: BitSet,
}

impl QBitSet {
    fn from_quorum_set(qs: &QuorumSet, index_of: &HashMap<NodeId, usize>) -> Self {
        let mut nodes = BitSet::new();
        for v in &qs.validators {
            if let Some(&idx) = index_of.get(v) {
                nodes.insert(idx);
            }
        }
        let inner_sets: Vec<QBitSet> = qs.inner_sets.iter().map(|inner| QBitSet::from_quorum_set(inner, index_of)).collect();

        let mut all_successors = nodes.clone();
        for inner in &inner_sets {
            all_successors.union_with(&inner.all_successors);
        }

        QBitSet { threshold: qs.threshold, nodes, inner_sets, all_successors }
    }

    /// Whether `candidate` satisfies some quorum slice of this node.
    pub fn is_quorum_slice(&self, candidate: &BitSet) -> bool {
        let direct = self.nodes.intersection(candidate).count();
        let inner = self.inner_sets.iter().filter(|i| i.is_quorum_slice(candidate)).count();
        (direct + inner) as u32 >= self.threshold
    }
}

/// A graph over `0..node_count` nodes, one `QBitSet` per node, built from a
/// map of known quorum sets. Nodes whose quorum set is unknown are simply
/// absent from the index and thus from everyone else's validator bit sets.
pub struct QGraph {
    pub node_count: usize,
    pub index_of: HashMap<NodeId, usize>,
    pub id_of: Vec<NodeId>,
    pub nodes: Vec<QBitSet>,
}

impl QGraph {
    pub fn build(quorum_map: &HashMap<NodeId, Option<QuorumSet>>) -> Self {
        let mut id_of: Vec<NodeId> = quorum_map.iter().filter(|(_, qs)| qs.is_some()).map(|(id, _)| *id).collect();
        id_of.sort();
        let index_of: HashMap<NodeId, usize> = id_of.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let nodes: Vec<QBitSet> = id_of
            .iter()
            .map(|id| {
                let qs = quorum_map.get(id).and_then(|q| q.as_ref()).expect("filtered to present quorum sets");
                QBitSet::from_quorum_set(qs, &index_of)
            })
            .collect();

        QGraph { node_count: id_of.len(), index_of, id_of, nodes }
    }

    pub fn successors(&self, node: usize) -> &BitSet {
        &self.nodes[node].all_successors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    #[test]
    fn missing_quorum_sets_are_dropped_from_the_graph() {
        let mut map = HashMap::new();
        map.insert(n(1), Some(QuorumSet::new(2, vec![n(1), n(2), n(3)], vec![])));
        map.insert(n(2), None);
        let graph = QGraph::build(&map);
        assert_eq!(graph.node_count, 1);
        assert!(!graph.nodes[0].nodes.contains(graph.index_of.get(&n(1)).copied().unwrap_or(99)));
    }

    #[test]
    fn is_quorum_slice_respects_threshold() {
        let mut map = HashMap::new();
        map.insert(n(1), Some(QuorumSet::new(2, vec![n(1), n(2), n(3)], vec![])));
        map.insert(n(2), Some(QuorumSet::new(2, vec![n(1), n(2), n(3)], vec![])));
        map.insert(n(3), Some(QuorumSet::new(2, vec![n(1), n(2), n(3)], vec![])));
        let graph = QGraph::build(&map);

        let mut candidate = BitSet::new();
        candidate.insert(graph.index_of[&n(1)]);
        assert!(!graph.nodes[graph.index_of[&n(1)]].is_quorum_slice(&candidate));

        candidate.insert(graph.index_of[&n(2)]);
        assert!(graph.nodes[graph.index_of[&n(1)]].is_quorum_slice(&candidate));
    }
}
