//! Greatest-fixpoint quorum contraction and the minimal-quorum
//! branch-and-bound search, grounded on `QuorumIntersectionCheckerImpl.cpp`'s
//! `MinQuorumEnumerator`. The reference draws its split-node tie-break from
//! an unseeded RNG; this version seeds a `StdRng` per checker instance so a
//! fixed seed reproduces the same search.

use bit_set::BitSet;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::graph::QGraph;

fn contains_all(set: &BitSet, subset: &BitSet) -> bool {
    subset.iter().all(|i| set.contains(i))
}

fn bitsets_equal(a: &BitSet, b: &BitSet) -> bool {
    a.len() == b.len() && contains_all(b, a)
}

/// Greatest fixpoint of "drop every node whose slice requirement the
/// remaining set no longer satisfies", starting from `candidate`.
pub fn contract_to_maximal_quorum(graph: &QGraph, candidate: &BitSet) -> BitSet {
    let mut current = candidate.clone();
    loop {
        let mut next = BitSet::new();
        for node in current.iter() {
            if graph.nodes[node].is_quorum_slice(&current) {
                next.insert(node);
            }
        }
        if bitsets_equal(&next, &current) {
            return next;
        }
        current = next;
    }
}

pub fn is_quorum(graph: &QGraph, candidate: &BitSet) -> bool {
    !candidate.is_empty() && bitsets_equal(&contract_to_maximal_quorum(graph, candidate), candidate)
}

pub fn is_minimal_quorum(graph: &QGraph, candidate: &BitSet) -> bool {
    if !is_quorum(graph, candidate) {
        return false;
    }
    for node in candidate.iter() {
        let mut shrunk = candidate.clone();
        shrunk.remove(node);
        if is_quorum(graph, &shrunk) {
            return false;
        }
    }
    true
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub early_exit_1s: u64,
    pub early_exit_21s: u64,
    pub early_exit_22s: u64,
    pub early_exit_31s: u64,
    pub early_exit_32s: u64,
    pub calls_started: u64,
    pub terminations: u64,
    pub max_quorums_seen: u64,
    pub min_quorums_seen: u64,
}

fn pick_split_node(graph: &QGraph, remaining: &BitSet, rng: &mut StdRng) -> usize {
    let mut best_score: i64 = -1;
    let mut best: Vec<usize> = Vec::new();
    for node in remaining.iter() {
        let score = remaining.iter().filter(|&other| graph.successors(other).contains(node)).count() as i64;
        if score > best_score {
            best_score = score;
            best.clear();
            best.push(node);
        } else if score == best_score {
            best.push(node);
        }
    }
    best[rng.gen_range(0..best.len())]
}

/// Explores `(committed, remaining)` states inside a single SCC, looking for
/// a pair of disjoint quorums. Stops at the first pair found; otherwise
/// collects every minimal quorum it proves along the way.
pub struct MinQuorumEnumerator<'a> {
    graph: &'a QGraph,
    max_scc: BitSet,
    rng: StdRng,
    pub stats: Stats,
    pub minimal_quorums: Vec<BitSet>,
    pub split_witness: Option<(BitSet, BitSet)>,
}

impl<'a> MinQuorumEnumerator<'a> {
    pub fn new(graph: &'a QGraph, max_scc: BitSet, seed: u64) -> Self {
        MinQuorumEnumerator {
            graph,
            max_scc,
            rng: StdRng::seed_from_u64(seed),
            stats: Stats::default(),
            minimal_quorums: Vec::new(),
            split_witness: None,
        }
    }

    pub fn run(&mut self) {
        let committed = BitSet::new();
        let remaining = self.max_scc.clone();
        self.enumerate(committed, remaining);
    }

    fn enumerate(&mut self, committed: BitSet, remaining: BitSet) {
        if self.split_witness.is_some() {
            return;
        }
        self.stats.calls_started += 1;

        if committed.len() > self.max_scc.len() / 2 + 1 {
            self.stats.early_exit_1s += 1;
            self.stats.terminations += 1;
            return;
        }

        let mut union = committed.clone();
        union.union_with(&remaining);
        let contracted = contract_to_maximal_quorum(self.graph, &union);

        if contracted.is_empty() {
            self.stats.early_exit_21s += 1;
            self.stats.terminations += 1;
            return;
        }
        if !contains_all(&contracted, &committed) {
            self.stats.early_exit_22s += 1;
            self.stats.terminations += 1;
            return;
        }

        if is_quorum(self.graph, &committed) {
            if is_minimal_quorum(self.graph, &committed) {
                self.stats.min_quorums_seen += 1;
                self.minimal_quorums.push(committed.clone());

                let mut rest = self.max_scc.clone();
                for node in committed.iter() {
                    rest.remove(node);
                }
                let disjoint = contract_to_maximal_quorum(self.graph, &rest);
                if !disjoint.is_empty() {
                    self.stats.early_exit_31s += 1;
                    self.stats.max_quorums_seen += 1;
                    self.split_witness = Some((committed.clone(), disjoint));
                }
            } else {
                self.stats.early_exit_32s += 1;
            }
            self.stats.terminations += 1;
            return;
        }

        if remaining.is_empty() {
            self.stats.terminations += 1;
            return;
        }

        let split = pick_split_node(self.graph, &remaining, &mut self.rng);
        let mut remaining_without = remaining;
        remaining_without.remove(split);

        self.enumerate(committed.clone(), remaining_without.clone());
        if self.split_witness.is_some() {
            return;
        }

        let mut committed_with = committed;
        committed_with.insert(split);
        self.enumerate(committed_with, remaining_without);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scp::node_id::NodeId;
    use crate::scp::quorum_set::QuorumSet;
    use std::collections::HashMap;

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    fn all_nodes(graph: &QGraph) -> BitSet {
        let mut s = BitSet::new();
        for i in 0..graph.node_count {
            s.insert(i);
        }
        s
    }

    #[test]
    fn unanimous_four_node_network_has_one_minimal_quorum() {
        let mut map = HashMap::new();
        for i in 1..=4u64 {
            map.insert(n(i), Some(QuorumSet::new(3, vec![n(1), n(2), n(3), n(4)], vec![])));
        }
        let graph = QGraph::build(&map);
        let mut enumerator = MinQuorumEnumerator::new(&graph, all_nodes(&graph), 42);
        enumerator.run();
        assert!(enumerator.split_witness.is_none());
        assert!(!enumerator.minimal_quorums.is_empty());
    }

    #[test]
    fn two_disjoint_cliques_report_a_split_witness() {
        let mut map = HashMap::new();
        map.insert(n(1), Some(QuorumSet::new(2, vec![n(1), n(2)], vec![])));
        map.insert(n(2), Some(QuorumSet::new(2, vec![n(1), n(2)], vec![])));
        map.insert(n(3), Some(QuorumSet::new(2, vec![n(3), n(4)], vec![])));
        map.insert(n(4), Some(QuorumSet::new(2, vec![n(3), n(4)], vec![])));
        let graph = QGraph::build(&map);
        let mut enumerator = MinQuorumEnumerator::new(&graph, all_nodes(&graph), 7);
        enumerator.run();
        assert!(enumerator.split_witness.is_some());
    }

    #[test]
    fn contract_to_maximal_quorum_is_idempotent() {
        let mut map = HashMap::new();
        for i in 1..=3u64 {
            map.insert(n(i), Some(QuorumSet::new(2, vec![n(1), n(2), n(3)], vec![])));
        }
        let graph = QGraph::build(&map);
        let once = contract_to_maximal_quorum(&graph, &all_nodes(&graph));
        let twice = contract_to_maximal_quorum(&graph, &once);
        assert!(bitsets_equal(&once, &twice));
    }
}
