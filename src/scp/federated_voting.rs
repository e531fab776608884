//! Federated voting predicates: v-blocking sets, quorums, and the
//! greatest-fixpoint quorum contraction shared by the ballot protocol and
//! the quorum-intersection checker. Grounded on `LocalNode::isVBlocking` /
//! `LocalNode::isQuorum` and `QuorumIntersectionCheckerImpl::contractToMaximalQuorum`.

use std::collections::{HashMap, HashSet};

use super::node_id::NodeId;
use super::quorum_set::QuorumSet;

/// A set `nodes` is v-blocking for `qs` iff every quorum slice of `qs`
/// contains at least one member of `nodes`.
pub fn is_v_blocking(qs: &QuorumSet, nodes: &HashSet<NodeId>) -> bool {
    if qs.threshold == 0 {
        return false;
    }
    let tot_entries = qs.validators.len() + qs.inner_sets.len();
    let mut left_till_block = (tot_entries + 1) as i64 - qs.threshold as i64;

    for validator in &qs.validators {
        if nodes.contains(validator) {
            left_till_block -= 1;
            if left_till_block <= 0 {
                return true;
            }
        }
    }
    for inner in &qs.inner_sets {
        if is_v_blocking(inner, nodes) {
            left_till_block -= 1;
            if left_till_block <= 0 {
                return true;
            }
        }
    }
    false
}

/// Whether `nodes` satisfies some quorum slice of `qs` (possibly descending
/// into inner sets). Does not itself require `nodes` to be a quorum.
pub fn is_quorum_slice(qs: &QuorumSet, nodes: &HashSet<NodeId>) -> bool {
    qs.is_quorum_slice_satisfied_by(nodes)
}

/// Greatest-fixpoint contraction: repeatedly drops any node whose own
/// quorum slice is not satisfied by the current candidate set, until no
/// more nodes can be dropped. Missing quorum sets are treated as dead and
/// are dropped unconditionally, without decrementing anyone's threshold.
/// Monotone and idempotent.
pub fn contract_to_maximal_quorum(
    candidate: &HashSet<NodeId>,
    quorum_sets: &HashMap<NodeId, QuorumSet>,
) -> HashSet<NodeId> {
    let mut current: HashSet<NodeId> = candidate
        .iter()
        .filter(|n| quorum_sets.contains_key(n))
        .copied()
        .collect();

    loop {
        let before = current.len();
        let snapshot = current.clone();
        current.retain(|n| {
            let qs = quorum_sets.get(n).expect("filtered to known nodes above");
            is_quorum_slice(qs, &snapshot)
        });
        if current.len() == before {
            break;
        }
    }
    current
}

/// `U` is a quorum iff non-empty and every member's quorum slice is
/// satisfied within `U`.
pub fn is_quorum(candidate: &HashSet<NodeId>, quorum_sets: &HashMap<NodeId, QuorumSet>) -> bool {
    !candidate.is_empty() && contract_to_maximal_quorum(candidate, quorum_sets) == *candidate
}

/// A quorum with no proper sub-quorum.
pub fn is_minimal_quorum(candidate: &HashSet<NodeId>, quorum_sets: &HashMap<NodeId, QuorumSet>) -> bool {
    if !is_quorum(candidate, quorum_sets) {
        return false;
    }
    for node in candidate {
        let mut without = candidate.clone();
        without.remove(node);
        if is_quorum(&without, quorum_sets) {
            return false;
        }
    }
    true
}
