//! Quorum set model, sanity checking and normalization.
//!
//! Grounded directly on the reference `QuorumSetUtils.cpp`: a
//! `QuorumSetSanityChecker` walk bounding depth/threshold/duplicate nodes,
//! and a `normalizeQSet` pass that removes a node, inlines singleton inner
//! sets, and collapses a trivial `{t:1, [X]}` wrapper.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::node_id::NodeId;

pub const MIN_VALIDATORS: usize = 1;
pub const MAX_VALIDATORS: usize = 1000;
pub const MAX_DEPTH: usize = 2;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug, Default)]
pub struct QuorumSet {
    pub threshold: u32,
    pub validators: Vec<NodeId>,
    pub inner_sets: Vec<QuorumSet>,
}

impl QuorumSet {
    pub fn new(threshold: u32, validators: Vec<NodeId>, inner_sets: Vec<QuorumSet>) -> Self {
        QuorumSet { threshold, validators, inner_sets }
    }

    /// All validators anywhere in the tree.
    pub fn all_validators(&self) -> Vec<NodeId> {
        let mut out = self.validators.clone();
        for inner in &self.inner_sets {
            out.extend(inner.all_validators());
        }
        out
    }

    /// Checks that a given set of nodes satisfies some slice of this quorum
    /// set. Recurses into inner sets.
    pub fn is_quorum_slice_satisfied_by(&self, nodes: &HashSet<NodeId>) -> bool {
        let direct_hits = self.validators.iter().filter(|n| nodes.contains(n)).count();
        let inner_hits = self
            .inner_sets
            .iter()
            .filter(|inner| inner.is_quorum_slice_satisfied_by(nodes))
            .count();
        (direct_hits + inner_hits) as u32 >= self.threshold
    }

    /// Probability that `node` appears in a uniformly random slice of this
    /// quorum set, computed by descending the tree (used by nomination's
    /// priority ranking). Returns 0 if the node does not appear at all.
    pub fn weight(&self, node: NodeId) -> f64 {
        let total_entries = self.validators.len() + self.inner_sets.len();
        if total_entries == 0 {
            return 0.0;
        }
        let slice_fraction = self.threshold as f64 / total_entries as f64;

        if self.validators.contains(&node) {
            return slice_fraction;
        }
        for inner in &self.inner_sets {
            let inner_weight = inner.weight(node);
            if inner_weight > 0.0 {
                return slice_fraction * inner_weight;
            }
        }
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanityError(pub String);

impl std::fmt::Display for SanityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SanityError {}

/// Mirrors `isQuorumSetSane`. `extra_checks` additionally requires the
/// threshold to be at least as large as the set's v-blocking size.
pub fn is_quorum_set_sane(qs: &QuorumSet, extra_checks: bool) -> Result<(), SanityError> {
    let mut known_nodes = HashSet::new();
    let mut total_validator_count = 0usize;
    check_sanity(qs, 0, extra_checks, &mut known_nodes, &mut total_validator_count)?;

    if total_validator_count < MIN_VALIDATORS {
        return Err(SanityError("number of validator nodes is zero".into()));
    }
    if total_validator_count > MAX_VALIDATORS {
        return Err(SanityError(format!(
            "number of validator nodes exceeds the limit of {MAX_VALIDATORS}"
        )));
    }
    Ok(())
}

fn check_sanity(
    qs: &QuorumSet,
    depth: usize,
    extra_checks: bool,
    known_nodes: &mut HashSet<NodeId>,
    total_validator_count: &mut usize,
) -> Result<(), SanityError> {
    if depth > MAX_DEPTH {
        return Err(SanityError("cannot have sub-quorums with depth exceeding 2 levels".into()));
    }
    if qs.threshold < 1 {
        return Err(SanityError("the threshold for a quorum must equal at least 1".into()));
    }

    let tot_entries = qs.validators.len() + qs.inner_sets.len();
    let v_blocking_size = tot_entries as i64 - qs.threshold as i64 + 1;
    *total_validator_count += qs.validators.len();

    if qs.threshold as usize > tot_entries {
        return Err(SanityError("the threshold for a quorum exceeds total number of entries".into()));
    }
    if extra_checks && (qs.threshold as i64) < v_blocking_size {
        return Err(SanityError("extra check: the threshold for a quorum is too low".into()));
    }

    for node in &qs.validators {
        if !known_nodes.insert(*node) {
            return Err(SanityError("a duplicate node was configured within another quorum".into()));
        }
    }

    for inner in &qs.inner_sets {
        check_sanity(inner, depth + 1, extra_checks, known_nodes, total_validator_count)?;
    }

    Ok(())
}

/// Mirrors `normalizeQSet`: removes `id_to_remove` (if any) from every level,
/// inlines singleton inner sets into the validator list, and collapses a
/// trivial `{threshold: 1, validators: [], inner_sets: [X]}` wrapper to `X`.
/// Idempotent.
pub fn normalize_qset(qs: &QuorumSet, id_to_remove: Option<NodeId>) -> QuorumSet {
    let mut validators = qs.validators.clone();
    let mut threshold = qs.threshold;

    if let Some(id) = id_to_remove {
        let before = validators.len();
        validators.retain(|n| *n != id);
        threshold = threshold.saturating_sub((before - validators.len()) as u32);
    }

    let mut inner_sets = Vec::new();
    for inner in &qs.inner_sets {
        let normalized = normalize_qset(inner, id_to_remove);
        if normalized.threshold == 1 && normalized.validators.len() == 1 && normalized.inner_sets.is_empty() {
            validators.push(normalized.validators[0]);
        } else {
            inner_sets.push(normalized);
        }
    }

    if threshold == 1 && validators.is_empty() && inner_sets.len() == 1 {
        return inner_sets.into_iter().next().unwrap();
    }

    QuorumSet { threshold, validators, inner_sets }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    #[test]
    fn sane_flat_quorum_set() {
        let qs = QuorumSet::new(2, vec![n(1), n(2), n(3)], vec![]);
        assert!(is_quorum_set_sane(&qs, false).is_ok());
    }

    #[test]
    fn threshold_exceeding_entries_is_insane() {
        let qs = QuorumSet::new(3, vec![n(1), n(2)], vec![]);
        assert!(is_quorum_set_sane(&qs, false).is_err());
    }

    #[test]
    fn duplicate_node_is_insane() {
        let qs = QuorumSet::new(
            2,
            vec![n(1)],
            vec![QuorumSet::new(1, vec![n(1), n(2)], vec![])],
        );
        assert!(is_quorum_set_sane(&qs, false).is_err());
    }

    #[test]
    fn depth_exceeding_two_is_insane() {
        // Four levels deep (depths 0..3): the innermost node sits at depth 3,
        // one past the cap of 2.
        let qs = QuorumSet::new(
            1,
            vec![],
            vec![QuorumSet::new(
                1,
                vec![],
                vec![QuorumSet::new(
                    1,
                    vec![],
                    vec![QuorumSet::new(1, vec![n(1)], vec![])],
                )],
            )],
        );
        assert!(is_quorum_set_sane(&qs, false).is_err());
    }

    #[test]
    fn normalize_removes_node_and_decrements_threshold() {
        let qs = QuorumSet::new(3, vec![n(1), n(2), n(3)], vec![]);
        let normalized = normalize_qset(&qs, Some(n(2)));
        assert_eq!(normalized.threshold, 2);
        assert_eq!(normalized.validators, vec![n(1), n(3)]);
    }

    #[test]
    fn normalize_inlines_singleton_inner_set() {
        let qs = QuorumSet::new(2, vec![n(1)], vec![QuorumSet::new(1, vec![n(2)], vec![])]);
        let normalized = normalize_qset(&qs, None);
        assert!(normalized.inner_sets.is_empty());
        assert!(normalized.validators.contains(&n(2)));
    }

    #[test]
    fn normalize_collapses_trivial_wrapper() {
        let qs = QuorumSet::new(1, vec![], vec![QuorumSet::new(2, vec![n(1), n(2)], vec![])]);
        let normalized = normalize_qset(&qs, None);
        assert_eq!(normalized.threshold, 2);
        assert_eq!(normalized.validators, vec![n(1), n(2)]);
    }

    #[test]
    fn normalize_is_idempotent() {
        let qs = QuorumSet::new(2, vec![n(1), n(2), n(3)], vec![]);
        let once = normalize_qset(&qs, None);
        let twice = normalize_qset(&once, None);
        assert_eq!(once, twice);
    }
}
