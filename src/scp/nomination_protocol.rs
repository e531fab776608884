//! Nomination: each round picks "neighbor" leaders by a deterministic
//! hash-weighted draw over the local quorum set, votes for their nominated
//! values, and federated-accepts/confirms candidates until a composite
//! value is ready to hand to the ballot protocol. Grounded on the teacher's
//! `NominationProtocol`/`NominationProtocolState`, replacing its `todo!()`
//! bodies with the vote/accept/confirm cycle described by the reference
//! nomination algorithm.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use log::debug;

use crate::error::{ScpError, ScpResult};
use crate::hash::compute_hash_node;
use crate::value::NominationValue;

use super::driver::{ScpDriver, TimerId};
use super::federated_voting::{is_quorum, is_v_blocking};
use super::local_node::LocalNode;
use super::node_id::NodeId;
use super::quorum_set::QuorumSet;
use super::slot::{Slot, SlotIndex};
use super::statement::{ScpEnvelope, ScpStatement, ScpStatementNominate};

#[derive(Debug)]
pub struct NominationProtocolState<V: NominationValue> {
    pub round_number: u32,
    pub votes: BTreeSet<V>,
    pub accepted: BTreeSet<V>,
    pub candidates: BTreeSet<V>,
    pub round_leaders: BTreeSet<NodeId>,
    pub nomination_started: bool,
    pub latest_composite_candidate: Option<V>,
    pub previous_value: Vec<u8>,
    pub num_timeouts: u32,
    pub timed_out: bool,
}

impl<V: NominationValue> Default for NominationProtocolState<V> {
    fn default() -> Self {
        NominationProtocolState {
            round_number: 0,
            votes: BTreeSet::new(),
            accepted: BTreeSet::new(),
            candidates: BTreeSet::new(),
            round_leaders: BTreeSet::new(),
            nomination_started: false,
            latest_composite_candidate: None,
            previous_value: Vec::new(),
            num_timeouts: 0,
            timed_out: false,
        }
    }
}

/// Probability-weighted membership test: `node` is a neighbor of the local
/// node in round `round_number` iff a per-round hash draw falls within its
/// quorum-set weight.
fn is_neighbor<V: NominationValue>(
    local: &LocalNode,
    slot_index: SlotIndex,
    previous_value: &[u8],
    round_number: u32,
    node: NodeId,
) -> bool {
    if node == local.node_id {
        return true;
    }
    let weight = local.quorum_set.weight(node);
    if weight <= 0.0 {
        return false;
    }
    let draw = compute_hash_node(slot_index, previous_value, false, round_number, node.as_u64());
    (draw as f64 / u64::MAX as f64) < weight
}

fn priority(local: &LocalNode, slot_index: SlotIndex, previous_value: &[u8], round_number: u32, node: NodeId) -> u64 {
    compute_hash_node(slot_index, previous_value, true, round_number, node.as_u64())
}

fn update_round_leaders<V: NominationValue>(
    state: &mut NominationProtocolState<V>,
    local: &LocalNode,
    slot_index: SlotIndex,
) {
    let mut candidates: Vec<NodeId> = local.quorum_set.all_validators();
    candidates.push(local.node_id);
    candidates.sort();
    candidates.dedup();

    let mut best_priority = 0u64;
    let mut leaders = BTreeSet::new();

    for node in candidates {
        if !is_neighbor::<V>(local, slot_index, &state.previous_value, state.round_number, node) {
            continue;
        }
        let p = priority(local, slot_index, &state.previous_value, state.round_number, node);
        if p > best_priority {
            best_priority = p;
            leaders.clear();
            leaders.insert(node);
        } else if p == best_priority && p > 0 {
            leaders.insert(node);
        }
    }
    if leaders.is_empty() {
        leaders.insert(local.node_id);
    }
    state.round_leaders = leaders;
}

fn emit_nomination<V: NominationValue, D: ScpDriver<V>>(
    slot: &mut Slot<V>,
    local: &LocalNode,
    driver: &D,
) {
    let statement = ScpStatementNominate {
        quorum_set_hash: quorum_set_hash(&local.quorum_set),
        votes: slot.nomination.votes.iter().cloned().collect(),
        accepted: slot.nomination.accepted.iter().cloned().collect(),
    };
    let wire = ScpStatement::Nominate(statement);
    let bytes = serde_json::to_vec(&wire).unwrap_or_default();
    let signature = driver.sign_envelope(slot.index, &bytes);
    driver.emit_envelope(slot.index, &bytes, &signature);

    let envelope = ScpEnvelope { node_id: local.node_id, slot_index: slot.index, statement: wire, signature };
    slot.nomination_envelopes.insert(local.node_id, envelope);
}

fn quorum_set_hash(qs: &QuorumSet) -> u64 {
    let bytes = serde_json::to_vec(qs).unwrap_or_default();
    crate::hash::compute_value_hash(0, &[], 0, &bytes)
}

/// Starts or re-bumps a nomination round for `value`. Returns whether the
/// local vote/accepted set changed (and a NOMINATE statement was emitted).
pub fn nominate<V: NominationValue, D: ScpDriver<V>>(
    slot: &mut Slot<V>,
    local: &LocalNode,
    driver: &D,
    value: V,
    previous_value: &[u8],
) -> bool {
    if !slot.nomination.candidates.is_empty() {
        debug!("nomination round {} skipped: candidate already chosen", slot.nomination.round_number);
        return false;
    }
    if slot.nomination.timed_out && !slot.nomination.nomination_started {
        return false;
    }

    slot.nomination.nomination_started = true;
    slot.nomination.previous_value = previous_value.to_vec();
    slot.nomination.round_number += 1;

    update_round_leaders(&mut slot.nomination, local, slot.index);

    let mut updated = false;

    let leaders = slot.nomination.round_leaders.clone();
    for leader in &leaders {
        if let Some(envelope) = slot.nomination_envelopes.get(leader) {
            if let Some(nominate_st) = envelope.statement.as_nominate() {
                for v in nominate_st.votes.iter().chain(nominate_st.accepted.iter()) {
                    if !slot.nomination.votes.contains(v)
                        && matches!(
                            driver.validate_value(slot.index, v, true),
                            crate::value::ValidationLevel::FullyValid | crate::value::ValidationLevel::MaybeValid
                        )
                        && slot.nomination.votes.insert(v.clone())
                    {
                        driver.nominating_value(slot.index, v);
                        updated = true;
                    }
                }
            }
        }
    }

    if leaders.contains(&local.node_id) && slot.nomination.votes.is_empty() {
        driver.nominating_value(slot.index, &value);
        slot.nomination.votes.insert(value.clone());
        updated = true;
    }

    if updated {
        emit_nomination(slot, local, driver);
    } else {
        debug!("nomination round {} produced no new votes", slot.nomination.round_number);
    }
    updated
}

/// Processes an incoming NOMINATE envelope: sanity, vote/accept/confirm.
pub fn receive_envelope<V: NominationValue, D: ScpDriver<V>>(
    slot: &mut Slot<V>,
    local: &LocalNode,
    quorum_sets: &HashMap<NodeId, QuorumSet>,
    driver: &D,
    envelope: ScpEnvelope<V>,
) -> ScpResult<bool> {
    let nominate_st = match envelope.statement.as_nominate() {
        Some(st) => st.clone(),
        None => {
            return Err(ScpError::MalformedEnvelope {
                slot: slot.index,
                reason: "not a nomination statement".into(),
            })
        }
    };

    if !nominate_st.is_sane() {
        return Err(ScpError::MalformedEnvelope { slot: slot.index, reason: "nomination votes/accepted not sane".into() });
    }

    if let Some(prior) = slot.nomination_envelopes.get(&envelope.node_id) {
        if let Some(prior_st) = prior.statement.as_nominate() {
            if !prior_st.is_older_than(&nominate_st) {
                return Ok(false);
            }
        }
    }
    slot.nomination_envelopes.insert(envelope.node_id, envelope.clone());

    let mut changed = false;

    let candidate_values: Vec<V> = nominate_st.votes.iter().chain(nominate_st.accepted.iter()).cloned().collect();
    for value in candidate_values {
        if slot.nomination.accepted.contains(&value) {
            continue;
        }
        if federated_accept(slot, local, quorum_sets, &value) {
            slot.nomination.accepted.insert(value.clone());
            slot.nomination.votes.insert(value.clone());
            changed = true;
        }
    }

    // Promotion to candidate is "confirm", not "accept": it requires a true
    // quorum of peers holding the value accepted, never just a v-blocking
    // set (a v-blocking set only proves no contrary outcome can ratify, not
    // that this one has).
    let accepted_snapshot: Vec<V> = slot.nomination.accepted.iter().cloned().collect();
    for value in accepted_snapshot {
        if slot.nomination.candidates.contains(&value) {
            continue;
        }
        if federated_confirm(slot, local, quorum_sets, &value) {
            slot.nomination.candidates.insert(value.clone());
            changed = true;
        }
    }

    if changed && !slot.nomination.candidates.is_empty() {
        let composite = driver.combine_candidates(slot.index, &slot.nomination.candidates.iter().cloned().collect::<Vec<_>>());
        slot.nomination.latest_composite_candidate = Some(composite.clone());
        driver.updated_candidate_value(slot.index, &composite);
    }

    if changed {
        emit_nomination(slot, local, driver);
    }

    Ok(changed)
}

fn ratifying_nodes<V: NominationValue>(slot: &Slot<V>, mut voted_or_accepted: impl FnMut(&ScpStatementNominate<V>) -> bool) -> HashSet<NodeId> {
    slot.nomination_envelopes
        .iter()
        .filter(|(_, env)| env.statement.as_nominate().map(&mut voted_or_accepted).unwrap_or(false))
        .map(|(node, _)| *node)
        .collect()
}

/// Vote -> accept: a v-blocking set already having voted or accepted is
/// enough, since no quorum slice of ours can then ratify a contrary value.
fn federated_accept<V: NominationValue>(slot: &Slot<V>, local: &LocalNode, quorum_sets: &HashMap<NodeId, QuorumSet>, value: &V) -> bool {
    let ratifying = ratifying_nodes(slot, |st| st.votes.contains(value) || st.accepted.contains(value));

    if is_v_blocking(&local.quorum_set, &ratifying) {
        return true;
    }

    let mut full_map = quorum_sets.clone();
    full_map.insert(local.node_id, local.quorum_set.clone());
    is_quorum(&ratifying, &full_map)
}

/// Accept -> candidate ("confirm"/"ratify"): requires an actual quorum to
/// have accepted the value. Unlike `federated_accept`, a v-blocking set is
/// not sufficient here: it only proves safety, not that this value is the
/// one a quorum has settled on.
fn federated_confirm<V: NominationValue>(slot: &Slot<V>, local: &LocalNode, quorum_sets: &HashMap<NodeId, QuorumSet>, value: &V) -> bool {
    let ratifying = ratifying_nodes(slot, |st| st.accepted.contains(value));
    let mut full_map = quorum_sets.clone();
    full_map.insert(local.node_id, local.quorum_set.clone());
    is_quorum(&ratifying, &full_map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValidationLevel;
    use std::cell::RefCell;
    use test_log::test;
    use std::cmp::Ordering;

    struct NoopDriver {
        emitted: RefCell<Vec<Vec<u8>>>,
    }

    impl ScpDriver<u32> for NoopDriver {
        fn sign_envelope(&self, _slot_index: SlotIndex, _statement_bytes: &[u8]) -> Vec<u8> {
            vec![]
        }
        fn verify_envelope(&self, _node_id: NodeId, _statement_bytes: &[u8], _signature: &[u8]) -> bool {
            true
        }
        fn get_quorum_set(&self, _hash: u64) -> Option<QuorumSet> {
            None
        }
        fn emit_envelope(&self, _slot_index: SlotIndex, bytes: &[u8], _signature: &[u8]) {
            self.emitted.borrow_mut().push(bytes.to_vec());
        }
        fn validate_value(&self, _slot_index: SlotIndex, _value: &u32, _nomination: bool) -> ValidationLevel {
            ValidationLevel::FullyValid
        }
        fn combine_candidates(&self, _slot_index: SlotIndex, candidates: &[u32]) -> u32 {
            *candidates.iter().max().unwrap()
        }
        fn compare_values(&self, _slot_index: SlotIndex, _prev: &[u8], _round_number: u32, a: &u32, b: &u32) -> Ordering {
            a.cmp(b)
        }
        fn setup_timer(&self, _slot_index: SlotIndex, _timer_id: TimerId, _delay: Duration, _callback: Box<dyn FnOnce()>) {}
    }

    fn node(id: u64) -> LocalNode {
        LocalNode::new(
            NodeId::new(id),
            true,
            QuorumSet::new(2, vec![NodeId::new(1), NodeId::new(2), NodeId::new(3)], vec![]),
        )
        .unwrap()
    }

    #[test]
    fn nominate_votes_for_self_when_leader() {
        let mut slot = Slot::<u32>::new(1);
        // single-node quorum set so the local node is always its own leader
        let local = LocalNode::new(NodeId::new(1), true, QuorumSet::new(1, vec![NodeId::new(1)], vec![])).unwrap();
        let driver = NoopDriver { emitted: RefCell::new(vec![]) };

        let updated = nominate(&mut slot, &local, &driver, 42u32, &[]);
        assert!(updated);
        assert!(slot.nomination.votes.contains(&42));
        assert_eq!(driver.emitted.borrow().len(), 1);
    }

    #[test]
    fn v_blocking_votes_accept_but_do_not_yet_confirm_candidate() {
        // Two peers out of three is v-blocking for a 2-of-3 quorum set, which is
        // enough to accept a value, but accepting is not the same as a quorum
        // having ratified it: candidate promotion must still wait for that.
        let mut slot = Slot::<u32>::new(1);
        let local = node(1);
        let driver = NoopDriver { emitted: RefCell::new(vec![]) };
        let mut quorum_sets = HashMap::new();
        quorum_sets.insert(NodeId::new(2), local.quorum_set.clone());
        quorum_sets.insert(NodeId::new(3), local.quorum_set.clone());

        for peer in [2u64, 3u64] {
            let envelope = ScpEnvelope {
                node_id: NodeId::new(peer),
                slot_index: 1,
                statement: ScpStatement::Nominate(ScpStatementNominate { quorum_set_hash: 0, votes: vec![7], accepted: vec![] }),
                signature: vec![],
            };
            receive_envelope(&mut slot, &local, &quorum_sets, &driver, envelope).unwrap();
        }

        assert!(slot.nomination.accepted.contains(&7));
        assert!(!slot.nomination.candidates.contains(&7));
    }

    #[test]
    fn receiving_accept_from_a_quorum_confirms_candidate() {
        // Candidate promotion requires a strict quorum to have accepted the
        // value; a v-blocking set is not enough here, unlike the vote->accept
        // step.
        let mut slot = Slot::<u32>::new(1);
        let local = node(1);
        let driver = NoopDriver { emitted: RefCell::new(vec![]) };
        let mut quorum_sets = HashMap::new();
        quorum_sets.insert(NodeId::new(2), local.quorum_set.clone());
        quorum_sets.insert(NodeId::new(3), local.quorum_set.clone());

        for peer in [2u64, 3u64] {
            let envelope = ScpEnvelope {
                node_id: NodeId::new(peer),
                slot_index: 1,
                statement: ScpStatement::Nominate(ScpStatementNominate { quorum_set_hash: 0, votes: vec![], accepted: vec![7] }),
                signature: vec![],
            };
            receive_envelope(&mut slot, &local, &quorum_sets, &driver, envelope).unwrap();
        }

        assert!(slot.nomination.accepted.contains(&7));
        assert!(slot.nomination.candidates.contains(&7));
        assert_eq!(slot.nomination.latest_composite_candidate, Some(7));
    }

    #[test]
    fn two_node_network_cannot_accept_on_a_single_peer_vote() {
        // With quorum set {threshold: 2, [A, B]}, B's lone vote is v-blocking
        // (leaving only A, who cannot alone satisfy the threshold), so A may
        // accept on B's vote alone. But candidate promotion never happens
        // without an actual quorum, and a 2-of-2 quorum needs both A and B to
        // have accepted, so a silent B can never drive A to a candidate.
        let mut slot = Slot::<u32>::new(1);
        let local = LocalNode::new(NodeId::new(1), true, QuorumSet::new(2, vec![NodeId::new(1), NodeId::new(2)], vec![])).unwrap();
        let driver = NoopDriver { emitted: RefCell::new(vec![]) };
        let mut quorum_sets = HashMap::new();
        quorum_sets.insert(NodeId::new(2), local.quorum_set.clone());

        let envelope = ScpEnvelope {
            node_id: NodeId::new(2),
            slot_index: 1,
            statement: ScpStatement::Nominate(ScpStatementNominate { quorum_set_hash: 0, votes: vec![9], accepted: vec![] }),
            signature: vec![],
        };
        receive_envelope(&mut slot, &local, &quorum_sets, &driver, envelope).unwrap();

        assert!(slot.nomination.accepted.contains(&9));
        assert!(slot.nomination.candidates.is_empty());
        assert_eq!(slot.nomination.latest_composite_candidate, None);
    }

    #[test]
    fn malformed_statement_is_rejected() {
        let mut slot = Slot::<u32>::new(1);
        let local = node(1);
        let driver = NoopDriver { emitted: RefCell::new(vec![]) };
        let envelope = ScpEnvelope {
            node_id: NodeId::new(2),
            slot_index: 1,
            statement: ScpStatement::Nominate(ScpStatementNominate { quorum_set_hash: 0, votes: vec![], accepted: vec![] }),
            signature: vec![],
        };
        let result = receive_envelope(&mut slot, &local, &HashMap::new(), &driver, envelope);
        assert!(result.is_err());
    }
}
