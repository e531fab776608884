//! The three-phase ballot state machine (PREPARE -> CONFIRM -> EXTERNALIZE).
//! Grounded on the teacher's `BallotProtocolState`/`BallotProtocol` pair,
//! replacing its `todo!()` bodies with the accept/confirm predicates and the
//! v-blocking bump described by the reference implementation's `attemptBump`.

use std::collections::{BTreeSet, HashMap, HashSet};

use log::debug;

use crate::error::{ScpError, ScpResult};
use crate::value::NominationValue;

use super::ballot::ScpBallot;
use super::driver::ScpDriver;
use super::federated_voting::{is_quorum, is_v_blocking};
use super::local_node::LocalNode;
use super::node_id::NodeId;
use super::quorum_set::QuorumSet;
use super::slot::{Slot, SlotIndex};
use super::statement::{
    ScpEnvelope, ScpStatement, ScpStatementConfirm, ScpStatementExternalize, ScpStatementPrepare,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ScpPhase {
    Prepare,
    Confirm,
    Externalize,
}

pub struct BallotProtocolState<V: NominationValue> {
    pub phase: ScpPhase,
    pub current_ballot: Option<ScpBallot<V>>,
    pub prepared: Option<ScpBallot<V>>,
    pub prepared_prime: Option<ScpBallot<V>>,
    pub high_ballot: Option<ScpBallot<V>>,
    pub commit: Option<ScpBallot<V>>,
    pub value_override: Option<V>,
    pub heard_from_quorum: bool,
    pub heard_from_quorum_at_counter: u32,
}

impl<V: NominationValue> Default for BallotProtocolState<V> {
    fn default() -> Self {
        BallotProtocolState {
            phase: ScpPhase::Prepare,
            current_ballot: None,
            prepared: None,
            prepared_prime: None,
            high_ballot: None,
            commit: None,
            value_override: None,
            heard_from_quorum: false,
            heard_from_quorum_at_counter: 0,
        }
    }
}

impl<V: NominationValue> BallotProtocolState<V> {
    pub fn is_externalized(&self) -> bool {
        self.phase == ScpPhase::Externalize
    }

    /// Aborts the process on the first broken invariant, the way the
    /// teacher's `check_invariants` does via `assert!`.
    pub fn check_invariants(&self, slot_index: SlotIndex) -> ScpResult<()> {
        match self.phase {
            ScpPhase::Prepare => {}
            ScpPhase::Confirm | ScpPhase::Externalize => {
                if self.current_ballot.is_none() || self.commit.is_none() || self.high_ballot.is_none() {
                    return Err(invariant(slot_index, "confirm/externalize phase missing required ballots"));
                }
            }
        }
        if let Some(cur) = &self.current_ballot {
            if cur.counter == 0 {
                return Err(invariant(slot_index, "current ballot counter is zero"));
            }
        }
        if let (Some(p), Some(pp)) = (&self.prepared, &self.prepared_prime) {
            let ok = if pp.compatible(p) { pp <= p } else { pp.counter < p.counter };
            if !ok {
                return Err(invariant(slot_index, "prepared_prime must precede prepared"));
            }
        }
        if let (Some(h), Some(cur)) = (&self.high_ballot, &self.current_ballot) {
            if !h.less_and_compatible(cur) {
                return Err(invariant(slot_index, "high ballot must precede and match the current ballot"));
            }
        }
        if let (Some(c), Some(h)) = (&self.commit, &self.high_ballot) {
            if !c.less_and_compatible(h) {
                return Err(invariant(slot_index, "commit must precede and match the high ballot"));
            }
        }
        Ok(())
    }
}

fn invariant(slot_index: SlotIndex, reason: &str) -> ScpError {
    ScpError::InvariantViolation { slot: slot_index, reason: reason.to_string() }
}

fn quorum_set_hash(qs: &QuorumSet) -> u64 {
    let bytes = serde_json::to_vec(qs).unwrap_or_default();
    crate::hash::compute_value_hash(0, &[], 0, &bytes)
}

/// Emits the statement implied by the current state, recording it as the
/// last envelope sent for this slot.
fn emit<V: NominationValue, D: ScpDriver<V>>(slot: &mut Slot<V>, local: &LocalNode, driver: &D) {
    let statement = match slot.ballot.phase {
        ScpPhase::Prepare => {
            let ballot = slot.ballot.current_ballot.clone().expect("prepare phase has a current ballot");
            ScpStatement::Prepare(ScpStatementPrepare {
                quorum_set_hash: quorum_set_hash(&local.quorum_set),
                ballot,
                prepared: slot.ballot.prepared.clone(),
                prepared_prime: slot.ballot.prepared_prime.clone(),
                n_c: slot.ballot.commit.as_ref().map(|b| b.counter).unwrap_or(0),
                n_h: slot.ballot.high_ballot.as_ref().map(|b| b.counter).unwrap_or(0),
            })
        }
        ScpPhase::Confirm => {
            let high = slot.ballot.high_ballot.clone().expect("confirm phase has a high ballot");
            ScpStatement::Confirm(ScpStatementConfirm {
                quorum_set_hash: quorum_set_hash(&local.quorum_set),
                ballot: high.clone(),
                n_prepared: slot.ballot.prepared.as_ref().map(|b| b.counter).unwrap_or(0),
                n_commit: slot.ballot.commit.as_ref().map(|b| b.counter).unwrap_or(0),
                n_h: high.counter,
            })
        }
        ScpPhase::Externalize => {
            let commit = slot.ballot.commit.clone().expect("externalize phase has a commit");
            let high = slot.ballot.high_ballot.clone().expect("externalize phase has a high ballot");
            ScpStatement::Externalize(ScpStatementExternalize {
                commit,
                n_h: high.counter,
                commit_quorum_set_hash: quorum_set_hash(&local.quorum_set),
            })
        }
    };

    let bytes = serde_json::to_vec(&statement).unwrap_or_default();
    let signature = driver.sign_envelope(slot.index, &bytes);
    driver.emit_envelope(slot.index, &bytes, &signature);
    let envelope = ScpEnvelope { node_id: local.node_id, slot_index: slot.index, statement, signature };
    slot.ballot_envelopes.insert(local.node_id, envelope);
}

/// Starts the ballot protocol, or bumps the current ballot's counter, for
/// `value`. Called once the nomination protocol has a composite candidate,
/// or when the ballot timer expires.
pub fn bump_state<V: NominationValue, D: ScpDriver<V>>(
    slot: &mut Slot<V>,
    local: &LocalNode,
    driver: &D,
    value: V,
) -> ScpResult<bool> {
    if slot.ballot.phase == ScpPhase::Externalize {
        return Ok(false);
    }
    let next_value = slot.ballot.value_override.clone().unwrap_or(value);
    let next_counter = slot.ballot.current_ballot.as_ref().map(|b| b.counter + 1).unwrap_or(1);
    let new_ballot = ScpBallot::new(next_counter, next_value);

    slot.ballot.current_ballot = Some(new_ballot.clone());
    slot.ballot.check_invariants(slot.index)?;
    driver.started_ballot_protocol(slot.index, &new_ballot);
    emit(slot, local, driver);
    Ok(true)
}

fn ratifiers<V: NominationValue>(slot: &Slot<V>, mut votes_or_accepts: impl FnMut(&ScpEnvelope<V>) -> bool) -> HashSet<NodeId> {
    slot.ballot_envelopes
        .iter()
        .filter(|(_, env)| votes_or_accepts(env))
        .map(|(node, _)| *node)
        .collect()
}

/// `voted_or_accepted` drives the quorum branch, `accepted` the v-blocking
/// branch: a v-blocking set only proves safety when every node in it has
/// actually accepted the value, not merely voted for it (a node that has
/// voted prepare(q) but not yet accepted it may still end up ratifying
/// something incompatible with q).
fn federated_accept<V: NominationValue>(
    local: &LocalNode,
    quorum_sets: &HashMap<NodeId, QuorumSet>,
    voted_or_accepted: &HashSet<NodeId>,
    accepted: &HashSet<NodeId>,
) -> bool {
    if is_v_blocking(&local.quorum_set, accepted) {
        return true;
    }
    let mut full_map = quorum_sets.clone();
    full_map.insert(local.node_id, local.quorum_set.clone());
    is_quorum(voted_or_accepted, &full_map)
}

/// Step 1/5: accept-prepared for `candidate` iff a quorum votes-or-accepts,
/// or a v-blocking set has already accepted, prepare(candidate).
pub fn attempt_accept_prepared<V: NominationValue>(
    slot: &Slot<V>,
    local: &LocalNode,
    quorum_sets: &HashMap<NodeId, QuorumSet>,
    candidate: &ScpBallot<V>,
) -> bool {
    let voted_or_accepted = |env: &ScpEnvelope<V>| match &env.statement {
        ScpStatement::Prepare(st) => {
            (st.ballot.counter >= candidate.counter && st.ballot.compatible(candidate))
                || st.prepared.as_ref().map(|p| p.counter >= candidate.counter && p.compatible(candidate)).unwrap_or(false)
        }
        ScpStatement::Confirm(st) => st.ballot.compatible(candidate) && st.ballot.counter >= candidate.counter,
        ScpStatement::Externalize(st) => st.commit.compatible(candidate),
        ScpStatement::Nominate(_) => false,
    };
    let accepted = |env: &ScpEnvelope<V>| match &env.statement {
        ScpStatement::Prepare(st) => {
            st.prepared.as_ref().map(|p| p.counter >= candidate.counter && p.compatible(candidate)).unwrap_or(false)
        }
        ScpStatement::Confirm(st) => st.ballot.compatible(candidate) && st.ballot.counter >= candidate.counter,
        ScpStatement::Externalize(st) => st.commit.compatible(candidate),
        ScpStatement::Nominate(_) => false,
    };
    federated_accept::<V>(local, quorum_sets, &ratifiers(slot, voted_or_accepted), &ratifiers(slot, accepted))
}

/// Records `candidate` as newly accepted-prepared, sliding the previous
/// `prepared` into `prepared_prime` when the two are incompatible, and
/// dropping a stale commit that no longer agrees with the new value.
pub fn set_accept_prepared<V: NominationValue, D: ScpDriver<V>>(
    slot: &mut Slot<V>,
    local: &LocalNode,
    driver: &D,
    candidate: ScpBallot<V>,
) -> ScpResult<bool> {
    if let Some(prepared) = &slot.ballot.prepared {
        if *prepared >= candidate {
            return Ok(false);
        }
        if !prepared.compatible(&candidate) {
            slot.ballot.prepared_prime = Some(prepared.clone());
        }
    }
    slot.ballot.prepared = Some(candidate.clone());

    if let Some(commit) = &slot.ballot.commit {
        if commit.counter == candidate.counter && !commit.compatible(&candidate) {
            slot.ballot.commit = None;
        }
    }

    driver.accepted_ballot_prepared(slot.index, &candidate);
    slot.ballot.check_invariants(slot.index)?;
    emit(slot, local, driver);
    Ok(true)
}

/// Step 2/3/8: confirm-prepared once a quorum accepts prepare(p).
pub fn attempt_confirm_prepared<V: NominationValue>(
    slot: &Slot<V>,
    local: &LocalNode,
    quorum_sets: &HashMap<NodeId, QuorumSet>,
) -> Option<ScpBallot<V>> {
    let prepared = slot.ballot.prepared.clone()?;
    let accepts = |env: &ScpEnvelope<V>| match &env.statement {
        ScpStatement::Prepare(st) => st.prepared.as_ref().map(|p| p.counter >= prepared.counter && p.compatible(&prepared)).unwrap_or(false),
        ScpStatement::Confirm(st) => st.n_prepared >= prepared.counter && st.ballot.compatible(&prepared),
        ScpStatement::Externalize(st) => st.commit.compatible(&prepared),
        ScpStatement::Nominate(_) => false,
    };

    let mut full_map = quorum_sets.clone();
    full_map.insert(local.node_id, local.quorum_set.clone());
    let ratifying = ratifiers(slot, accepts);
    is_quorum(&ratifying, &full_map).then_some(prepared)
}

pub fn set_confirm_prepared<V: NominationValue, D: ScpDriver<V>>(
    slot: &mut Slot<V>,
    local: &LocalNode,
    driver: &D,
    confirmed: ScpBallot<V>,
) -> ScpResult<bool> {
    if slot.ballot.phase != ScpPhase::Prepare {
        return Ok(false);
    }
    slot.ballot.high_ballot = Some(confirmed.clone());
    if slot.ballot.commit.is_none() {
        if let Some(current) = &slot.ballot.current_ballot {
            if current.compatible(&confirmed) {
                slot.ballot.commit = Some(confirmed.clone());
            }
        }
    }
    driver.confirmed_ballot_prepared(slot.index, &confirmed);
    slot.ballot.check_invariants(slot.index)?;
    emit(slot, local, driver);
    Ok(true)
}

/// Step 4/6: accept-commit for `candidate` iff a quorum or v-blocking set
/// has accepted commit(candidate). Every statement this predicate matches
/// (Confirm or Externalize) already implies the node accepted commit, not
/// merely voted for it, so the voted-or-accepted and accepted sets coincide
/// here.
pub fn attempt_accept_commit<V: NominationValue>(
    slot: &Slot<V>,
    local: &LocalNode,
    quorum_sets: &HashMap<NodeId, QuorumSet>,
    candidate: &ScpBallot<V>,
) -> bool {
    let accepted = |env: &ScpEnvelope<V>| match &env.statement {
        ScpStatement::Confirm(st) => st.ballot.compatible(candidate) && st.n_commit <= candidate.counter && st.n_h >= candidate.counter,
        ScpStatement::Externalize(st) => st.commit.compatible(candidate) && st.commit.counter <= candidate.counter,
        _ => false,
    };
    let ratifying = ratifiers(slot, accepted);
    federated_accept::<V>(local, quorum_sets, &ratifying, &ratifying)
}

pub fn set_accept_commit<V: NominationValue, D: ScpDriver<V>>(
    slot: &mut Slot<V>,
    local: &LocalNode,
    driver: &D,
    candidate: ScpBallot<V>,
) -> ScpResult<bool> {
    slot.ballot.commit = Some(candidate.clone());
    slot.ballot.high_ballot = Some(candidate.clone());
    slot.ballot.phase = ScpPhase::Confirm;
    driver.accepted_commit(slot.index, &candidate);
    slot.ballot.check_invariants(slot.index)?;
    emit(slot, local, driver);
    Ok(true)
}

/// Step 7/9: confirm-commit once a quorum has accepted commit(candidate).
pub fn attempt_confirm_commit<V: NominationValue>(
    slot: &Slot<V>,
    local: &LocalNode,
    quorum_sets: &HashMap<NodeId, QuorumSet>,
) -> Option<ScpBallot<V>> {
    let commit = slot.ballot.commit.clone()?;
    let accepts = |env: &ScpEnvelope<V>| match &env.statement {
        ScpStatement::Confirm(st) => st.n_commit <= commit.counter && st.ballot.compatible(&commit),
        ScpStatement::Externalize(st) => st.commit.compatible(&commit) && st.commit.counter <= commit.counter,
        _ => false,
    };
    let mut full_map = quorum_sets.clone();
    full_map.insert(local.node_id, local.quorum_set.clone());
    is_quorum(&ratifiers(slot, accepts), &full_map).then_some(commit)
}

pub fn set_confirm_commit<V: NominationValue, D: ScpDriver<V>>(
    slot: &mut Slot<V>,
    local: &LocalNode,
    driver: &D,
    commit: ScpBallot<V>,
) -> ScpResult<bool> {
    slot.ballot.commit = Some(commit.clone());
    slot.ballot.high_ballot = Some(commit.clone());
    slot.ballot.current_ballot = Some(commit.clone());
    slot.ballot.phase = ScpPhase::Externalize;
    slot.ballot.check_invariants(slot.index)?;
    emit(slot, local, driver);
    driver.value_externalized(slot.index, &commit.value);
    Ok(true)
}

/// Jumps the current ballot's counter forward to the smallest counter held
/// by a v-blocking set of peers that is strictly ahead of ours, per step 9
/// of the federated voting paper's liveness argument.
pub fn attempt_bump<V: NominationValue>(slot: &Slot<V>, local: &LocalNode) -> Option<u32> {
    if slot.ballot.phase == ScpPhase::Externalize {
        return None;
    }
    let local_counter = slot.ballot.current_ballot.as_ref().map(|b| b.counter).unwrap_or(0);

    let ahead: HashSet<NodeId> = slot
        .ballot_envelopes
        .iter()
        .filter(|(_, env)| env.statement.ballot_counter() > local_counter)
        .map(|(node, _)| *node)
        .collect();

    if !is_v_blocking(&local.quorum_set, &ahead) {
        return None;
    }

    let mut candidate_counters = BTreeSet::new();
    for env in slot.ballot_envelopes.values() {
        let counter = env.statement.ballot_counter();
        if counter > local_counter {
            candidate_counters.insert(counter);
        }
    }

    for counter in candidate_counters {
        let ahead_of_counter: HashSet<NodeId> = slot
            .ballot_envelopes
            .iter()
            .filter(|(_, env)| env.statement.ballot_counter() >= counter)
            .map(|(node, _)| *node)
            .collect();
        if is_v_blocking(&local.quorum_set, &ahead_of_counter) {
            return Some(counter);
        }
    }
    None
}

/// Whether a quorum of peers has a current ballot counter at or above ours;
/// used to decide whether to keep the timer armed.
pub fn heard_from_quorum<V: NominationValue>(
    slot: &Slot<V>,
    local: &LocalNode,
    quorum_sets: &HashMap<NodeId, QuorumSet>,
) -> bool {
    let local_counter = match &slot.ballot.current_ballot {
        Some(b) => b.counter,
        None => return false,
    };
    let at_or_above: HashSet<NodeId> = slot
        .ballot_envelopes
        .iter()
        .filter(|(_, env)| env.statement.ballot_counter() >= local_counter)
        .map(|(node, _)| *node)
        .collect();
    let mut full_map = quorum_sets.clone();
    full_map.insert(local.node_id, local.quorum_set.clone());
    is_quorum(&at_or_above, &full_map)
}

/// Drives the state machine forward as far as the current envelope cache
/// allows, in the fixed order the reference implementation's `advanceSlot`
/// follows: bump, accept/confirm prepared, accept/confirm commit.
pub fn advance<V: NominationValue, D: ScpDriver<V>>(
    slot: &mut Slot<V>,
    local: &LocalNode,
    quorum_sets: &HashMap<NodeId, QuorumSet>,
    driver: &D,
) -> ScpResult<bool> {
    let mut progressed = false;

    if let Some(new_counter) = attempt_bump(slot, local) {
        if let Some(current) = &slot.ballot.current_ballot {
            let bumped = ScpBallot::new(new_counter, current.value.clone());
            slot.ballot.current_ballot = Some(bumped);
            slot.ballot.check_invariants(slot.index)?;
            emit(slot, local, driver);
            progressed = true;
        }
    }

    if slot.ballot.phase == ScpPhase::Prepare {
        if let Some(current) = slot.ballot.current_ballot.clone() {
            if attempt_accept_prepared(slot, local, quorum_sets, &current) {
                progressed |= set_accept_prepared(slot, local, driver, current)?;
            }
        }
        if let Some(confirmed) = attempt_confirm_prepared(slot, local, quorum_sets) {
            progressed |= set_confirm_prepared(slot, local, driver, confirmed)?;
        }
    }

    if slot.ballot.phase != ScpPhase::Externalize {
        if let Some(high) = slot.ballot.high_ballot.clone() {
            if attempt_accept_commit(slot, local, quorum_sets, &high) {
                progressed |= set_accept_commit(slot, local, driver, high)?;
            }
        }
    }

    if slot.ballot.phase == ScpPhase::Confirm {
        if let Some(confirmed) = attempt_confirm_commit(slot, local, quorum_sets) {
            progressed |= set_confirm_commit(slot, local, driver, confirmed)?;
        }
    }

    if heard_from_quorum(slot, local, quorum_sets) && !slot.ballot.heard_from_quorum {
        slot.ballot.heard_from_quorum = true;
        if let Some(current) = &slot.ballot.current_ballot {
            driver.ballot_did_hear_from_quorum(slot.index, current);
        }
    }

    Ok(progressed)
}

/// Validates and ingests an incoming ballot-protocol envelope, then drives
/// the state machine as far as it will go.
pub fn receive_envelope<V: NominationValue, D: ScpDriver<V>>(
    slot: &mut Slot<V>,
    local: &LocalNode,
    quorum_sets: &HashMap<NodeId, QuorumSet>,
    driver: &D,
    envelope: ScpEnvelope<V>,
) -> ScpResult<bool> {
    sanity_check(slot.index, &envelope.statement)?;

    if let Some(prior) = slot.ballot_envelopes.get(&envelope.node_id) {
        if prior.statement.ballot_counter() >= envelope.statement.ballot_counter() {
            debug!("stale ballot envelope from {:?} ignored", envelope.node_id);
            return Ok(false);
        }
    }
    slot.ballot_envelopes.insert(envelope.node_id, envelope);
    advance(slot, local, quorum_sets, driver)
}

fn sanity_check<V: NominationValue>(slot_index: SlotIndex, statement: &ScpStatement<V>) -> ScpResult<()> {
    match statement {
        ScpStatement::Prepare(st) => {
            if st.n_c > st.n_h || st.n_h > st.ballot.counter {
                return Err(ScpError::MalformedEnvelope { slot: slot_index, reason: "prepare counters out of order".into() });
            }
        }
        ScpStatement::Confirm(st) => {
            if st.n_prepared > st.n_commit || st.n_commit > st.n_h || st.n_h > st.ballot.counter {
                return Err(ScpError::MalformedEnvelope { slot: slot_index, reason: "confirm counters out of order".into() });
            }
        }
        ScpStatement::Externalize(st) => {
            if st.commit.counter > st.n_h {
                return Err(ScpError::MalformedEnvelope { slot: slot_index, reason: "externalize counters out of order".into() });
            }
        }
        ScpStatement::Nominate(_) => {
            return Err(ScpError::MalformedEnvelope { slot: slot_index, reason: "not a ballot statement".into() })
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValidationLevel;
    use std::cell::RefCell;
    use test_log::test;
    use std::cmp::Ordering;
    use std::time::Duration;

    struct NoopDriver {
        externalized: RefCell<Vec<u32>>,
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
        fn emit_envelope(&self, _slot_index: SlotIndex, _bytes: &[u8], _signature: &[u8]) {}
        fn validate_value(&self, _slot_index: SlotIndex, _value: &u32, _nomination: bool) -> ValidationLevel {
            ValidationLevel::FullyValid
        }
        fn combine_candidates(&self, _slot_index: SlotIndex, candidates: &[u32]) -> u32 {
            *candidates.iter().max().unwrap()
        }
        fn compare_values(&self, _slot_index: SlotIndex, _prev: &[u8], _round_number: u32, a: &u32, b: &u32) -> Ordering {
            a.cmp(b)
        }
        fn setup_timer(&self, _slot_index: SlotIndex, _timer_id: super::super::driver::TimerId, _delay: Duration, _callback: Box<dyn FnOnce()>) {}
        fn value_externalized(&self, _slot_index: SlotIndex, value: &u32) {
            self.externalized.borrow_mut().push(*value);
        }
    }

    fn three_node_quorum_set() -> QuorumSet {
        QuorumSet::new(2, vec![NodeId::new(1), NodeId::new(2), NodeId::new(3)], vec![])
    }

    fn envelope(node: u64, statement: ScpStatement<u32>) -> ScpEnvelope<u32> {
        ScpEnvelope { node_id: NodeId::new(node), slot_index: 1, statement, signature: vec![] }
    }

    fn two_node_quorum_set() -> QuorumSet {
        QuorumSet::new(2, vec![NodeId::new(1), NodeId::new(2)], vec![])
    }

    #[test]
    fn voting_without_accepting_does_not_v_block_accept_prepared() {
        // A single peer's PREPARE(ballot >= candidate) is a vote, not yet an
        // accept (its `prepared` field is still None). With threshold 2 of
        // {1, 2}, that one vote is v-blocking by count alone, but it must
        // not be enough to drive local accept-prepared.
        let local = LocalNode::new(NodeId::new(1), true, two_node_quorum_set()).unwrap();
        let mut quorum_sets = HashMap::new();
        quorum_sets.insert(NodeId::new(2), two_node_quorum_set());

        let mut slot = Slot::<u32>::new(1);
        let candidate = ScpBallot::new(1, 9u32);
        slot.ballot_envelopes.insert(
            NodeId::new(2),
            envelope(
                2,
                ScpStatement::Prepare(ScpStatementPrepare {
                    quorum_set_hash: 0,
                    ballot: candidate.clone(),
                    prepared: None,
                    prepared_prime: None,
                    n_c: 0,
                    n_h: 0,
                }),
            ),
        );

        assert!(!attempt_accept_prepared(&slot, &local, &quorum_sets, &candidate));
    }

    #[test]
    fn three_nodes_externalize_the_same_value() {
        let local = LocalNode::new(NodeId::new(1), true, three_node_quorum_set()).unwrap();
        let mut quorum_sets = HashMap::new();
        quorum_sets.insert(NodeId::new(2), three_node_quorum_set());
        quorum_sets.insert(NodeId::new(3), three_node_quorum_set());
        let driver = NoopDriver { externalized: RefCell::new(vec![]) };

        let mut slot = Slot::<u32>::new(1);
        bump_state(&mut slot, &local, &driver, 9u32).unwrap();

        let ballot = slot.ballot.current_ballot.clone().unwrap();
        for peer in [2u64, 3u64] {
            receive_envelope(
                &mut slot,
                &local,
                &quorum_sets,
                &driver,
                envelope(
                    peer,
                    ScpStatement::Confirm(ScpStatementConfirm {
                        quorum_set_hash: 0,
                        ballot: ballot.clone(),
                        n_prepared: ballot.counter,
                        n_commit: ballot.counter,
                        n_h: ballot.counter,
                    }),
                ),
            )
            .unwrap();
        }

        assert_eq!(slot.ballot.phase, ScpPhase::Externalize);
        assert_eq!(driver.externalized.borrow().as_slice(), &[9]);
    }

    #[test]
    fn v_blocking_peers_bump_the_local_counter() {
        let local = LocalNode::new(NodeId::new(1), true, three_node_quorum_set()).unwrap();
        let driver = NoopDriver { externalized: RefCell::new(vec![]) };
        let mut slot = Slot::<u32>::new(1);
        bump_state(&mut slot, &local, &driver, 1u32).unwrap();

        for peer in [2u64, 3u64] {
            slot.ballot_envelopes.insert(
                NodeId::new(peer),
                envelope(
                    peer,
                    ScpStatement::Prepare(ScpStatementPrepare {
                        quorum_set_hash: 0,
                        ballot: ScpBallot::new(5, 1u32),
                        prepared: None,
                        prepared_prime: None,
                        n_c: 0,
                        n_h: 0,
                    }),
                ),
            );
        }

        let bumped = attempt_bump(&slot, &local);
        assert_eq!(bumped, Some(5));
    }

    #[test]
    fn malformed_confirm_is_rejected() {
        let local = LocalNode::new(NodeId::new(1), true, three_node_quorum_set()).unwrap();
        let driver = NoopDriver { externalized: RefCell::new(vec![]) };
        let mut slot = Slot::<u32>::new(1);

        let result = receive_envelope(
            &mut slot,
            &local,
            &HashMap::new(),
            &driver,
            envelope(
                2,
                ScpStatement::Confirm(ScpStatementConfirm {
                    quorum_set_hash: 0,
                    ballot: ScpBallot::new(1, 1u32),
                    n_prepared: 5,
                    n_commit: 1,
                    n_h: 1,
                }),
            ),
        );
        assert!(result.is_err());
    }
}
