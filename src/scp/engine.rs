//! Top-level engine: owns the local node's identity, the per-slot state,
//! and the table of known quorum sets, and routes incoming envelopes to the
//! nomination or ballot protocol. Grounded on the teacher's `SCP` trait and
//! `SlotDriver`, collapsed into a single owner since the engine runs on one
//! thread with no locks (see the ambient concurrency notes in `crate::scp`).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use log::warn;

use crate::error::{ScpError, ScpResult};
use crate::value::NominationValue;

use super::ballot_protocol;
use super::driver::{ScpDriver, TimerId};
use super::local_node::LocalNode;
use super::node_id::NodeId;
use super::nomination_protocol;
use super::quorum_set::QuorumSet;
use super::slot::{Slot, SlotIndex};
use super::statement::{ScpEnvelope, ScpStatement};

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum EnvelopeState {
    Valid,
    Invalid,
    SkippedSelf,
}

pub struct ScpEngine<V: NominationValue, D: ScpDriver<V>> {
    pub local_node: LocalNode,
    pub driver: D,
    slots: HashMap<SlotIndex, Slot<V>>,
    known_quorum_sets: HashMap<NodeId, QuorumSet>,
}

impl<V: NominationValue, D: ScpDriver<V>> ScpEngine<V, D> {
    pub fn new(local_node: LocalNode, driver: D) -> Self {
        ScpEngine { local_node, driver, slots: HashMap::new(), known_quorum_sets: HashMap::new() }
    }

    fn slot_mut(&mut self, slot_index: SlotIndex) -> &mut Slot<V> {
        self.slots.entry(slot_index).or_insert_with(|| Slot::new(slot_index))
    }

    pub fn slot(&self, slot_index: SlotIndex) -> Option<&Slot<V>> {
        self.slots.get(&slot_index)
    }

    pub fn is_validator(&self) -> bool {
        self.local_node.is_validator
    }

    /// Whether a v-blocking set of peers has reported state for `slot_index`.
    pub fn got_v_blocking(&self, slot_index: SlotIndex) -> bool {
        let slot = match self.slots.get(&slot_index) {
            Some(s) => s,
            None => return false,
        };
        let reporters: std::collections::HashSet<NodeId> =
            slot.ballot_envelopes.keys().chain(slot.nomination_envelopes.keys()).copied().collect();
        super::federated_voting::is_v_blocking(&self.local_node.quorum_set, &reporters)
    }

    pub fn is_slot_fully_validated(&self, slot_index: SlotIndex) -> bool {
        self.slots.get(&slot_index).map(|s| s.fully_validated).unwrap_or(false)
    }

    /// Drops every slot at or below `slot_to_keep`, up to `max_slot_index`.
    pub fn purge_slots(&mut self, max_slot_index: SlotIndex, slot_to_keep: SlotIndex) {
        self.slots.retain(|&index, _| index > slot_to_keep || index > max_slot_index);
    }

    /// The self-originated envelopes cached for `slot_index` — the latest
    /// NOMINATE and/or ballot-phase statement this node has sent — for the
    /// host to reflood to peers that might have missed them.
    pub fn get_latest_messages_send(&self, slot_index: SlotIndex) -> Vec<ScpEnvelope<V>> {
        let slot = match self.slots.get(&slot_index) {
            Some(s) => s,
            None => return Vec::new(),
        };
        slot.nomination_envelopes
            .get(&self.local_node.node_id)
            .cloned()
            .into_iter()
            .chain(slot.ballot_envelopes.get(&self.local_node.node_id).cloned())
            .collect()
    }

    /// Restores a previously-seen envelope into a slot's per-node cache
    /// without re-running the vote/accept/confirm pipeline, for a host
    /// resuming from persisted state rather than replaying the network.
    pub fn set_state_from_envelope(&mut self, slot_index: SlotIndex, envelope: ScpEnvelope<V>) {
        let slot = self.slot_mut(slot_index);
        match &envelope.statement {
            ScpStatement::Nominate(_) => {
                slot.nomination_envelopes.insert(envelope.node_id, envelope);
            }
            ScpStatement::Prepare(_) | ScpStatement::Confirm(_) | ScpStatement::Externalize(_) => {
                slot.ballot_envelopes.insert(envelope.node_id, envelope);
            }
        }
    }

    /// This node's EXTERNALIZE envelope for `slot_index`, once the slot has
    /// externalized; `None` beforehand, or if this node never sent one.
    pub fn get_externalizing_state(&self, slot_index: SlotIndex) -> Option<ScpEnvelope<V>> {
        let slot = self.slots.get(&slot_index)?;
        if !slot.is_externalized() {
            return None;
        }
        slot.ballot_envelopes.get(&self.local_node.node_id).cloned()
    }

    fn resolve_quorum_set(&mut self, hash: u64) -> Option<QuorumSet> {
        if let Some(qs) = self.known_quorum_sets.values().find(|qs| {
            let bytes = serde_json::to_vec(*qs).unwrap_or_default();
            crate::hash::compute_value_hash(0, &[], 0, &bytes) == hash
        }) {
            return Some(qs.clone());
        }
        self.driver.get_quorum_set(hash)
    }

    pub fn nominate(&mut self, slot_index: SlotIndex, value: V, previous_value: &[u8]) -> bool {
        let local = self.local_node.clone();
        let slot = self.slots.entry(slot_index).or_insert_with(|| Slot::new(slot_index));
        nomination_protocol::nominate(slot, &local, &self.driver, value, previous_value)
    }

    pub fn stop_nomination(&mut self, slot_index: SlotIndex) {
        if let Some(slot) = self.slots.get_mut(&slot_index) {
            slot.nomination.nomination_started = false;
        }
    }

    pub fn receive_envelope(&mut self, envelope: ScpEnvelope<V>) -> EnvelopeState {
        if envelope.node_id == self.local_node.node_id {
            return EnvelopeState::SkippedSelf;
        }

        let bytes = serde_json::to_vec(&envelope.statement).unwrap_or_default();
        if !self.driver.verify_envelope(envelope.node_id, &bytes, &envelope.signature) {
            warn!("rejecting envelope from {}: signature does not verify", envelope.node_id);
            return EnvelopeState::Invalid;
        }

        let quorum_set = match self.resolve_quorum_set(envelope.statement.quorum_set_hash()) {
            Some(qs) => qs,
            None => {
                warn!("rejecting envelope from {}: unknown quorum set hash", envelope.node_id);
                return EnvelopeState::Invalid;
            }
        };
        self.known_quorum_sets.insert(envelope.node_id, quorum_set);

        let slot_index = envelope.slot_index;
        let local = self.local_node.clone();
        let quorum_sets = self.known_quorum_sets.clone();
        let slot = self.slots.entry(slot_index).or_insert_with(|| Slot::new(slot_index));

        let result: ScpResult<bool> = match &envelope.statement {
            ScpStatement::Nominate(_) => {
                nomination_protocol::receive_envelope(slot, &local, &quorum_sets, &self.driver, envelope)
            }
            ScpStatement::Prepare(_) | ScpStatement::Confirm(_) | ScpStatement::Externalize(_) => {
                ballot_protocol::receive_envelope(slot, &local, &quorum_sets, &self.driver, envelope)
            }
        };

        match result {
            Ok(_) => EnvelopeState::Valid,
            Err(ScpError::InvariantViolation { slot, reason }) => {
                panic!("ballot protocol invariant violated in slot {slot}: {reason}")
            }
            Err(_) => EnvelopeState::Invalid,
        }
    }

    /// Hands the nomination protocol's composite candidate to the ballot
    /// protocol once one becomes available. The host calls this after
    /// `receive_envelope`/`nominate` report a change, mirroring the
    /// reference implementation's "bubble up" from nomination to ballot.
    pub fn drive_ballot_from_nomination(&mut self, slot_index: SlotIndex) -> ScpResult<bool> {
        let candidate = match self.slots.get(&slot_index).and_then(|s| s.nomination.latest_composite_candidate.clone()) {
            Some(v) => v,
            None => return Ok(false),
        };
        let local = self.local_node.clone();
        let slot = self.slots.entry(slot_index).or_insert_with(|| Slot::new(slot_index));
        ballot_protocol::bump_state(slot, &local, &self.driver, candidate)
    }
}

/// Re-entrant timer arming for nomination retries, mirroring the teacher's
/// weak-self timer closures: a `Weak` handle back into the engine lets the
/// callback re-nominate without keeping the engine alive past its owner.
/// Requires shared ownership (`Rc<RefCell<ScpEngine<..>>>`) since a plain
/// `&mut` borrow cannot outlive the call that arms the timer.
pub fn nominate_with_retry<V, D>(engine: &Rc<RefCell<ScpEngine<V, D>>>, slot_index: SlotIndex, value: V, previous_value: Vec<u8>)
where
    V: NominationValue + 'static,
    D: ScpDriver<V> + 'static,
{
    let round_number = {
        let mut eng = engine.borrow_mut();
        eng.nominate(slot_index, value.clone(), &previous_value);
        eng.slots.get(&slot_index).map(|s| s.nomination.round_number).unwrap_or(1)
    };

    let weak: Weak<RefCell<ScpEngine<V, D>>> = Rc::downgrade(engine);
    let timeout = engine.borrow().driver.compute_timeout(round_number);
    let retry_value = value;
    let retry_previous = previous_value;

    engine.borrow().driver.setup_timer(
        slot_index,
        TimerId::Nomination,
        timeout,
        Box::new(move || {
            if let Some(strong) = weak.upgrade() {
                nominate_with_retry(&strong, slot_index, retry_value, retry_previous);
            }
        }),
    );
}
