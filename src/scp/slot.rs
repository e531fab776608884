//! A single slot's state: its nomination and ballot protocol machines plus
//! the per-node "latest statement" caches each protocol consults. Grounded
//! on the teacher's `Slot`, generalized from a single concrete value type to
//! any `V: NominationValue`.

use std::collections::HashMap;

use crate::value::NominationValue;

use super::ballot_protocol::BallotProtocolState;
use super::node_id::NodeId;
use super::nomination_protocol::NominationProtocolState;
use super::statement::ScpEnvelope;

pub type SlotIndex = u64;

pub struct Slot<V: NominationValue> {
    pub index: SlotIndex,
    pub nomination: NominationProtocolState<V>,
    pub ballot: BallotProtocolState<V>,
    pub nomination_envelopes: HashMap<NodeId, ScpEnvelope<V>>,
    pub ballot_envelopes: HashMap<NodeId, ScpEnvelope<V>>,
    pub fully_validated: bool,
}

impl<V: NominationValue> Slot<V> {
    pub fn new(index: SlotIndex) -> Self {
        Slot {
            index,
            nomination: NominationProtocolState::default(),
            ballot: BallotProtocolState::default(),
            nomination_envelopes: HashMap::new(),
            ballot_envelopes: HashMap::new(),
            fully_validated: false,
        }
    }

    pub fn is_externalized(&self) -> bool {
        self.ballot.is_externalized()
    }
}
