//! The capability the host must supply: signing, verification, value
//! semantics, timer scheduling, and observer hooks. Grounded on the
//! teacher's `SCPDriver` trait; expanded with the full callback surface
//! named in the reference `SCPDriver.cpp` defaults (most of which are
//! no-ops there too).

use std::cmp::Ordering;
use std::time::Duration;

use crate::value::{NominationValue, ValidationLevel};
use crate::work_queue::HWorkScheduler;

use super::ballot::ScpBallot;
use super::node_id::NodeId;
use super::quorum_set::QuorumSet;
use super::slot::SlotIndex;
use super::statement::QuorumSetHash;

pub trait ScpDriver<V: NominationValue> {
    // --- required: identity & wire plumbing, left to the host ---
    fn sign_envelope(&self, slot_index: SlotIndex, statement_bytes: &[u8]) -> Vec<u8>;
    fn verify_envelope(&self, node_id: NodeId, statement_bytes: &[u8], signature: &[u8]) -> bool;
    fn get_quorum_set(&self, hash: QuorumSetHash) -> Option<QuorumSet>;
    fn emit_envelope(&self, slot_index: SlotIndex, statement_bytes: &[u8], signature: &[u8]);

    // --- required: value semantics ---
    fn validate_value(&self, slot_index: SlotIndex, value: &V, nomination: bool) -> ValidationLevel;
    fn combine_candidates(&self, slot_index: SlotIndex, candidates: &[V]) -> V;
    fn compare_values(&self, slot_index: SlotIndex, prev: &[u8], round_number: u32, a: &V, b: &V) -> Ordering;

    // --- required: timers ---
    fn setup_timer(&self, slot_index: SlotIndex, timer_id: TimerId, delay: Duration, callback: Box<dyn FnOnce()>);

    fn compute_timeout(&self, round_or_counter: u32) -> Duration {
        const MAX_TIMEOUT_SECONDS: u64 = 30 * 60;
        Duration::from_secs((round_or_counter as u64).min(MAX_TIMEOUT_SECONDS))
    }

    // --- observer hooks: no-op by default, mirroring the reference driver ---
    fn extract_valid_value(&self, _slot_index: SlotIndex, _value: &V) -> Option<V> {
        None
    }
    fn nominating_value(&self, _slot_index: SlotIndex, _value: &V) {}
    fn updated_candidate_value(&self, _slot_index: SlotIndex, _value: &V) {}
    fn started_ballot_protocol(&self, _slot_index: SlotIndex, _ballot: &ScpBallot<V>) {}
    fn accepted_ballot_prepared(&self, _slot_index: SlotIndex, _ballot: &ScpBallot<V>) {}
    fn confirmed_ballot_prepared(&self, _slot_index: SlotIndex, _ballot: &ScpBallot<V>) {}
    fn accepted_commit(&self, _slot_index: SlotIndex, _ballot: &ScpBallot<V>) {}
    fn ballot_did_hear_from_quorum(&self, _slot_index: SlotIndex, _ballot: &ScpBallot<V>) {}
    fn value_externalized(&self, _slot_index: SlotIndex, _value: &V) {}
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TimerId {
    Nomination,
    Ballot,
}

/// The concrete timer sink a host's `ScpDriver::setup_timer` delegates to:
/// arms the callback on the ambient work scheduler's deadline-ordered event
/// queue instead of each driver reimplementing its own timer bookkeeping.
#[derive(Clone)]
pub struct SchedulerTimers {
    scheduler: HWorkScheduler,
}

impl SchedulerTimers {
    pub fn new(scheduler: HWorkScheduler) -> Self {
        SchedulerTimers { scheduler }
    }

    pub fn arm(&self, delay: Duration, callback: Box<dyn FnOnce()>) {
        self.scheduler.borrow_mut().schedule_after(delay, callback);
    }
}
