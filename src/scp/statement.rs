//! The four SCP statement pledges, carried inside an `ScpEnvelope`.
//! Grounded on the teacher's `statement.rs`, including the nomination
//! partial order used to decide whether an incoming statement supersedes a
//! cached one.

use serde::{Deserialize, Serialize};

use crate::value::NominationValue;

use super::ballot::ScpBallot;
use super::node_id::NodeId;

pub type QuorumSetHash = u64;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(bound = "")]
pub enum ScpStatement<V: NominationValue> {
    Prepare(ScpStatementPrepare<V>),
    Confirm(ScpStatementConfirm<V>),
    Externalize(ScpStatementExternalize<V>),
    Nominate(ScpStatementNominate<V>),
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(bound = "")]
pub struct ScpStatementPrepare<V: NominationValue> {
    pub quorum_set_hash: QuorumSetHash,
    pub ballot: ScpBallot<V>,
    pub prepared: Option<ScpBallot<V>>,
    pub prepared_prime: Option<ScpBallot<V>>,
    pub n_c: u32,
    pub n_h: u32,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(bound = "")]
pub struct ScpStatementConfirm<V: NominationValue> {
    pub quorum_set_hash: QuorumSetHash,
    pub ballot: ScpBallot<V>,
    pub n_prepared: u32,
    pub n_commit: u32,
    pub n_h: u32,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(bound = "")]
pub struct ScpStatementExternalize<V: NominationValue> {
    pub commit: ScpBallot<V>,
    pub n_h: u32,
    pub commit_quorum_set_hash: QuorumSetHash,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(bound = "")]
pub struct ScpStatementNominate<V: NominationValue> {
    pub quorum_set_hash: QuorumSetHash,
    pub votes: Vec<V>,
    pub accepted: Vec<V>,
}

impl<V: NominationValue> ScpStatementNominate<V> {
    /// Sanity per the nomination protocol: both lists sorted, deduplicated,
    /// and the statement as a whole non-empty.
    pub fn is_sane(&self) -> bool {
        (!self.votes.is_empty() || !self.accepted.is_empty())
            && self.votes.windows(2).all(|w| w[0] < w[1])
            && self.accepted.windows(2).all(|w| w[0] < w[1])
    }

    fn subset_relation(left: &[V], right: &[V]) -> (bool, bool) {
        if left.len() > right.len() {
            return (false, false);
        }
        let is_subset = left.iter().all(|v| right.contains(v));
        let grew = is_subset && left.len() != right.len();
        (is_subset, grew)
    }

    /// `self` is older than `other` iff `self`'s votes are a subset of
    /// `other`'s and, should the votes be equal, `self`'s accepted set is a
    /// subset of `other`'s, with at least one of the two sets having grown.
    pub fn is_older_than(&self, other: &Self) -> bool {
        let (votes_subset, votes_grew) = Self::subset_relation(&self.votes, &other.votes);
        if !votes_subset {
            return false;
        }
        let (accepted_subset, accepted_grew) = Self::subset_relation(&self.accepted, &other.accepted);
        accepted_subset && (votes_grew || accepted_grew)
    }
}

impl<V: NominationValue> ScpStatement<V> {
    pub fn quorum_set_hash(&self) -> QuorumSetHash {
        match self {
            ScpStatement::Prepare(st) => st.quorum_set_hash,
            ScpStatement::Confirm(st) => st.quorum_set_hash,
            ScpStatement::Externalize(st) => st.commit_quorum_set_hash,
            ScpStatement::Nominate(st) => st.quorum_set_hash,
        }
    }

    pub fn as_nominate(&self) -> Option<&ScpStatementNominate<V>> {
        match self {
            ScpStatement::Nominate(st) => Some(st),
            _ => None,
        }
    }

    pub fn ballot_counter(&self) -> u32 {
        match self {
            ScpStatement::Prepare(st) => st.ballot.counter,
            ScpStatement::Confirm(st) => st.ballot.counter,
            ScpStatement::Externalize(_) => u32::MAX,
            ScpStatement::Nominate(_) => 0,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(bound = "")]
pub struct ScpEnvelope<V: NominationValue> {
    pub node_id: NodeId,
    pub slot_index: u64,
    pub statement: ScpStatement<V>,
    #[serde(with = "serde_bytes")]
    pub signature: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_nominate_statement_is_insane() {
        let st = ScpStatementNominate::<u32> { quorum_set_hash: 0, votes: vec![], accepted: vec![] };
        assert!(!st.is_sane());
    }

    #[test]
    fn unsorted_votes_are_insane() {
        let st = ScpStatementNominate::<u32> { quorum_set_hash: 0, votes: vec![2, 1], accepted: vec![] };
        assert!(!st.is_sane());
    }

    #[test]
    fn older_statement_has_subset_votes() {
        let old = ScpStatementNominate::<u32> { quorum_set_hash: 0, votes: vec![1], accepted: vec![] };
        let new = ScpStatementNominate::<u32> { quorum_set_hash: 0, votes: vec![1, 2], accepted: vec![] };
        assert!(old.is_older_than(&new));
        assert!(!new.is_older_than(&old));
    }
}
