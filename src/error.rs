//! Error taxonomy for the consensus engine.
//!
//! Transient conditions (a malformed envelope, a value the host rejects) are
//! returned as `Err` and never unwind; a broken safety invariant is treated
//! as a bug and aborts via `debug_assert!`/`panic!` at the point of detection
//! the way `BallotProtocolState::check_invariants` does in the ballot module.

use thiserror::Error;

use crate::scp::slot::SlotIndex;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScpError {
    #[error("malformed envelope for slot {slot}: {reason}")]
    MalformedEnvelope { slot: SlotIndex, reason: String },

    #[error("unknown quorum set hash referenced by slot {slot}")]
    UnknownQuorumSetHash { slot: SlotIndex },

    #[error("ballot protocol invariant violated in slot {slot}: {reason}")]
    InvariantViolation { slot: SlotIndex, reason: String },

    #[error("host rejected value for slot {slot}")]
    HostRejectedValue { slot: SlotIndex },

    #[error("quorum set is not sane: {0}")]
    InsaneQuorumSet(String),
}

pub type ScpResult<T> = Result<T, ScpError>;
