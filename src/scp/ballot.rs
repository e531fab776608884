//! `SCPBallot`: a (counter, value) pair ordered lexicographically. Counter
//! zero is reserved to mean "no ballot" and is never emitted on the wire.

use serde::{Deserialize, Serialize};

use crate::value::NominationValue;

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, Debug)]
#[serde(bound = "")]
pub struct ScpBallot<V: NominationValue> {
    pub counter: u32,
    pub value: V,
}

impl<V: NominationValue> ScpBallot<V> {
    pub fn new(counter: u32, value: V) -> Self {
        ScpBallot { counter, value }
    }

    pub fn is_null(&self) -> bool {
        self.counter == 0
    }

    pub fn compatible(&self, other: &Self) -> bool {
        self.value == other.value
    }

    pub fn less_and_incompatible(&self, other: &Self) -> bool {
        self < other && !self.compatible(other)
    }

    pub fn less_and_compatible(&self, other: &Self) -> bool {
        self <= other && self.compatible(other)
    }
}
