//! The opaque application value nominated and ratified by the engine.
//!
//! The core never inspects a value's contents; it only needs to compare,
//! hash, and serialize it. Hosts provide the actual validation/combination
//! semantics through the driver capability (see `scp::driver::ScpDriver`).

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// A trait bound rather than a concrete type so a host can plug in its own
/// richer value representation; the blanket `Value` newtype below is the
/// one actually threaded through the wire types in this crate.
pub trait NominationValue:
    Clone + Eq + Ord + std::hash::Hash + fmt::Debug + Serialize + for<'de> Deserialize<'de>
{
}

impl<T> NominationValue for T where
    T: Clone + Eq + Ord + std::hash::Hash + fmt::Debug + Serialize + for<'de> Deserialize<'de>
{
}

/// Reference-counted opaque byte string. Cheap to clone and share across the
/// per-slot statement caches.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct Value(pub Rc<[u8]>);

impl Value {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Value(Rc::from(bytes.into().into_boxed_slice()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for Value {
    fn default() -> Self {
        Value(Rc::from(Vec::new().into_boxed_slice()))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({} bytes)", self.0.len())
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.as_ref().cmp(other.0.as_ref())
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serde_bytes::serialize(self.0.as_ref(), serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: Vec<u8> = serde_bytes::deserialize(deserializer)?;
        Ok(Value::from_bytes(bytes))
    }
}

/// How strongly the driver vouches for a nominated or prepared value.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ValidationLevel {
    Invalid,
    MaybeValid,
    FullyValid,
}
