//! Deterministic hashing used by the nomination protocol's priority/neighbor
//! computation and by value hashing. Mirrors `hashHelper`/`computeHashNode`/
//! `computeValueHash` from the reference driver: SHA-512 over the slot index,
//! the previous externalized value, and a domain-separated extra payload,
//! truncated to the first 8 bytes (big-endian).

use sha2::{Digest, Sha512};

use crate::scp::slot::SlotIndex;

const HASH_NEIGHBOR: u32 = 1;
const HASH_PRIORITY: u32 = 2;
const HASH_VALUE: u32 = 3;

fn hash_helper(slot_index: SlotIndex, prev: &[u8], extra: &[&[u8]]) -> u64 {
    let mut hasher = Sha512::new();
    hasher.update(slot_index.to_be_bytes());
    hasher.update(prev);
    for chunk in extra {
        hasher.update(chunk);
    }
    let digest = hasher.finalize();

    let mut res: u64 = 0;
    for byte in &digest[..8] {
        res = (res << 8) | (*byte as u64);
    }
    res
}

/// Hash used for nomination priority and neighbor checks.
pub fn compute_hash_node(
    slot_index: SlotIndex,
    prev: &[u8],
    is_priority: bool,
    round_number: u32,
    node_id: u64,
) -> u64 {
    let domain = if is_priority { HASH_PRIORITY } else { HASH_NEIGHBOR };
    hash_helper(
        slot_index,
        prev,
        &[&domain.to_be_bytes(), &round_number.to_be_bytes(), &node_id.to_be_bytes()],
    )
}

/// Hash used to bias the per-round value comparator.
pub fn compute_value_hash(slot_index: SlotIndex, prev: &[u8], round_number: u32, value: &[u8]) -> u64 {
    hash_helper(
        slot_index,
        prev,
        &[&HASH_VALUE.to_be_bytes(), &round_number.to_be_bytes(), value],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_across_calls() {
        let a = compute_hash_node(1, b"prev", true, 3, 42);
        let b = compute_hash_node(1, b"prev", true, 3, 42);
        assert_eq!(a, b);
    }

    #[test]
    fn domain_separation_changes_output() {
        let priority = compute_hash_node(1, b"prev", true, 3, 42);
        let neighbor = compute_hash_node(1, b"prev", false, 3, 42);
        assert_ne!(priority, neighbor);
    }

    #[test]
    fn value_hash_distinct_from_node_hash() {
        let node = compute_hash_node(1, b"prev", true, 3, 42);
        let value = compute_value_hash(1, b"prev", 3, b"42");
        assert_ne!(node, value);
    }
}
