// Consensus-critical. Changes require a protocol version bump + tests.
//! Binary Merkle tree over an ordered list of 32-byte leaves.
//!
//! Construction rules (v0):
//! - one leaf: the leaf is the root
//! - odd level (> 1 node): the last node is duplicated
//! - parent = BLAKE3(DS_MERKLE_NODE || left || right)
//!
//! Leaves are expected to be hashes already; they are not re-hashed here.
//! Callers substitute their own placeholder for "no leaves" before building.

use notarium_core::{hash32_concat, SecureHash, DS_MERKLE_NODE};

use crate::error::TxError;

/// Build the Merkle root of `leaves`.
///
/// Fails with `InvalidArgument` when `leaves` is empty.
pub fn build_tree(leaves: &[SecureHash]) -> Result<SecureHash, TxError> {
    fold_levels(leaves.to_vec())
        .ok_or(TxError::InvalidArgument("cannot build a Merkle tree from zero leaves"))
}

/// Reduce level by level until one node remains. `None` only for empty input.
pub(crate) fn fold_levels(mut level: Vec<SecureHash>) -> Option<SecureHash> {
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = level[level.len() - 1];
            level.push(last);
        }
        level = level
            .chunks_exact(2)
            .map(|pair| parent_hash(&pair[0], &pair[1]))
            .collect();
    }
    level.pop()
}

/// Compute parent hash for two child nodes.
pub fn parent_hash(left: &SecureHash, right: &SecureHash) -> SecureHash {
    hash32_concat(DS_MERKLE_NODE, &[left.as_bytes(), right.as_bytes()])
}
