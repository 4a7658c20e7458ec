// Consensus-critical. Changes require a protocol version bump + tests.
//! Nonce and leaf derivations for the transaction commitment scheme.
//!
//! v0 derivations (`g` = group index, `c` = component index, both u32 LE):
//!
//! - component nonce: `BLAKE3(DS_COMPONENT_NONCE || salt || g || c)`
//! - group nonce:     `BLAKE3(DS_GROUP_NONCE || salt || g)`
//! - leaf:            `BLAKE3(DS_COMPONENT_LEAF || component || nonce)`
//! - empty group:     `BLAKE3(DS_EMPTY_GROUP || ZERO || group_nonce)`
//!
//! Nonces are never stored; they are recomputed from the salt on demand.

use crate::constants::*;
use crate::serialization::hash32_concat;
use crate::types::{PrivacySalt, SecureHash};

/// Nonce for component `component_index` of group `group_index`.
pub fn component_nonce(salt: &PrivacySalt, group_index: u32, component_index: u32) -> SecureHash {
    hash32_concat(
        DS_COMPONENT_NONCE,
        &[
            salt.as_bytes(),
            &group_index.to_le_bytes(),
            &component_index.to_le_bytes(),
        ],
    )
}

/// Nonce identifying group `group_index` as a whole.
pub fn group_nonce(salt: &PrivacySalt, group_index: u32) -> SecureHash {
    hash32_concat(DS_GROUP_NONCE, &[salt.as_bytes(), &group_index.to_le_bytes()])
}

/// Leaf committed into a group's Merkle tree for one serialized component.
pub fn component_leaf(component: &[u8], nonce: &SecureHash) -> SecureHash {
    hash32_concat(DS_COMPONENT_LEAF, &[component, nonce.as_bytes()])
}

/// Root standing in for a group with no components.
///
/// Salted through the group nonce so that presence of an empty group is only
/// confirmable by someone holding the salt (or the disclosed group nonce).
pub fn empty_group_root(group_nonce: &SecureHash) -> SecureHash {
    hash32_concat(
        DS_EMPTY_GROUP,
        &[SecureHash::zero().as_bytes(), group_nonce.as_bytes()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn salt(b: u8) -> PrivacySalt {
        PrivacySalt::from_bytes([b; 32]).expect("salt")
    }

    #[test]
    fn nonce_depends_on_every_position_input() {
        let s = salt(1);
        let base = component_nonce(&s, 0, 0);
        assert_ne!(base, component_nonce(&s, 0, 1));
        assert_ne!(base, component_nonce(&s, 1, 0));
        assert_ne!(base, component_nonce(&salt(2), 0, 0));
        assert_eq!(base, component_nonce(&s, 0, 0));
    }

    #[test]
    fn identical_components_get_distinct_leaves() {
        let s = salt(9);
        let a = component_leaf(b"same", &component_nonce(&s, 1, 0));
        let b = component_leaf(b"same", &component_nonce(&s, 1, 1));
        assert_ne!(a, b);
    }

    #[test]
    fn empty_group_root_is_salted_per_group() {
        let s = salt(3);
        let r0 = empty_group_root(&group_nonce(&s, 0));
        let r1 = empty_group_root(&group_nonce(&s, 1));
        assert_ne!(r0, r1);
        assert_ne!(r0, SecureHash::zero());
        assert_ne!(r0, empty_group_root(&group_nonce(&salt(4), 0)));
    }

    #[test]
    fn empty_component_is_not_an_empty_group() {
        let s = salt(5);
        let empty_group = empty_group_root(&group_nonce(&s, 2));
        let blank_component = component_leaf(&[], &component_nonce(&s, 2, 0));
        assert_ne!(empty_group, blank_component);
    }
}
