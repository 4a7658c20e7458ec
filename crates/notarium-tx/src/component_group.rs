// Consensus-critical. Changes require a protocol version bump + tests.
//! Component groups and the transaction commitment.
//!
//! A transaction is an ordered list of component groups, each an ordered list
//! of Borsh-encoded components. Every component is committed as a salted leaf,
//! each group as a Merkle root over its leaves, and the transaction id as the
//! Merkle root over the group roots:
//!
//! ```text
//! leaf[g][c] = H_leaf(component || nonce(salt, g, c))
//! root[g]    = merkle(leaf[g][..])            if group g is non-empty
//!            = H_empty(ZERO || nonce(salt, g)) otherwise
//! id         = merkle(root[0], root[1], ...)
//! ```
//!
//! Group positions are fixed: an absent optional field is an explicit empty
//! group, never an omitted one.

use borsh::{BorshDeserialize, BorshSerialize};
use notarium_core::{
    component_leaf, component_nonce, empty_group_root, from_bytes, group_nonce, to_bytes,
    PrivacySalt, SecureHash,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::TxError;
use crate::merkle::fold_levels;

/// Semantic kind of a component group; the discriminant is its position.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u32)]
pub enum ComponentGroupKind {
    /// Consumed state references.
    Inputs = 0,
    /// Produced states.
    Outputs = 1,
    /// Commands.
    Commands = 2,
    /// Attachment ids.
    Attachments = 3,
    /// The notary party (zero or one component).
    Notary = 4,
    /// The time window (zero or one component).
    TimeWindow = 5,
}

impl ComponentGroupKind {
    /// Every kind this version understands, in position order.
    pub const ALL: [ComponentGroupKind; 6] = [
        ComponentGroupKind::Inputs,
        ComponentGroupKind::Outputs,
        ComponentGroupKind::Commands,
        ComponentGroupKind::Attachments,
        ComponentGroupKind::Notary,
        ComponentGroupKind::TimeWindow,
    ];

    /// Position of this group in a transaction.
    pub const fn index(self) -> u32 {
        self as u32
    }

    /// Kind at a position, if this version knows it.
    pub fn from_index(index: u32) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    /// Whether the group holds at most one component.
    pub const fn is_singleton(self) -> bool {
        matches!(self, ComponentGroupKind::Notary | ComponentGroupKind::TimeWindow)
    }
}

/// Ordered sequence of serialized components of one kind.
#[derive(Clone, PartialEq, Eq, Debug, Default, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ComponentGroup {
    /// Serialized components, in commitment order.
    pub components: Vec<Vec<u8>>,
}

impl ComponentGroup {
    /// Group over already-serialized components.
    pub fn new(components: Vec<Vec<u8>>) -> Self {
        Self { components }
    }

    /// Group with no components.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Borsh-encode each item as one component.
    pub fn from_items<T: BorshSerialize>(items: &[T]) -> Result<Self, TxError> {
        let components = items
            .iter()
            .map(to_bytes)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { components })
    }

    /// Decode every component as `T`.
    pub fn decode<T: BorshDeserialize>(&self) -> Result<Vec<T>, TxError> {
        decode_components(&self.components)
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether the group has no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Salted leaf hashes of this group at position `group_index`.
    pub fn leaves(&self, salt: &PrivacySalt, group_index: u32) -> Vec<SecureHash> {
        self.components
            .iter()
            .enumerate()
            .map(|(c, component)| {
                component_leaf(component, &component_nonce(salt, group_index, c as u32))
            })
            .collect()
    }

    /// Merkle root of this group at position `group_index`.
    pub fn merkle_root(&self, salt: &PrivacySalt, group_index: u32) -> SecureHash {
        fold_levels(self.leaves(salt, group_index))
            .unwrap_or_else(|| empty_group_root(&group_nonce(salt, group_index)))
    }
}

pub(crate) fn decode_components<T: BorshDeserialize>(components: &[Vec<u8>]) -> Result<Vec<T>, TxError> {
    components
        .iter()
        .map(|c| from_bytes(c).map_err(TxError::from))
        .collect()
}

/// Reject group lists whose positions or sizes cannot be committed.
pub(crate) fn check_shape(groups: &[ComponentGroup]) -> Result<(), TxError> {
    if groups.is_empty() {
        return Err(TxError::InvalidArgument("component group list is empty"));
    }
    if u32::try_from(groups.len()).is_err() {
        return Err(TxError::InvalidArgument("too many component groups"));
    }
    if groups.iter().any(|g| u32::try_from(g.len()).is_err()) {
        return Err(TxError::InvalidArgument("too many components in a group"));
    }
    Ok(())
}

/// Merkle root of every group, in position order. Assumes `check_shape` passed.
pub(crate) fn roots_unchecked(groups: &[ComponentGroup], salt: &PrivacySalt) -> Vec<SecureHash> {
    groups
        .iter()
        .enumerate()
        .map(|(g, group)| group.merkle_root(salt, g as u32))
        .collect()
}

/// Merkle root of every group, in position order.
pub fn group_merkle_roots(
    groups: &[ComponentGroup],
    salt: &PrivacySalt,
) -> Result<Vec<SecureHash>, TxError> {
    check_shape(groups)?;
    Ok(roots_unchecked(groups, salt))
}

/// Transaction identifier for `groups` under `salt`.
///
/// Deterministic, and sensitive to component content, component order, group
/// order and salt.
pub fn compute_transaction_id(
    groups: &[ComponentGroup],
    salt: &PrivacySalt,
) -> Result<SecureHash, TxError> {
    let roots = group_merkle_roots(groups, salt)?;
    crate::merkle::build_tree(&roots)
}
