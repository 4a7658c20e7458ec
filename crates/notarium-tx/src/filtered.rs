// Consensus-critical. Changes require a protocol version bump + tests.
//! Filtered transactions ("tear-offs").
//!
//! A tear-off reveals some component groups in full and exposes only the Merkle
//! root of the rest. Each revealed group carries the nonces needed to recompute
//! its leaves, so the salt itself never leaves the `WireTransaction`. A
//! verifier recomputes revealed roots, then the id from all roots.
//!
//! Decoded tear-offs are untrusted until `verify` succeeds.

use borsh::{BorshDeserialize, BorshSerialize};
use notarium_core::{component_leaf, empty_group_root, Party, SecureHash, StateRef, TimeWindow, TxId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::component_group::{decode_components, ComponentGroupKind};
use crate::error::TxError;
use crate::merkle::{build_tree, fold_levels};
use crate::states::{Command, OutputState};

/// Revealed content of one group.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FilteredGroupContent {
    /// Non-empty group: components with their nonces, index-aligned.
    Components {
        /// Serialized components, in order.
        components: Vec<Vec<u8>>,
        /// Nonce of each component.
        nonces: Vec<SecureHash>,
    },
    /// Group proven empty by disclosing its group nonce.
    Empty {
        /// Nonce of the group as a whole.
        group_nonce: SecureHash,
    },
}

/// A revealed group and its position.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FilteredComponentGroup {
    /// Position of the group in the transaction.
    pub group_index: u32,
    /// What the group contains.
    pub content: FilteredGroupContent,
}

impl FilteredComponentGroup {
    fn recompute_root(&self) -> Result<SecureHash, TxError> {
        match &self.content {
            FilteredGroupContent::Components { components, nonces } => {
                if components.is_empty() {
                    return Err(TxError::FilteredTransactionInvalid(
                        "empty group must be revealed by its group nonce",
                    ));
                }
                if components.len() != nonces.len() {
                    return Err(TxError::FilteredTransactionInvalid(
                        "component and nonce counts differ",
                    ));
                }
                let leaves = components
                    .iter()
                    .zip(nonces)
                    .map(|(c, n)| component_leaf(c, n))
                    .collect();
                fold_levels(leaves).ok_or(TxError::FilteredTransactionInvalid("no leaves"))
            }
            FilteredGroupContent::Empty { group_nonce } => Ok(empty_group_root(group_nonce)),
        }
    }

    fn components(&self) -> &[Vec<u8>] {
        match &self.content {
            FilteredGroupContent::Components { components, .. } => components,
            FilteredGroupContent::Empty { .. } => &[],
        }
    }
}

/// Partial view of a transaction: all group roots, some groups revealed.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FilteredTransaction {
    id: TxId,
    group_roots: Vec<SecureHash>,
    groups: Vec<FilteredComponentGroup>,
}

impl FilteredTransaction {
    pub(crate) fn new(id: TxId, group_roots: Vec<SecureHash>, groups: Vec<FilteredComponentGroup>) -> Self {
        Self {
            id,
            group_roots,
            groups,
        }
    }

    /// Claimed transaction id.
    pub fn id(&self) -> TxId {
        self.id
    }

    /// Merkle root of every group, revealed or not.
    pub fn group_roots(&self) -> &[SecureHash] {
        &self.group_roots
    }

    /// Revealed groups.
    pub fn filtered_groups(&self) -> &[FilteredComponentGroup] {
        &self.groups
    }

    /// Check that revealed groups and group roots commit to `id`.
    pub fn verify(&self) -> Result<(), TxError> {
        let root = build_tree(&self.group_roots)
            .map_err(|_| TxError::FilteredTransactionInvalid("no group roots"))?;
        if root != self.id {
            return Err(TxError::FilteredTransactionInvalid(
                "group roots do not commit to the transaction id",
            ));
        }

        let mut seen: Vec<u32> = Vec::with_capacity(self.groups.len());
        for group in &self.groups {
            if seen.contains(&group.group_index) {
                return Err(TxError::FilteredTransactionInvalid("group revealed twice"));
            }
            seen.push(group.group_index);

            let expected = self
                .group_roots
                .get(group.group_index as usize)
                .ok_or(TxError::FilteredTransactionInvalid("group index out of range"))?;
            if group.recompute_root()? != *expected {
                return Err(TxError::FilteredTransactionInvalid(
                    "revealed group does not match its root",
                ));
            }
        }
        Ok(())
    }

    /// Whether the group of `kind` is revealed.
    pub fn is_revealed(&self, kind: ComponentGroupKind) -> bool {
        self.revealed(kind).is_some()
    }

    /// Fail with `ComponentGroupHidden` unless the group of `kind` is revealed.
    pub fn check_all_components_visible(&self, kind: ComponentGroupKind) -> Result<(), TxError> {
        self.revealed(kind)
            .map(|_| ())
            .ok_or(TxError::ComponentGroupHidden(kind))
    }

    fn revealed(&self, kind: ComponentGroupKind) -> Option<&FilteredComponentGroup> {
        self.groups.iter().find(|g| g.group_index == kind.index())
    }

    fn decode_group<T: BorshDeserialize>(&self, kind: ComponentGroupKind) -> Result<Vec<T>, TxError> {
        let group = self.revealed(kind).ok_or(TxError::ComponentGroupHidden(kind))?;
        decode_components(group.components())
    }

    /// Consumed state references.
    pub fn inputs(&self) -> Result<Vec<StateRef>, TxError> {
        self.decode_group(ComponentGroupKind::Inputs)
    }

    /// Produced states.
    pub fn outputs(&self) -> Result<Vec<OutputState>, TxError> {
        self.decode_group(ComponentGroupKind::Outputs)
    }

    /// Commands.
    pub fn commands(&self) -> Result<Vec<Command>, TxError> {
        self.decode_group(ComponentGroupKind::Commands)
    }

    /// Notary, if the transaction names one.
    pub fn notary(&self) -> Result<Option<Party>, TxError> {
        let mut notaries: Vec<Party> = self.decode_group(ComponentGroupKind::Notary)?;
        if notaries.len() > 1 {
            return Err(TxError::InvalidArgument("singleton group holds more than one component"));
        }
        Ok(notaries.pop())
    }

    /// Time window, if the transaction declares one.
    pub fn time_window(&self) -> Result<Option<TimeWindow>, TxError> {
        let mut windows: Vec<TimeWindow> = self.decode_group(ComponentGroupKind::TimeWindow)?;
        if windows.len() > 1 {
            return Err(TxError::InvalidArgument("singleton group holds more than one component"));
        }
        let tw = windows.pop();
        if let Some(tw) = &tw {
            tw.validate()?;
        }
        Ok(tw)
    }
}
