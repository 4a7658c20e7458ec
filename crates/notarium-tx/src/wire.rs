// Consensus-critical. Changes require a protocol version bump + tests.
//! Full (unfiltered) transactions.

use std::io;
use std::sync::OnceLock;

use borsh::{BorshDeserialize, BorshSerialize};
use notarium_core::{component_nonce, group_nonce, Party, PrivacySalt, SecureHash, StateRef, TimeWindow, TxId};

use crate::component_group::{
    check_shape, roots_unchecked, ComponentGroup, ComponentGroupKind,
};
use crate::error::TxError;
use crate::filtered::{FilteredComponentGroup, FilteredGroupContent, FilteredTransaction};
use crate::merkle::fold_levels;
use crate::states::{Command, OutputState};

/// A transaction as exchanged between the parties that built it.
///
/// Component groups and salt are immutable after construction; the id is
/// computed on first use and cached.
#[derive(Clone, Debug)]
pub struct WireTransaction {
    component_groups: Vec<ComponentGroup>,
    privacy_salt: PrivacySalt,
    id: OnceLock<TxId>,
}

impl WireTransaction {
    /// Wrap component groups and salt, validating the group layout.
    ///
    /// Every known group kind must be present (empty if unused), singleton
    /// groups hold at most one component, and the salt must not be all zeros.
    /// Extra trailing groups are accepted and committed for forward
    /// compatibility.
    pub fn new(component_groups: Vec<ComponentGroup>, privacy_salt: PrivacySalt) -> Result<Self, TxError> {
        check_shape(&component_groups)?;
        if component_groups.len() < ComponentGroupKind::ALL.len() {
            return Err(TxError::InvalidArgument("missing component groups"));
        }
        for kind in ComponentGroupKind::ALL {
            if kind.is_singleton() && component_groups[kind.index() as usize].len() > 1 {
                return Err(TxError::InvalidArgument("singleton group holds more than one component"));
            }
        }
        if privacy_salt.as_bytes().iter().all(|b| *b == 0) {
            return Err(TxError::InvalidArgument("privacy salt must not be all zeros"));
        }
        Ok(Self {
            component_groups,
            privacy_salt,
            id: OnceLock::new(),
        })
    }

    /// Transaction identifier (Merkle root over the group roots).
    pub fn id(&self) -> TxId {
        *self.id.get_or_init(|| {
            // Group list is non-empty by construction.
            fold_levels(self.group_merkle_roots()).unwrap_or_else(SecureHash::zero)
        })
    }

    /// Merkle root of every group, in position order.
    pub fn group_merkle_roots(&self) -> Vec<SecureHash> {
        roots_unchecked(&self.component_groups, &self.privacy_salt)
    }

    /// All component groups, in position order.
    pub fn component_groups(&self) -> &[ComponentGroup] {
        &self.component_groups
    }

    /// The secret salt. Never include this in a tear-off.
    pub fn privacy_salt(&self) -> &PrivacySalt {
        &self.privacy_salt
    }

    /// Group of the given kind.
    pub fn group(&self, kind: ComponentGroupKind) -> &ComponentGroup {
        &self.component_groups[kind.index() as usize]
    }

    /// Consumed state references.
    pub fn inputs(&self) -> Result<Vec<StateRef>, TxError> {
        self.group(ComponentGroupKind::Inputs).decode()
    }

    /// Produced states.
    pub fn outputs(&self) -> Result<Vec<OutputState>, TxError> {
        self.group(ComponentGroupKind::Outputs).decode()
    }

    /// Commands.
    pub fn commands(&self) -> Result<Vec<Command>, TxError> {
        self.group(ComponentGroupKind::Commands).decode()
    }

    /// Attachment ids.
    pub fn attachments(&self) -> Result<Vec<SecureHash>, TxError> {
        self.group(ComponentGroupKind::Attachments).decode()
    }

    /// Notary, if the transaction names one.
    pub fn notary(&self) -> Result<Option<Party>, TxError> {
        Ok(self.group(ComponentGroupKind::Notary).decode()?.pop())
    }

    /// Time window, if the transaction declares one.
    pub fn time_window(&self) -> Result<Option<TimeWindow>, TxError> {
        let tw: Option<TimeWindow> = self.group(ComponentGroupKind::TimeWindow).decode()?.pop();
        if let Some(tw) = &tw {
            tw.validate()?;
        }
        Ok(tw)
    }

    /// Tear-off revealing only the groups of the listed kinds.
    ///
    /// Revealed groups carry their components and per-component nonces (or
    /// the group nonce when empty); hidden groups contribute only their root.
    pub fn build_filtered_transaction(&self, reveal: &[ComponentGroupKind]) -> FilteredTransaction {
        let mut kinds: Vec<ComponentGroupKind> = reveal.to_vec();
        kinds.sort();
        kinds.dedup();

        let groups = kinds
            .into_iter()
            .map(|kind| {
                let g = kind.index();
                let group = self.group(kind);
                let content = if group.is_empty() {
                    FilteredGroupContent::Empty {
                        group_nonce: group_nonce(&self.privacy_salt, g),
                    }
                } else {
                    FilteredGroupContent::Components {
                        components: group.components.clone(),
                        nonces: (0..group.len() as u32)
                            .map(|c| component_nonce(&self.privacy_salt, g, c))
                            .collect(),
                    }
                };
                FilteredComponentGroup {
                    group_index: g,
                    content,
                }
            })
            .collect();

        FilteredTransaction::new(self.id(), self.group_merkle_roots(), groups)
    }
}

impl PartialEq for WireTransaction {
    fn eq(&self, other: &Self) -> bool {
        self.component_groups == other.component_groups && self.privacy_salt == other.privacy_salt
    }
}

impl Eq for WireTransaction {}

impl BorshSerialize for WireTransaction {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        self.component_groups.serialize(writer)?;
        self.privacy_salt.serialize(writer)
    }
}

impl BorshDeserialize for WireTransaction {
    fn deserialize_reader<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let groups = Vec::<ComponentGroup>::deserialize_reader(reader)?;
        let salt = PrivacySalt::deserialize_reader(reader)?;
        Self::new(groups, salt).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }
}
