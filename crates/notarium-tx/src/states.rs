//! Typed transaction components.
//!
//! Contract semantics are out of scope for this crate: outputs and commands
//! are carried as opaque payloads tagged with the contract or command name.

use borsh::{BorshDeserialize, BorshSerialize};
use notarium_core::PublicKey;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A state produced by a transaction.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OutputState {
    /// Name of the contract governing the state.
    pub contract: String,
    /// Opaque state payload.
    pub data: Vec<u8>,
}

/// A command and the keys required to sign for it.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Command {
    /// Opaque command payload.
    pub value: Vec<u8>,
    /// Keys that must sign the transaction for this command.
    pub signers: Vec<PublicKey>,
}
