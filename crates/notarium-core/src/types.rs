// Consensus-critical. Changes require a protocol version bump + tests.
//! Canonical protocol types for Notarium v0.
//!
//! This module defines the value types shared by the transaction, notary and
//! identity layers. Everything here is Borsh-encoded when hashed or signed, so
//! field order is part of the wire format.

use crate::constants::*;
use crate::crypto::PublicKey;
use borsh::{BorshDeserialize, BorshSerialize};
use core::fmt;
use core::str::FromStr;
use rand_core::{OsRng, RngCore};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Errors related to parsing, validation, or construction of core protocol types.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Hex string had an unexpected byte length.
    #[error("invalid hex length: expected {expected} bytes, got {got} bytes")]
    InvalidHexLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes provided.
        got: usize,
    },

    /// Hex decoding failed.
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// A value violated protocol constraints.
    #[error("invalid value: {0}")]
    InvalidValue(&'static str),

    /// Canonical encoding or decoding failed.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

fn decode_hex32(s: &str) -> Result<[u8; HASH32_LEN], CoreError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s)?;
    if bytes.len() != HASH32_LEN {
        return Err(CoreError::InvalidHexLength {
            expected: HASH32_LEN,
            got: bytes.len(),
        });
    }
    let mut arr = [0u8; HASH32_LEN];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// Fixed-size 32-byte digest used throughout the protocol.
///
/// Ordered by byte comparison. The all-zero value stands for "empty".
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SecureHash(pub [u8; HASH32_LEN]);

impl SecureHash {
    /// Returns the all-zero hash.
    pub const fn zero() -> Self {
        Self([0u8; HASH32_LEN])
    }

    /// Returns the underlying byte array.
    pub const fn as_bytes(&self) -> &[u8; HASH32_LEN] {
        &self.0
    }

    /// Whether this is the all-zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH32_LEN]
    }
}

impl fmt::Debug for SecureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureHash({})", hex::encode(self.0))
    }
}

impl fmt::Display for SecureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl From<[u8; HASH32_LEN]> for SecureHash {
    fn from(value: [u8; HASH32_LEN]) -> Self {
        Self(value)
    }
}

impl From<SecureHash> for [u8; HASH32_LEN] {
    fn from(value: SecureHash) -> Self {
        value.0
    }
}

impl FromStr for SecureHash {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_hex32(s).map(Self)
    }
}

/// Transaction identifier type.
pub type TxId = SecureHash;

/// Per-transaction secret that randomizes component nonces.
///
/// Generated once when a transaction is built. Never shown in `Debug` output.
/// Decoding applies the same all-zero rejection as `from_bytes`.
#[derive(Clone, Copy, PartialEq, Eq, BorshSerialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "[u8; PRIVACY_SALT_LEN]"))]
pub struct PrivacySalt(pub [u8; PRIVACY_SALT_LEN]);

impl PrivacySalt {
    /// Draw a fresh salt from the operating system CSPRNG.
    ///
    /// Retries in the (astronomically unlikely) event of an all-zero draw,
    /// which is rejected as a salt.
    pub fn random() -> Self {
        let mut bytes = [0u8; PRIVACY_SALT_LEN];
        loop {
            OsRng.fill_bytes(&mut bytes);
            if bytes != [0u8; PRIVACY_SALT_LEN] {
                return Self(bytes);
            }
        }
    }

    /// Wrap caller-supplied salt bytes. All-zero salts are rejected.
    pub fn from_bytes(bytes: [u8; PRIVACY_SALT_LEN]) -> Result<Self, CoreError> {
        if bytes == [0u8; PRIVACY_SALT_LEN] {
            return Err(CoreError::InvalidValue("privacy salt must not be all zeros"));
        }
        Ok(Self(bytes))
    }

    /// Returns the underlying byte array.
    pub const fn as_bytes(&self) -> &[u8; PRIVACY_SALT_LEN] {
        &self.0
    }
}

impl TryFrom<[u8; PRIVACY_SALT_LEN]> for PrivacySalt {
    type Error = CoreError;

    fn try_from(bytes: [u8; PRIVACY_SALT_LEN]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

impl BorshDeserialize for PrivacySalt {
    fn deserialize_reader<R: borsh::io::Read>(reader: &mut R) -> borsh::io::Result<Self> {
        let bytes = <[u8; PRIVACY_SALT_LEN]>::deserialize_reader(reader)?;
        Self::from_bytes(bytes)
            .map_err(|e| borsh::io::Error::new(borsh::io::ErrorKind::InvalidData, e.to_string()))
    }
}

impl fmt::Debug for PrivacySalt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivacySalt(<redacted>)")
    }
}

impl FromStr for PrivacySalt {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(decode_hex32(s)?)
    }
}

/// Reference to an output of a previous transaction.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StateRef {
    /// Id of the transaction that produced the state.
    pub txhash: SecureHash,
    /// Position of the state within that transaction's outputs.
    pub index: u32,
}

impl StateRef {
    /// Construct a state reference.
    pub const fn new(txhash: SecureHash, index: u32) -> Self {
        Self { txhash, index }
    }
}

impl fmt::Debug for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateRef({}:{})", self.txhash, self.index)
    }
}

impl fmt::Display for StateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txhash, self.index)
    }
}

impl FromStr for StateRef {
    type Err = CoreError;

    /// Parses `<hex txhash>:<index>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hash, index) = s
            .rsplit_once(':')
            .ok_or(CoreError::InvalidValue("state ref must be <txhash>:<index>"))?;
        let index = index
            .parse::<u32>()
            .map_err(|_| CoreError::InvalidValue("state ref index is not a u32"))?;
        Ok(Self::new(hash.parse()?, index))
    }
}

/// A named identity with an owning (possibly composite) key.
#[derive(Clone, PartialEq, Eq, Hash, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Party {
    /// Legal name, e.g. `O=Notary,L=London,C=GB`.
    pub name: String,
    /// Key that must sign on behalf of this party.
    pub owning_key: PublicKey,
}

impl Party {
    /// Construct a party.
    pub fn new(name: impl Into<String>, owning_key: PublicKey) -> Self {
        Self {
            name: name.into(),
            owning_key,
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::{from_bytes, to_bytes};

    #[test]
    fn decoded_salt_must_not_be_all_zeros() {
        let salt = PrivacySalt::from_bytes([7; PRIVACY_SALT_LEN]).expect("salt");
        assert_eq!(from_bytes::<PrivacySalt>(&to_bytes(&salt).expect("encode")).expect("decode"), salt);
        assert!(from_bytes::<PrivacySalt>(&[0u8; PRIVACY_SALT_LEN]).is_err());
    }
}
