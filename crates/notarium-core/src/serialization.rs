// Consensus-critical. Changes require a protocol version bump + tests.
//! Canonical serialization helpers.
//!
//! Rule: everything that is hashed or signed is encoded with Borsh.
//! Do not use JSON or non-canonical formats for hashing/signing/consensus.

use crate::constants::*;
use crate::types::{CoreError, SecureHash};
use borsh::{to_vec, BorshDeserialize, BorshSerialize};

/// Encode a value with canonical Borsh encoding.
pub fn to_bytes<T: BorshSerialize>(v: &T) -> Result<Vec<u8>, CoreError> {
    to_vec(v).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// Decode a value from canonical Borsh bytes, rejecting trailing data.
pub fn from_bytes<T: BorshDeserialize>(bytes: &[u8]) -> Result<T, CoreError> {
    T::try_from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// Hash bytes with blake3 under a domain separator and return 32 bytes.
pub fn hash32(domain_sep: &[u8], bytes: &[u8]) -> SecureHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain_sep);
    hasher.update(bytes);
    let out = hasher.finalize();
    let mut arr = [0u8; HASH32_LEN];
    arr.copy_from_slice(out.as_bytes());
    SecureHash(arr)
}

/// Hash the concatenation of several byte slices under a domain separator.
///
/// Equivalent to `hash32(domain_sep, parts.concat())` without the allocation.
pub fn hash32_concat(domain_sep: &[u8], parts: &[&[u8]]) -> SecureHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain_sep);
    for part in parts {
        hasher.update(part);
    }
    let out = hasher.finalize();
    let mut arr = [0u8; HASH32_LEN];
    arr.copy_from_slice(out.as_bytes());
    SecureHash(arr)
}
