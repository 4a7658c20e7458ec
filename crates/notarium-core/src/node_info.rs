//! Signed node-identity documents.
//!
//! A `SignedNodeInfo` carries the raw Borsh bytes of a `NodeInfo` and one
//! signature per non-composite legal identity, in the order the identities
//! appear. Readers re-verify every document; nothing here is trusted until
//! `verified` returns.

use borsh::{BorshDeserialize, BorshSerialize};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::crypto::{DigitalSignature, KeyPair};
use crate::serialization::{from_bytes, to_bytes};
use crate::types::{CoreError, Party};

/// Identity payload published by a node at registration time.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeInfo {
    /// Network addresses (`host:port`).
    pub addresses: Vec<String>,
    /// Identities this node acts as. Composite identities carry no signature.
    pub legal_identities: Vec<Party>,
    /// Platform version the node runs.
    pub platform_version: u32,
    /// Monotonic serial; newer documents supersede older ones.
    pub serial: u64,
}

impl NodeInfo {
    /// Identities that must each contribute a signature, in document order.
    pub fn signing_identities(&self) -> impl Iterator<Item = &Party> {
        self.legal_identities
            .iter()
            .filter(|p| !p.owning_key.is_composite())
    }

    /// Serialize and sign with `keys`, one per signing identity, in order.
    ///
    /// No checking is done here: a mismatched key list produces a document
    /// that `verified` will reject.
    pub fn sign_with(&self, keys: &[KeyPair]) -> Result<SignedNodeInfo, CoreError> {
        let raw = to_bytes(self)?;
        let signatures = keys.iter().map(|k| k.sign_raw(&raw)).collect();
        Ok(SignedNodeInfo { raw, signatures })
    }
}

/// Which way a signature count was wrong.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SignatureCountKind {
    /// More signatures than signing identities.
    Extra,
    /// Fewer signatures than signing identities.
    Missing,
}

impl core::fmt::Display for SignatureCountKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SignatureCountKind::Extra => f.write_str("Extra"),
            SignatureCountKind::Missing => f.write_str("Missing"),
        }
    }
}

/// Reasons a signed identity document is rejected.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// Raw payload does not decode to a `NodeInfo`.
    #[error("malformed node info: {0}")]
    Malformed(#[from] CoreError),

    /// Signature list length differs from the number of signing identities.
    #[error("{kind} signatures. Found {found} expected {expected}")]
    SignatureCountMismatch {
        /// Extra or missing.
        kind: SignatureCountKind,
        /// Signatures supplied.
        found: usize,
        /// Signing identities declared.
        expected: usize,
    },

    /// The signature at this identity's position does not verify.
    #[error("{identity}: signature verification failed")]
    InvalidSignature {
        /// Name of the identity whose signature failed.
        identity: String,
    },
}

/// Raw identity payload plus ordered signatures.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SignedNodeInfo {
    /// Borsh bytes of the `NodeInfo`, exactly as signed.
    pub raw: Vec<u8>,
    /// One signature per non-composite identity, same order.
    pub signatures: Vec<DigitalSignature>,
}

impl SignedNodeInfo {
    /// Verify every signature positionally and return the payload.
    ///
    /// A correct signature in the wrong position fails as the identity it was
    /// checked against; signatures are never matched out of order.
    pub fn verified(&self) -> Result<NodeInfo, IdentityError> {
        let node_info: NodeInfo = from_bytes(&self.raw)?;
        let identities: Vec<&Party> = node_info.signing_identities().collect();

        if identities.len() < self.signatures.len() {
            return Err(IdentityError::SignatureCountMismatch {
                kind: SignatureCountKind::Extra,
                found: self.signatures.len(),
                expected: identities.len(),
            });
        }
        if identities.len() > self.signatures.len() {
            return Err(IdentityError::SignatureCountMismatch {
                kind: SignatureCountKind::Missing,
                found: self.signatures.len(),
                expected: identities.len(),
            });
        }

        for (identity, signature) in identities.iter().zip(&self.signatures) {
            identity
                .owning_key
                .verify(&self.raw, signature)
                .map_err(|_| IdentityError::InvalidSignature {
                    identity: identity.name.clone(),
                })?;
        }

        Ok(node_info)
    }
}
