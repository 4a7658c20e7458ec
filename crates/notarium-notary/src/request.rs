// Consensus-critical. Changes require a protocol version bump + tests.
//! Notarisation request and response messages.
//!
//! A request moves through three types:
//! `NotarisationRequest` (created) → `SignedNotarisationRequest` (signature
//! attached) → `VerifiedNotarisationRequest` (signature checked against the
//! counterparty). Only the last is accepted by the notary service.
//!
//! The signed message is `DS_NOTARISATION_REQUEST || SERIALIZATION_VERSION (u16 LE) || borsh(request)`,
//! so a signature made under another serialization version never verifies.

use borsh::{BorshDeserialize, BorshSerialize};
use notarium_core::{
    to_bytes, CryptoError, DigitalSignatureWithKey, KeyPair, Party, StateRef, TransactionSignature,
    TxId, DS_NOTARISATION_REQUEST, SERIALIZATION_VERSION,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::NotaryError;

/// Claim that `tx_id` spends `states`.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NotarisationRequest {
    /// Input states being consumed.
    pub states: Vec<StateRef>,
    /// Transaction consuming them.
    pub tx_id: TxId,
}

impl NotarisationRequest {
    /// New request.
    pub fn new(states: Vec<StateRef>, tx_id: TxId) -> Self {
        Self { states, tx_id }
    }

    /// Exact bytes covered by a request signature.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, NotaryError> {
        let body = to_bytes(self).map_err(|e| NotaryError::General(e.to_string()))?;
        let mut msg = Vec::with_capacity(DS_NOTARISATION_REQUEST.len() + 2 + body.len());
        msg.extend_from_slice(DS_NOTARISATION_REQUEST);
        msg.extend_from_slice(&SERIALIZATION_VERSION.to_le_bytes());
        msg.extend_from_slice(&body);
        Ok(msg)
    }

    /// Sign with the requester's identity key.
    pub fn sign(self, key: &KeyPair, platform_version: u32) -> Result<SignedNotarisationRequest, NotaryError> {
        let msg = self.signing_bytes()?;
        let signature = NotarisationRequestSignature {
            digital_signature: key.sign(&msg),
            platform_version,
        };
        Ok(SignedNotarisationRequest {
            request: self,
            signature,
        })
    }
}

/// Request signature plus the signer's platform version.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NotarisationRequestSignature {
    /// Signature over `NotarisationRequest::signing_bytes`.
    pub digital_signature: DigitalSignatureWithKey,
    /// Platform version of the signing node.
    pub platform_version: u32,
}

/// A request with its signature, not yet checked.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SignedNotarisationRequest {
    /// The request.
    pub request: NotarisationRequest,
    /// Claimed requester signature.
    pub signature: NotarisationRequestSignature,
}

impl SignedNotarisationRequest {
    /// Check that `intended_signer` signed exactly this request.
    ///
    /// A different declared key, corrupted bytes and a bad signature all fail
    /// with `RequestSignatureInvalid`.
    pub fn verify(self, intended_signer: &Party) -> Result<VerifiedNotarisationRequest, NotaryError> {
        let signature = &self.signature.digital_signature;
        if signature.by != intended_signer.owning_key {
            return Err(NotaryError::RequestSignatureInvalid(format!(
                "expected a signature by {}, but received one by {}",
                intended_signer.owning_key, signature.by
            )));
        }
        let msg = self.request.signing_bytes()?;
        signature
            .verify(&msg)
            .map_err(|e| NotaryError::RequestSignatureInvalid(e.to_string()))?;
        Ok(VerifiedNotarisationRequest {
            request: self.request,
            requesting_party: intended_signer.clone(),
            platform_version: self.signature.platform_version,
        })
    }
}

/// A request whose signature has been checked against its sender.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct VerifiedNotarisationRequest {
    request: NotarisationRequest,
    requesting_party: Party,
    platform_version: u32,
}

impl VerifiedNotarisationRequest {
    /// The authenticated request.
    pub fn request(&self) -> &NotarisationRequest {
        &self.request
    }

    /// Who sent it.
    pub fn requesting_party(&self) -> &Party {
        &self.requesting_party
    }

    /// Sender's platform version.
    pub fn platform_version(&self) -> u32 {
        self.platform_version
    }
}

/// Notary signatures over an accepted transaction id.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NotarisationResponse {
    /// One signature per notary signing key.
    pub signatures: Vec<TransactionSignature>,
}

impl NotarisationResponse {
    /// Check that the signers fulfil `notary`'s key and each signature covers `tx_id`.
    pub fn validate_signatures(&self, tx_id: &TxId, notary: &Party) -> Result<(), CryptoError> {
        let signing_keys: Vec<_> = self.signatures.iter().map(|s| s.by.clone()).collect();
        if !notary.owning_key.is_fulfilled_by(&signing_keys) {
            return Err(CryptoError::InsufficientSignatures);
        }
        for signature in &self.signatures {
            signature.verify(tx_id.as_bytes())?;
        }
        Ok(())
    }
}
