//! Notary error types.
//!
//! `NotaryError` crosses the wire back to requesters, so it is Borsh-encoded
//! and callers match on the variant, never on the message text.

use borsh::{BorshDeserialize, BorshSerialize};
use notarium_core::{TimeWindow, Timestamp, TxId};
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::uniqueness::Conflict;

/// Reason a notarisation request was rejected.
#[derive(Clone, PartialEq, Eq, Debug, Error, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NotaryError {
    /// One or more inputs were already consumed by another transaction.
    #[error("input state conflict in transaction {tx_id}: {conflict}")]
    Conflict {
        /// Transaction that lost the race.
        tx_id: TxId,
        /// Contested states and who consumed them.
        conflict: Conflict,
    },

    /// The notary's clock is outside the transaction's time window.
    #[error("current time {current_time} is outside the time window {time_window}")]
    TimeWindowInvalid {
        /// Time observed by the notary.
        current_time: Timestamp,
        /// Window declared by the transaction.
        time_window: TimeWindow,
    },

    /// The transaction or tear-off is malformed or does not match the request.
    #[error("transaction invalid: {0}")]
    TransactionInvalid(String),

    /// Missing, wrong-signer or cryptographically invalid request signature.
    #[error("request signature invalid: {0}")]
    RequestSignatureInvalid(String),

    /// Internal failure unrelated to the request (storage, encoding).
    #[error("notary failure: {0}")]
    General(String),
}
