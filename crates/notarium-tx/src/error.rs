//! Transaction model errors.

use notarium_core::CoreError;
use thiserror::Error;

use crate::component_group::ComponentGroupKind;

/// Errors produced while building, hashing, decoding or tearing off transactions.
#[derive(Debug, Error)]
pub enum TxError {
    /// Caller supplied structurally invalid input (empty Merkle input,
    /// malformed component group list, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A component failed to encode or decode.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A filtered transaction does not match its claimed commitment.
    #[error("filtered transaction invalid: {0}")]
    FilteredTransactionInvalid(&'static str),

    /// A component group needed by the caller was not revealed.
    #[error("component group {0:?} is not revealed")]
    ComponentGroupHidden(ComponentGroupKind),
}
