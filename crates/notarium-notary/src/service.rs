//! Notary service flow.
//!
//! Every request goes through the same fixed steps:
//! 1. check the transaction (or tear-off) and that it matches the request
//! 2. check the time window against the notary clock, widened by the
//!    configured clock-skew tolerance if any
//! 3. check the request signature against the requesting party
//! 4. commit the inputs to the uniqueness provider
//! 5. sign the transaction id with every notary key
//!
//! Any failure ends the flow with a `NotaryError`; nothing is signed. Steps
//! 1-3 never touch the uniqueness index.

use core::fmt;
use core::str::FromStr;
use std::sync::Arc;

use borsh::{BorshDeserialize, BorshSerialize};
use notarium_core::{Clock, KeyPair, Party, PublicKey, StateRef, TimeWindow, TxId, PLATFORM_VERSION};
use notarium_tx::{ComponentGroupKind, FilteredTransaction, TxError, WireTransaction};
use time::Duration;
use tracing::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::NotaryError;
use crate::request::{NotarisationRequest, NotarisationResponse, SignedNotarisationRequest};
use crate::time_window::{validate_time_window, TimeWindowChecker};
use crate::uniqueness::{UniquenessError, UniquenessProvider};

/// What the notary inspects before committing.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NotaryMode {
    /// Receives the full transaction and decodes every group.
    #[default]
    Validating,
    /// Receives a tear-off revealing only inputs, notary and time window.
    NonValidating,
}

impl fmt::Display for NotaryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotaryMode::Validating => f.write_str("validating"),
            NotaryMode::NonValidating => f.write_str("non-validating"),
        }
    }
}

impl FromStr for NotaryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validating" => Ok(NotaryMode::Validating),
            "non-validating" => Ok(NotaryMode::NonValidating),
            other => Err(format!("unknown notary mode `{other}`")),
        }
    }
}

/// Groups a non-validating notary needs to see.
pub const NON_VALIDATING_GROUPS: [ComponentGroupKind; 3] = [
    ComponentGroupKind::Inputs,
    ComponentGroupKind::Notary,
    ComponentGroupKind::TimeWindow,
];

/// Service settings.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NotaryServiceConfig {
    /// Validating or non-validating.
    pub mode: NotaryMode,
    /// Platform version advertised by this notary.
    pub platform_version: u32,
    /// Clock-skew allowance on each time-window bound. `None` checks strictly.
    pub time_tolerance: Option<Duration>,
}

impl Default for NotaryServiceConfig {
    fn default() -> Self {
        Self {
            mode: NotaryMode::default(),
            platform_version: PLATFORM_VERSION,
            time_tolerance: None,
        }
    }
}

/// Transaction material sent with a request.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub enum TransactionPayload {
    /// Whole transaction (validating mode).
    Full(WireTransaction),
    /// Tear-off (non-validating mode).
    Filtered(FilteredTransaction),
}

/// Everything a requester sends to the notary.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
pub struct NotarisationPayload {
    /// Transaction or tear-off.
    pub transaction: TransactionPayload,
    /// Signed request naming the tx id and inputs.
    pub request: SignedNotarisationRequest,
}

impl NotarisationPayload {
    /// Build and sign the payload for `tx` as expected by a notary in `mode`.
    pub fn prepare(
        tx: &WireTransaction,
        mode: NotaryMode,
        requester_key: &KeyPair,
        platform_version: u32,
    ) -> Result<Self, NotaryError> {
        let inputs = tx.inputs().map_err(invalid)?;
        let request = NotarisationRequest::new(inputs, tx.id()).sign(requester_key, platform_version)?;
        let transaction = match mode {
            NotaryMode::Validating => TransactionPayload::Full(tx.clone()),
            NotaryMode::NonValidating => {
                TransactionPayload::Filtered(tx.build_filtered_transaction(&NON_VALIDATING_GROUPS))
            }
        };
        Ok(Self { transaction, request })
    }
}

/// Outcome returned to the requester.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NotaryReply {
    /// The transaction was notarised.
    Signed(NotarisationResponse),
    /// The request was rejected.
    Error(NotaryError),
}

impl NotaryReply {
    /// Convert into a `Result`.
    pub fn into_result(self) -> Result<NotarisationResponse, NotaryError> {
        match self {
            NotaryReply::Signed(r) => Ok(r),
            NotaryReply::Error(e) => Err(e),
        }
    }
}

/// The parts of a transaction the notary acts on.
struct TransactionView {
    id: TxId,
    inputs: Vec<StateRef>,
    notary: Option<Party>,
    time_window: Option<TimeWindow>,
}

/// Notary service over an injected uniqueness provider and clock.
///
/// Safe to share across threads; concurrent requests serialize only inside
/// the provider's commit.
pub struct NotaryService {
    identity: Party,
    keys: Vec<KeyPair>,
    provider: Arc<dyn UniquenessProvider>,
    clock: Arc<dyn Clock>,
    config: NotaryServiceConfig,
}

impl NotaryService {
    /// Service for `identity`, signing with `keys`.
    ///
    /// The keys must jointly fulfil the identity's owning key.
    pub fn new(
        identity: Party,
        keys: Vec<KeyPair>,
        provider: Arc<dyn UniquenessProvider>,
        clock: Arc<dyn Clock>,
        config: NotaryServiceConfig,
    ) -> Result<Self, NotaryError> {
        let public: Vec<PublicKey> = keys.iter().map(KeyPair::public_key).collect();
        if !identity.owning_key.is_fulfilled_by(&public) {
            return Err(NotaryError::General(format!(
                "signing keys do not fulfil the identity of {identity}"
            )));
        }
        Ok(Self {
            identity,
            keys,
            provider,
            clock,
            config,
        })
    }

    /// Notary identity.
    pub fn identity(&self) -> &Party {
        &self.identity
    }

    /// Active configuration.
    pub fn config(&self) -> &NotaryServiceConfig {
        &self.config
    }

    /// Handle one request from `requester` and produce the reply.
    pub fn process(&self, payload: NotarisationPayload, requester: &Party) -> NotaryReply {
        let tx_id = payload.request.request.tx_id;
        debug!(tx_id = %tx_id, requester = %requester, mode = %self.config.mode, "notarisation request received");
        match self.notarise(payload, requester) {
            Ok(response) => {
                info!(tx_id = %tx_id, requester = %requester, signatures = response.signatures.len(), "transaction notarised");
                NotaryReply::Signed(response)
            }
            Err(error) => {
                warn!(tx_id = %tx_id, requester = %requester, %error, "notarisation rejected");
                NotaryReply::Error(error)
            }
        }
    }

    fn notarise(&self, payload: NotarisationPayload, requester: &Party) -> Result<NotarisationResponse, NotaryError> {
        let view = self.extract(&payload.transaction)?;
        self.check_matches(&view, &payload.request.request)?;

        match self.config.time_tolerance {
            None => validate_time_window(self.clock.as_ref(), view.time_window.as_ref())?,
            Some(tolerance) => TimeWindowChecker::new(Arc::clone(&self.clock), tolerance)
                .validate(view.time_window.as_ref())?,
        }

        let verified = payload.request.verify(requester)?;

        self.provider
            .commit(&view.inputs, view.id, verified.requesting_party())
            .map_err(|e| match e {
                UniquenessError::Conflict(conflict) => NotaryError::Conflict {
                    tx_id: view.id,
                    conflict,
                },
                other => NotaryError::General(other.to_string()),
            })?;

        let signatures = self.keys.iter().map(|k| k.sign(view.id.as_bytes())).collect();
        Ok(NotarisationResponse { signatures })
    }

    fn extract(&self, payload: &TransactionPayload) -> Result<TransactionView, NotaryError> {
        match (self.config.mode, payload) {
            (NotaryMode::Validating, TransactionPayload::Full(tx)) => {
                // Every group must decode; contract rules are not checked here.
                tx.outputs().map_err(invalid)?;
                tx.commands().map_err(invalid)?;
                tx.attachments().map_err(invalid)?;
                Ok(TransactionView {
                    id: tx.id(),
                    inputs: tx.inputs().map_err(invalid)?,
                    notary: tx.notary().map_err(invalid)?,
                    time_window: tx.time_window().map_err(invalid)?,
                })
            }
            (NotaryMode::NonValidating, TransactionPayload::Filtered(ftx)) => {
                ftx.verify().map_err(invalid)?;
                for kind in NON_VALIDATING_GROUPS {
                    ftx.check_all_components_visible(kind).map_err(invalid)?;
                }
                Ok(TransactionView {
                    id: ftx.id(),
                    inputs: ftx.inputs().map_err(invalid)?,
                    notary: ftx.notary().map_err(invalid)?,
                    time_window: ftx.time_window().map_err(invalid)?,
                })
            }
            (mode, _) => Err(NotaryError::TransactionInvalid(format!(
                "payload kind not accepted by a {mode} notary"
            ))),
        }
    }

    fn check_matches(&self, view: &TransactionView, request: &NotarisationRequest) -> Result<(), NotaryError> {
        match &view.notary {
            Some(notary) if *notary == self.identity => {}
            Some(other) => {
                return Err(NotaryError::TransactionInvalid(format!(
                    "transaction names notary {other}, not {}",
                    self.identity
                )))
            }
            None => {
                return Err(NotaryError::TransactionInvalid(
                    "transaction does not name a notary".into(),
                ))
            }
        }
        if request.tx_id != view.id {
            return Err(NotaryError::TransactionInvalid(
                "request tx id does not match the transaction".into(),
            ));
        }
        if request.states != view.inputs {
            return Err(NotaryError::TransactionInvalid(
                "request inputs do not match the transaction".into(),
            ));
        }
        Ok(())
    }
}

fn invalid(e: TxError) -> NotaryError {
    NotaryError::TransactionInvalid(e.to_string())
}
