// Consensus-critical. Changes require a protocol version bump + tests.
//! Double-spend detection.
//!
//! A uniqueness provider owns the index of consumed states. `commit` is one
//! atomic check-and-set per request: either every input is recorded as
//! consumed by the transaction, or nothing changes and the contested inputs
//! are reported.
//!
//! Resubmission policy: inputs already consumed by the *same* transaction id
//! are not contested. A retried request therefore succeeds again, while any
//! input consumed by a different transaction fails the whole request.

use core::fmt;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use borsh::{BorshDeserialize, BorshSerialize};
use hashbrown::HashMap;
use notarium_core::{Party, StateRef, TxId};
use thiserror::Error;
use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Record of the transaction that consumed a state.
#[derive(Clone, PartialEq, Eq, Debug, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConsumingTx {
    /// Consuming transaction id.
    pub id: TxId,
    /// Position of the state among that transaction's inputs.
    pub input_index: u32,
    /// Party that requested notarisation of that transaction.
    pub requesting_party: Party,
}

/// Contested states mapped to the transactions that already consumed them.
#[derive(Clone, PartialEq, Eq, Debug, Default, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Conflict {
    #[cfg_attr(feature = "serde", serde(with = "history_as_pairs"))]
    state_history: BTreeMap<StateRef, ConsumingTx>,
}

/// JSON object keys must be strings, so the history travels as a list of pairs.
#[cfg(feature = "serde")]
mod history_as_pairs {
    use std::collections::BTreeMap;

    use notarium_core::StateRef;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::ConsumingTx;

    pub fn serialize<S: Serializer>(history: &BTreeMap<StateRef, ConsumingTx>, s: S) -> Result<S::Ok, S::Error> {
        s.collect_seq(history.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<StateRef, ConsumingTx>, D::Error> {
        let pairs = Vec::<(StateRef, ConsumingTx)>::deserialize(d)?;
        Ok(pairs.into_iter().collect())
    }
}

impl Conflict {
    /// Conflict over the given states.
    pub fn new(state_history: BTreeMap<StateRef, ConsumingTx>) -> Self {
        Self { state_history }
    }

    /// Contested states, in ascending order.
    pub fn contested_states(&self) -> impl Iterator<Item = &StateRef> {
        self.state_history.keys()
    }

    /// Who consumed `state`, if it is contested.
    pub fn consumer_of(&self, state: &StateRef) -> Option<&ConsumingTx> {
        self.state_history.get(state)
    }

    /// Full contested-state map.
    pub fn state_history(&self) -> &BTreeMap<StateRef, ConsumingTx> {
        &self.state_history
    }

    /// Number of contested states.
    pub fn len(&self) -> usize {
        self.state_history.len()
    }

    /// Whether nothing is contested.
    pub fn is_empty(&self) -> bool {
        self.state_history.is_empty()
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (state, consumer) in &self.state_history {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{state} consumed by {}", consumer.id)?;
        }
        Ok(())
    }
}

/// Failure of a uniqueness commit.
#[derive(Debug, Error)]
pub enum UniquenessError {
    /// Some inputs were already consumed by other transactions. Nothing was
    /// recorded.
    #[error("input states already consumed: {0}")]
    Conflict(Conflict),

    /// The backing store failed.
    #[error("uniqueness store failure: {0}")]
    Storage(String),

    /// A stored record could not be decoded.
    #[error("corrupt uniqueness record: {0}")]
    Corrupt(String),
}

/// Consumed-state index with an atomic check-and-commit.
///
/// Implementations must only return `Ok(())` once the commit is durable for
/// their storage class, and must never record a partial batch.
pub trait UniquenessProvider: Send + Sync {
    /// Record `states` as consumed by `tx_id`, or report the conflicts.
    fn commit(&self, states: &[StateRef], tx_id: TxId, requesting_party: &Party) -> Result<(), UniquenessError>;

    /// Who consumed `state`, if anyone. Read-only; not used by the notary flow.
    fn lookup(&self, state: &StateRef) -> Result<Option<ConsumingTx>, UniquenessError>;

    /// Number of consumed states.
    fn len(&self) -> Result<usize, UniquenessError>;

    /// Whether no state has been consumed yet.
    fn is_empty(&self) -> Result<bool, UniquenessError> {
        Ok(self.len()? == 0)
    }
}

/// Outcome of checking a batch against the index, before any write.
pub(crate) struct CommitPlan {
    /// States not yet consumed, with their request position.
    pub fresh: Vec<(StateRef, ConsumingTx)>,
    /// States consumed by other transactions.
    pub conflicts: BTreeMap<StateRef, ConsumingTx>,
}

/// Classify each requested state using `existing` to read the index.
///
/// Duplicate references within a request are treated as one; the first
/// position wins.
pub(crate) fn plan_commit<E>(
    states: &[StateRef],
    tx_id: TxId,
    requesting_party: &Party,
    mut existing: impl FnMut(&StateRef) -> Result<Option<ConsumingTx>, E>,
) -> Result<CommitPlan, E> {
    let mut plan = CommitPlan {
        fresh: Vec::with_capacity(states.len()),
        conflicts: BTreeMap::new(),
    };
    let mut seen: Vec<StateRef> = Vec::with_capacity(states.len());
    for (position, state) in states.iter().enumerate() {
        if seen.contains(state) {
            continue;
        }
        seen.push(*state);
        match existing(state)? {
            Some(consumer) if consumer.id == tx_id => {}
            Some(consumer) => {
                plan.conflicts.insert(*state, consumer);
            }
            None => plan.fresh.push((
                *state,
                ConsumingTx {
                    id: tx_id,
                    input_index: position as u32,
                    requesting_party: requesting_party.clone(),
                },
            )),
        }
    }
    Ok(plan)
}

/// Volatile provider for tests and single-process deployments.
///
/// Commits are atomic and linearizable but do not survive a restart.
#[derive(Debug, Default)]
pub struct InMemoryUniquenessProvider {
    consumed: Mutex<HashMap<StateRef, ConsumingTx>>,
}

impl InMemoryUniquenessProvider {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

impl UniquenessProvider for InMemoryUniquenessProvider {
    fn commit(&self, states: &[StateRef], tx_id: TxId, requesting_party: &Party) -> Result<(), UniquenessError> {
        // Map entries are only inserted after the full check, so a poisoned
        // lock still guards a consistent index.
        let mut consumed = self.consumed.lock().unwrap_or_else(PoisonError::into_inner);
        let plan = plan_commit::<UniquenessError>(states, tx_id, requesting_party, |s| {
            Ok(consumed.get(s).cloned())
        })?;
        if !plan.conflicts.is_empty() {
            warn!(tx_id = %tx_id, contested = plan.conflicts.len(), "uniqueness conflict");
            return Err(UniquenessError::Conflict(Conflict::new(plan.conflicts)));
        }
        debug!(tx_id = %tx_id, recorded = plan.fresh.len(), "states committed");
        consumed.extend(plan.fresh);
        Ok(())
    }

    fn lookup(&self, state: &StateRef) -> Result<Option<ConsumingTx>, UniquenessError> {
        let consumed = self.consumed.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(consumed.get(state).cloned())
    }

    fn len(&self) -> Result<usize, UniquenessError> {
        let consumed = self.consumed.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(consumed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notarium_core::{KeyPair, SecureHash};
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn party(name: &str) -> Party {
        Party::new(name, KeyPair::generate().public_key())
    }

    fn state(b: u8, i: u32) -> StateRef {
        StateRef::new(SecureHash([b; 32]), i)
    }

    fn tx(b: u8) -> TxId {
        SecureHash([b; 32])
    }

    #[test]
    fn first_commit_records_every_input() {
        let p = InMemoryUniquenessProvider::new();
        let alice = party("O=Alice");
        p.commit(&[state(1, 0), state(1, 1)], tx(9), &alice).expect("commit");
        assert_eq!(p.len().expect("len"), 2);
        let rec = p.lookup(&state(1, 1)).expect("lookup").expect("consumed");
        assert_eq!(rec.id, tx(9));
        assert_eq!(rec.input_index, 1);
        assert_eq!(rec.requesting_party, alice);
    }

    #[test]
    fn conflict_names_winner_and_leaves_index_untouched() {
        let p = InMemoryUniquenessProvider::new();
        p.commit(&[state(1, 0)], tx(1), &party("O=Alice")).expect("commit");
        let err = p
            .commit(&[state(2, 0), state(1, 0)], tx(2), &party("O=Bob"))
            .expect_err("conflict");
        match err {
            UniquenessError::Conflict(c) => {
                assert_eq!(c.len(), 1);
                assert_eq!(c.consumer_of(&state(1, 0)).map(|r| r.id), Some(tx(1)));
            }
            other => panic!("unexpected error: {other}"),
        }
        // No partial insertion of the non-contested input.
        assert_eq!(p.lookup(&state(2, 0)).expect("lookup"), None);
        assert_eq!(p.len().expect("len"), 1);
    }

    #[test]
    fn resubmission_of_same_transaction_is_ok() {
        let p = InMemoryUniquenessProvider::new();
        let alice = party("O=Alice");
        let inputs = [state(1, 0), state(1, 1)];
        p.commit(&inputs, tx(5), &alice).expect("first");
        p.commit(&inputs, tx(5), &alice).expect("again");
        assert_eq!(p.len().expect("len"), 2);
    }

    #[test]
    fn duplicate_refs_in_one_request_are_a_set() {
        let p = InMemoryUniquenessProvider::new();
        p.commit(&[state(1, 0), state(1, 0)], tx(5), &party("O=Alice")).expect("commit");
        assert_eq!(p.len().expect("len"), 1);
    }

    #[test]
    fn empty_request_is_a_no_op() {
        let p = InMemoryUniquenessProvider::new();
        p.commit(&[], tx(5), &party("O=Alice")).expect("commit");
        assert!(p.is_empty().expect("empty"));
    }

    #[test]
    fn concurrent_commits_have_exactly_one_winner() {
        let p = Arc::new(InMemoryUniquenessProvider::new());
        let inputs = vec![state(1, 0), state(1, 1), state(2, 0)];
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let p = Arc::clone(&p);
                let inputs = inputs.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let requester = party(&format!("O=Requester{i}"));
                    barrier.wait();
                    p.commit(&inputs, tx(100 + i), &requester).map(|_| tx(100 + i))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().expect("join")).collect();
        let winners: Vec<TxId> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
        assert_eq!(winners.len(), 1);
        for r in &results {
            if let Err(UniquenessError::Conflict(c)) = r {
                assert_eq!(c.len(), 3);
                assert!(c.state_history().values().all(|rec| rec.id == winners[0]));
            } else {
                assert!(r.is_ok());
            }
        }
        assert_eq!(p.len().expect("len"), 3);
    }
}
