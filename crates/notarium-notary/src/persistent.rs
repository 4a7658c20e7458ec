// Consensus-critical. Changes require a protocol version bump + tests.
//! Durable uniqueness index on sled.
//!
//! Layout: tree `consumed_states`, key `borsh(StateRef)` (36 bytes), value
//! `borsh(ConsumingTx)`. Records are never removed.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use borsh::BorshDeserialize;
use notarium_core::{to_bytes, Party, StateRef, TxId};
use sled::transaction::{abort, ConflictableTransactionError, TransactionError, TransactionResult};
use tracing::{debug, info, warn};

use crate::uniqueness::{plan_commit, Conflict, ConsumingTx, UniquenessError, UniquenessProvider};

const TREE_CONSUMED: &str = "consumed_states";

/// Reasons a commit transaction aborts without writing.
#[derive(Debug)]
enum CommitAbort {
    Conflict(Conflict),
    Corrupt(String),
}

/// Uniqueness provider whose index survives restarts.
///
/// `commit` returns `Ok` only after the sled log has been flushed.
pub struct PersistentUniquenessProvider {
    db: sled::Db,
    consumed: sled::Tree,
    commit_lock: Mutex<()>,
}

impl PersistentUniquenessProvider {
    /// Open (or create) the index at `path`.
    pub fn open(path: &Path) -> Result<Self, UniquenessError> {
        let db = sled::open(path).map_err(storage)?;
        let consumed = db.open_tree(TREE_CONSUMED).map_err(storage)?;
        info!(path = %path.display(), states = consumed.len(), "uniqueness index opened");
        Ok(Self {
            db,
            consumed,
            commit_lock: Mutex::new(()),
        })
    }

    /// Every consumed state, in key order.
    pub fn entries(&self) -> Result<Vec<(StateRef, ConsumingTx)>, UniquenessError> {
        let mut out = Vec::new();
        for item in self.consumed.iter() {
            let (k, v) = item.map_err(storage)?;
            let state = StateRef::try_from_slice(&k).map_err(corrupt)?;
            let consumer = ConsumingTx::try_from_slice(&v).map_err(corrupt)?;
            out.push((state, consumer));
        }
        Ok(out)
    }
}

impl UniquenessProvider for PersistentUniquenessProvider {
    fn commit(&self, states: &[StateRef], tx_id: TxId, requesting_party: &Party) -> Result<(), UniquenessError> {
        let _guard = self.commit_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let res: TransactionResult<usize, CommitAbort> = self.consumed.transaction(|tree| {
            let plan = plan_commit::<ConflictableTransactionError<CommitAbort>>(
                states,
                tx_id,
                requesting_party,
                |state| {
                    let key = to_bytes(state).map_err(abort_corrupt)?;
                    match tree.get(key)? {
                        Some(bytes) => ConsumingTx::try_from_slice(&bytes)
                            .map(Some)
                            .map_err(abort_corrupt),
                        None => Ok(None),
                    }
                },
            )?;
            if !plan.conflicts.is_empty() {
                return abort(CommitAbort::Conflict(Conflict::new(plan.conflicts)));
            }
            for (state, consumer) in &plan.fresh {
                let key = to_bytes(state).map_err(abort_corrupt)?;
                let value = to_bytes(consumer).map_err(abort_corrupt)?;
                tree.insert(key, value)?;
            }
            Ok(plan.fresh.len())
        });

        match res {
            Ok(recorded) => {
                self.db.flush().map_err(storage)?;
                debug!(tx_id = %tx_id, recorded, "states committed durably");
                Ok(())
            }
            Err(TransactionError::Abort(CommitAbort::Conflict(conflict))) => {
                warn!(tx_id = %tx_id, contested = conflict.len(), "uniqueness conflict");
                Err(UniquenessError::Conflict(conflict))
            }
            Err(TransactionError::Abort(CommitAbort::Corrupt(reason))) => Err(UniquenessError::Corrupt(reason)),
            Err(TransactionError::Storage(e)) => Err(storage(e)),
        }
    }

    fn lookup(&self, state: &StateRef) -> Result<Option<ConsumingTx>, UniquenessError> {
        let key = to_bytes(state).map_err(|e| UniquenessError::Corrupt(e.to_string()))?;
        match self.consumed.get(key).map_err(storage)? {
            Some(bytes) => Ok(Some(ConsumingTx::try_from_slice(&bytes).map_err(corrupt)?)),
            None => Ok(None),
        }
    }

    fn len(&self) -> Result<usize, UniquenessError> {
        Ok(self.consumed.len())
    }
}

fn storage(e: sled::Error) -> UniquenessError {
    UniquenessError::Storage(e.to_string())
}

fn corrupt(e: std::io::Error) -> UniquenessError {
    UniquenessError::Corrupt(e.to_string())
}

fn abort_corrupt(e: impl ToString) -> ConflictableTransactionError<CommitAbort> {
    ConflictableTransactionError::Abort(CommitAbort::Corrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notarium_core::{KeyPair, SecureHash};
    use tempfile::tempdir;

    fn state(b: u8, i: u32) -> StateRef {
        StateRef::new(SecureHash([b; 32]), i)
    }

    #[test]
    fn commit_survives_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("uniqueness");
        let alice = Party::new("O=Alice", KeyPair::generate().public_key());
        {
            let p = PersistentUniquenessProvider::open(&path).expect("open");
            p.commit(&[state(1, 0), state(1, 1)], SecureHash([7; 32]), &alice)
                .expect("commit");
        }
        let p = PersistentUniquenessProvider::open(&path).expect("reopen");
        assert_eq!(p.len().expect("len"), 2);
        let rec = p.lookup(&state(1, 1)).expect("lookup").expect("consumed");
        assert_eq!(rec.id, SecureHash([7; 32]));
        assert_eq!(rec.input_index, 1);
        assert_eq!(rec.requesting_party, alice);

        let err = p
            .commit(&[state(1, 0)], SecureHash([8; 32]), &alice)
            .expect_err("double spend after restart");
        assert!(matches!(err, UniquenessError::Conflict(_)));
    }

    #[test]
    fn conflict_writes_nothing() {
        let dir = tempdir().expect("tempdir");
        let p = PersistentUniquenessProvider::open(&dir.path().join("db")).expect("open");
        let alice = Party::new("O=Alice", KeyPair::generate().public_key());
        p.commit(&[state(1, 0)], SecureHash([1; 32]), &alice).expect("commit");
        assert!(p
            .commit(&[state(3, 0), state(1, 0)], SecureHash([2; 32]), &alice)
            .is_err());
        assert_eq!(p.lookup(&state(3, 0)).expect("lookup"), None);
        let entries = p.entries().expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, state(1, 0));
    }

    #[test]
    fn resubmission_is_idempotent() {
        let dir = tempdir().expect("tempdir");
        let p = PersistentUniquenessProvider::open(&dir.path().join("db")).expect("open");
        let alice = Party::new("O=Alice", KeyPair::generate().public_key());
        let inputs = [state(4, 0), state(4, 1)];
        p.commit(&inputs, SecureHash([1; 32]), &alice).expect("first");
        p.commit(&inputs, SecureHash([1; 32]), &alice).expect("retry");
        assert_eq!(p.len().expect("len"), 2);
    }
}
