//! Reference transaction through commitment, tear-off and double-spend race.

use std::sync::{Arc, Barrier};
use std::thread;

use notarium_core::{FixedClock, KeyPair, Party, PrivacySalt, StateRef, TimeWindow, Timestamp};
use notarium_notary::{
    NotarisationPayload, NotaryError, NotaryMode, NotaryReply, NotaryService, NotaryServiceConfig,
    PersistentUniquenessProvider, UniquenessError, UniquenessProvider,
};
use notarium_tx::{Command, ComponentGroupKind, OutputState, TransactionBuilder, WireTransaction};
use serde::Deserialize;
use tempfile::tempdir;

#[derive(Deserialize)]
struct Vector {
    privacy_salt: String,
    signer_secret: String,
    notary_secret: String,
    notary_name: String,
    inputs: Vec<String>,
    time_window_from_ms: i64,
    time_window_until_ms: i64,
    transaction_id: String,
}

fn load() -> Vector {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../tests/vectors/transaction_id.json");
    serde_json::from_str(&std::fs::read_to_string(path).expect("read")).expect("parse")
}

fn keypair(secret_hex: &str) -> KeyPair {
    let bytes: [u8; 32] = hex::decode(secret_hex).expect("hex").try_into().expect("32 bytes");
    KeyPair::from_secret_bytes(&bytes).expect("key")
}

fn build(v: &Vector, inputs: &[StateRef]) -> WireTransaction {
    let signer = keypair(&v.signer_secret);
    let notary = keypair(&v.notary_secret);
    let mut builder = TransactionBuilder::new();
    for input in inputs {
        builder = builder.add_input(*input);
    }
    builder
        .add_output(OutputState {
            contract: "cash".into(),
            data: vec![1, 2, 3],
        })
        .add_output(OutputState {
            contract: "cash".into(),
            data: vec![4],
        })
        .add_command(Command {
            value: b"move".to_vec(),
            signers: vec![signer.public_key()],
        })
        .notary(Party::new(v.notary_name.clone(), notary.public_key()))
        .time_window(
            TimeWindow::between(Timestamp(v.time_window_from_ms), Timestamp(v.time_window_until_ms))
                .expect("window"),
        )
        .privacy_salt(v.privacy_salt.parse::<PrivacySalt>().expect("salt"))
        .build()
        .expect("tx")
}

fn reference_inputs(v: &Vector) -> Vec<StateRef> {
    v.inputs.iter().map(|s| s.parse().expect("state ref")).collect()
}

#[test]
fn reference_scenario() {
    let v = load();
    let inputs = reference_inputs(&v);
    let original = build(&v, &inputs);
    assert_eq!(original.id().to_string(), v.transaction_id);

    let mut reordered_inputs = inputs.clone();
    reordered_inputs.swap(0, 2);
    let reordered = build(&v, &reordered_inputs);
    assert_ne!(reordered.id(), original.id());
    let a = original.group_merkle_roots();
    let b = reordered.group_merkle_roots();
    let outputs = ComponentGroupKind::Outputs.index() as usize;
    assert_eq!(a[outputs], b[outputs]);
    assert_ne!(a[0], b[0]);

    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("uniqueness");
    let provider = Arc::new(PersistentUniquenessProvider::open(&path).expect("open"));
    let barrier = Arc::new(Barrier::new(2));
    let contenders = vec![
        (original.id(), Party::new("O=Alice", KeyPair::generate().public_key())),
        (reordered.id(), Party::new("O=Bob", KeyPair::generate().public_key())),
    ];
    let handles: Vec<_> = contenders
        .into_iter()
        .map(|(tx_id, requester)| {
            let provider = Arc::clone(&provider);
            let barrier = Arc::clone(&barrier);
            let inputs = inputs.clone();
            thread::spawn(move || {
                barrier.wait();
                (tx_id, provider.commit(&inputs, tx_id, &requester))
            })
        })
        .collect();
    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().expect("join")).collect();

    let winners: Vec<_> = outcomes.iter().filter(|(_, r)| r.is_ok()).map(|(id, _)| *id).collect();
    assert_eq!(winners.len(), 1);
    let winner = winners[0];
    let conflicts: Vec<_> = outcomes
        .iter()
        .filter_map(|(_, r)| match r {
            Err(UniquenessError::Conflict(c)) => Some(c),
            _ => None,
        })
        .collect();
    assert_eq!(conflicts.len(), 1);
    let contested: Vec<StateRef> = conflicts[0].contested_states().copied().collect();
    let mut expected = inputs.clone();
    expected.sort();
    assert_eq!(contested, expected);
    assert!(conflicts[0].state_history().values().all(|c| c.id == winner));

    drop(provider);
    let reopened = PersistentUniquenessProvider::open(&path).expect("reopen");
    let entries = reopened.entries().expect("entries");
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|(_, c)| c.id == winner));
}

#[test]
fn concurrent_notarisation_through_the_service() {
    let v = load();
    let inputs = reference_inputs(&v);
    let original = build(&v, &inputs);
    let mut reordered_inputs = inputs.clone();
    reordered_inputs.reverse();
    let rival = build(&v, &reordered_inputs);

    let notary_key = keypair(&v.notary_secret);
    let notary = Party::new(v.notary_name.clone(), notary_key.public_key());
    let dir = tempdir().expect("tempdir");
    let provider = Arc::new(PersistentUniquenessProvider::open(&dir.path().join("db")).expect("open"));
    let clock = Arc::new(FixedClock::new(Timestamp(v.time_window_from_ms + 30_000)));
    let service = Arc::new(
        NotaryService::new(
            notary.clone(),
            vec![notary_key],
            provider,
            clock,
            NotaryServiceConfig {
                mode: NotaryMode::NonValidating,
                platform_version: 1,
                time_tolerance: None,
            },
        )
        .expect("service"),
    );

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = [("O=Alice", original.clone()), ("O=Bob", rival.clone())]
        .into_iter()
        .map(|(name, tx)| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let key = KeyPair::generate();
                let requester = Party::new(name, key.public_key());
                let payload =
                    NotarisationPayload::prepare(&tx, NotaryMode::NonValidating, &key, 1).expect("payload");
                barrier.wait();
                (tx.id(), service.process(payload, &requester))
            })
        })
        .collect();
    let replies: Vec<_> = handles.into_iter().map(|h| h.join().expect("join")).collect();

    let signed: Vec<_> = replies
        .iter()
        .filter_map(|(id, r)| match r {
            NotaryReply::Signed(resp) => Some((*id, resp)),
            NotaryReply::Error(_) => None,
        })
        .collect();
    assert_eq!(signed.len(), 1);
    let (winner, response) = signed[0];
    response.validate_signatures(&winner, &notary).expect("notary signature");

    let rejected: Vec<_> = replies
        .iter()
        .filter_map(|(_, r)| match r {
            NotaryReply::Error(NotaryError::Conflict { conflict, .. }) => Some(conflict),
            _ => None,
        })
        .collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].len(), 3);
}

#[test]
fn reply_survives_the_wire() {
    let v = load();
    let tx = build(&v, &reference_inputs(&v));
    let notary_key = keypair(&v.notary_secret);
    let notary = Party::new(v.notary_name.clone(), notary_key.public_key());
    let dir = tempdir().expect("tempdir");
    let service = NotaryService::new(
        notary,
        vec![notary_key],
        Arc::new(PersistentUniquenessProvider::open(&dir.path().join("db")).expect("open")),
        Arc::new(FixedClock::new(Timestamp(v.time_window_until_ms))),
        NotaryServiceConfig::default(),
    )
    .expect("service");
    let key = keypair(&v.signer_secret);
    let requester = Party::new("O=Alice", key.public_key());
    let payload = NotarisationPayload::prepare(&tx, NotaryMode::Validating, &key, 1).expect("payload");

    let bytes = borsh::to_vec(&payload).expect("encode payload");
    let payload: NotarisationPayload = borsh::from_slice(&bytes).expect("decode payload");

    let reply = service.process(payload, &requester);
    let bytes = borsh::to_vec(&reply).expect("encode reply");
    let decoded: NotaryReply = borsh::from_slice(&bytes).expect("decode reply");
    assert_eq!(decoded, reply);
    assert!(matches!(decoded, NotaryReply::Error(NotaryError::TimeWindowInvalid { .. })));
}

#[test]
fn identical_requests_in_flight_all_succeed() {
    let v = load();
    let inputs = reference_inputs(&v);
    let tx = build(&v, &inputs);
    let notary_key = keypair(&v.notary_secret);
    let notary = Party::new(v.notary_name.clone(), notary_key.public_key());
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("db");
    let provider = Arc::new(PersistentUniquenessProvider::open(&path).expect("open"));
    let service = Arc::new(
        NotaryService::new(
            notary.clone(),
            vec![notary_key],
            provider.clone(),
            Arc::new(FixedClock::new(Timestamp(v.time_window_from_ms))),
            NotaryServiceConfig::default(),
        )
        .expect("service"),
    );
    let key = keypair(&v.signer_secret);
    let requester = Party::new("O=Alice", key.public_key());
    let payload = NotarisationPayload::prepare(&tx, NotaryMode::Validating, &key, 1).expect("payload");

    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            let payload = payload.clone();
            let requester = requester.clone();
            thread::spawn(move || {
                barrier.wait();
                service.process(payload, &requester)
            })
        })
        .collect();
    for handle in handles {
        match handle.join().expect("join") {
            NotaryReply::Signed(response) => {
                response.validate_signatures(&tx.id(), &notary).expect("notary signature");
            }
            NotaryReply::Error(e) => panic!("identical request rejected: {e}"),
        }
    }

    // A retry after the session is gone still succeeds.
    let retry = service.process(payload, &requester);
    assert!(matches!(retry, NotaryReply::Signed(_)));

    let entries = provider.entries().expect("entries");
    assert_eq!(entries.len(), inputs.len());
    for input in &inputs {
        assert_eq!(entries.iter().filter(|(state, _)| state == input).count(), 1);
    }
    assert!(entries.iter().all(|(_, consumer)| consumer.id == tx.id()));
}
