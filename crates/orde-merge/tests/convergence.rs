//! Convergence tests: replicas that see the same changes end up with the
//! same document value, whatever the delivery order, duplication or
//! interleaving looks like.

use orde_core::{OpAction, Operation, Path, Payload, Scalar, Value};
use orde_merge::{MergeEngine, Replica};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

fn str_payload(s: &str) -> Payload {
    Payload::Scalar(Scalar::Str(s.to_string()))
}

fn commit_set(engine: &mut MergeEngine, key: &str, value: &str, ts: i64) -> orde_change::Change {
    let replica = engine.replica_mut();
    let preds = replica
        .doc()
        .winner(&Path::root(), key)
        .into_iter()
        .collect();
    let op = Operation::new(
        replica.next_op_id(),
        Path::root(),
        OpAction::Set {
            key: key.to_string(),
            payload: str_payload(value),
        },
        preds,
    );
    replica.commit(format!("set {key}"), ts, vec![op]).unwrap()
}

fn commit_push(engine: &mut MergeEngine, list: &str, value: &str, ts: i64) -> orde_change::Change {
    let replica = engine.replica_mut();
    let list_path = Path::keys(list);
    let mut ops = Vec::new();

    // Create the list on first use.
    let list_pred = match replica.doc().winner(&Path::root(), list) {
        Some(id) => id,
        None => {
            let op = Operation::new(
                replica.next_op_id(),
                Path::root(),
                OpAction::Set {
                    key: list.to_string(),
                    payload: Payload::Seq,
                },
                vec![],
            );
            let id = op.id;
            ops.push(op);
            id
        }
    };

    let anchor = replica.doc().sequence(&list_path).and_then(|s| s.last_visible());
    let mut preds = vec![list_pred];
    preds.extend(anchor);
    ops.push(Operation::new(
        replica.next_op_id(),
        list_path,
        OpAction::Insert {
            after: anchor,
            payload: str_payload(value),
        },
        preds,
    ));
    replica.commit(format!("push {value}"), ts, ops).unwrap()
}

fn sync(from: &MergeEngine, to: &mut MergeEngine) {
    let missing = from.replica().changes_since(to.replica().known());
    to.ingest_all(missing).unwrap();
}

#[test]
fn test_shuffled_delivery_converges() {
    let mut source = MergeEngine::new(Replica::new());
    let mut changes = vec![
        commit_set(&mut source, "name", "Foo", 100),
        commit_set(&mut source, "url", "https://example.com", 200),
        commit_set(&mut source, "name", "Bar", 300),
        commit_push(&mut source, "tags", "crdt", 400),
        commit_push(&mut source, "tags", "offline", 500),
    ];
    let expected = source.replica_mut().value();

    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        changes.shuffle(&mut rng);

        let mut sink = MergeEngine::new(Replica::new());
        sink.ingest_all(changes.clone()).unwrap();
        assert!(sink.is_idle(), "seed {seed} left parked changes");
        assert_eq!(sink.replica_mut().value(), expected, "seed {seed} diverged");
    }
}

#[test]
fn test_duplicated_delivery_is_idempotent() {
    let mut source = MergeEngine::new(Replica::new());
    let changes = vec![
        commit_set(&mut source, "a", "1", 100),
        commit_set(&mut source, "b", "2", 200),
    ];

    let mut sink = MergeEngine::new(Replica::new());
    let mut noisy: Vec<_> = changes.iter().cloned().chain(changes.clone()).collect();
    let mut rng = StdRng::seed_from_u64(7);
    noisy.shuffle(&mut rng);

    sink.ingest_all(noisy).unwrap();
    assert_eq!(sink.replica().history().len(), 2);
    assert_eq!(sink.replica_mut().value(), source.replica_mut().value());
}

#[test]
fn test_concurrent_key_writes_pick_same_winner() {
    let mut base = MergeEngine::new(Replica::new());
    let seed = commit_set(&mut base, "name", "Foo", 100);

    let mut left = MergeEngine::new(Replica::new());
    let mut right = MergeEngine::new(Replica::new());
    left.ingest(seed.clone()).unwrap();
    right.ingest(seed).unwrap();

    // Both edit the same key offline, with the same wall clock.
    let from_left = commit_set(&mut left, "name", "from-left", 500);
    let from_right = commit_set(&mut right, "name", "from-right", 500);

    left.ingest(from_right).unwrap();
    right.ingest(from_left).unwrap();

    let left_value = left.replica_mut().value();
    assert_eq!(left_value, right.replica_mut().value());

    // Exactly one of the two writes survives.
    let name = left_value.get("name").and_then(Value::as_str).unwrap();
    assert!(name == "from-left" || name == "from-right");
}

#[test]
fn test_delete_vs_concurrent_update() {
    let mut base = MergeEngine::new(Replica::new());
    let seed = commit_set(&mut base, "url", "https://example.com", 100);

    let mut deleter = MergeEngine::new(Replica::new());
    let mut updater = MergeEngine::new(Replica::new());
    deleter.ingest(seed.clone()).unwrap();
    updater.ingest(seed).unwrap();

    let del = {
        let replica = deleter.replica_mut();
        let preds = replica
            .doc()
            .winner(&Path::root(), "url")
            .into_iter()
            .collect();
        let op = Operation::new(
            replica.next_op_id(),
            Path::root(),
            OpAction::Delete {
                key: "url".to_string(),
            },
            preds,
        );
        replica.commit("drop url", 200, vec![op]).unwrap()
    };
    // The update carries a later wall clock, so it wins and revives the key.
    let upd = commit_set(&mut updater, "url", "https://example.org", 300);

    deleter.ingest(upd).unwrap();
    updater.ingest(del).unwrap();

    let merged = deleter.replica_mut().value();
    assert_eq!(merged, updater.replica_mut().value());
    assert_eq!(
        merged.get("url").and_then(Value::as_str),
        Some("https://example.org")
    );
}

#[test]
fn test_concurrent_sequence_inserts_converge() {
    let mut base = MergeEngine::new(Replica::new());
    let seed = commit_push(&mut base, "items", "shared", 100);

    let mut left = MergeEngine::new(Replica::new());
    let mut right = MergeEngine::new(Replica::new());
    left.ingest(seed.clone()).unwrap();
    right.ingest(seed).unwrap();

    let from_left = commit_push(&mut left, "items", "from-left", 200);
    let from_right = commit_push(&mut right, "items", "from-right", 200);

    left.ingest(from_right).unwrap();
    right.ingest(from_left).unwrap();

    let left_value = left.replica_mut().value();
    assert_eq!(left_value, right.replica_mut().value());
    assert_eq!(left_value.get("items").and_then(Value::as_sequence).map(<[_]>::len), Some(3));
}

#[test]
fn test_random_gossip_converges() {
    let mut rng = StdRng::seed_from_u64(42);

    let mut engines: Vec<MergeEngine> = (0..3).map(|_| MergeEngine::new(Replica::new())).collect();
    let keys = ["alpha", "beta", "gamma"];

    for round in 0..30 {
        // A random replica makes a random edit.
        let editor = rng.gen_range(0..engines.len());
        let ts = 1_000 + round as i64;
        if rng.gen_bool(0.7) {
            let key = keys[rng.gen_range(0..keys.len())];
            let value = format!("r{round}");
            commit_set(&mut engines[editor], key, &value, ts);
        } else {
            let value = format!("item-{round}");
            commit_push(&mut engines[editor], "log", &value, ts);
        }

        // Occasionally gossip between two random replicas.
        if rng.gen_bool(0.5) {
            let a = rng.gen_range(0..engines.len());
            let b = rng.gen_range(0..engines.len());
            if a != b {
                let missing = engines[a].replica().changes_since(engines[b].replica().known());
                engines[b].ingest_all(missing).unwrap();
            }
        }
    }

    // Full mesh exchange, then everyone must agree.
    for a in 0..engines.len() {
        for b in 0..engines.len() {
            if a != b {
                let missing = engines[a].replica().changes_since(engines[b].replica().known());
                engines[b].ingest_all(missing).unwrap();
            }
        }
    }

    let reference = engines[0].replica_mut().value();
    for engine in engines.iter_mut().skip(1) {
        assert!(engine.is_idle());
        assert_eq!(engine.replica_mut().value(), reference);
    }
}

#[test]
fn test_bidirectional_sync_reaches_fixpoint() {
    let mut left = MergeEngine::new(Replica::new());
    let mut right = MergeEngine::new(Replica::new());

    commit_set(&mut left, "a", "1", 100);
    commit_set(&mut right, "b", "2", 100);
    commit_set(&mut left, "a", "3", 200);

    let snapshot = left.clone();
    sync(&snapshot, &mut right);
    let snapshot = right.clone();
    sync(&snapshot, &mut left);

    assert_eq!(left.replica_mut().value(), right.replica_mut().value());
    assert!(left
        .replica()
        .version()
        .dominates(right.replica().version()));
    assert!(right
        .replica()
        .version()
        .dominates(left.replica().version()));
}
