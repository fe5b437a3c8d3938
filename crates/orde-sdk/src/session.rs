//! Document sessions and drafts.
//!
//! A [`DocSession`] wraps a merge engine behind a lock so application code
//! can hold cheap clones of the handle. Local edits go through a [`Draft`]:
//! a scratch view of the document that stages operations, resolves sequence
//! indexes against already-staged edits, and records the causal
//! predecessors each operation overwrites. Committing a draft produces one
//! [`Change`] ready for the network; dropping it discards everything.

use crate::error::{Result, SdkError};
use chrono::Utc;
use orde_change::{Change, ChangeHash};
use orde_core::{ActorClock, ActorId, OpAction, OpId, Operation, Path, PathSegment, Payload, Value};
use orde_doc::Document;
use orde_merge::{ApplyStatus, MergeEngine, Replica};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// A handle to one replica of a document.
///
/// Clones share the underlying replica.
#[derive(Clone, Debug)]
pub struct DocSession {
    engine: Arc<RwLock<MergeEngine>>,
}

impl DocSession {
    /// Create a session over an empty document with a fresh actor.
    pub fn new() -> Self {
        DocSession {
            engine: Arc::new(RwLock::new(MergeEngine::new(Replica::new()))),
        }
    }

    /// Create a session seeded from a JSON object.
    ///
    /// The seed is committed as the session's first change.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let session = Self::new();
        let seed = Value::from_json(json);
        let Value::Map(entries) = seed else {
            return Err(SdkError::RootNotAnObject);
        };
        session.change("initialize document", |draft| {
            for (key, value) in entries {
                draft.put_value(&Path::root(), &key, value)?;
            }
            Ok(())
        })?;
        Ok(session)
    }

    /// This session's actor identity.
    pub fn actor(&self) -> ActorId {
        self.engine.read().replica().actor()
    }

    /// The current document value.
    ///
    /// Reads take the shared lock: any number of clones can read at once
    /// without blocking a writer. The snapshot is refreshed whenever a
    /// change is committed or integrated.
    pub fn value(&self) -> Value {
        self.engine.read().replica().snapshot()
    }

    /// The current document as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        self.value().to_json()
    }

    /// Current heads of the change DAG.
    pub fn heads(&self) -> Vec<ChangeHash> {
        self.engine.read().replica().heads().to_vec()
    }

    /// Hashes of every integrated change.
    pub fn known(&self) -> HashSet<ChangeHash> {
        self.engine.read().replica().known().clone()
    }

    /// Number of remote changes parked awaiting dependencies.
    pub fn pending_len(&self) -> usize {
        self.engine.read().pending_len()
    }

    /// Make a local edit: stage operations on a draft, then commit them as
    /// one change. The change is applied locally and returned for the
    /// network; if the closure fails nothing is committed.
    pub fn change<F>(&self, message: impl Into<String>, edit: F) -> Result<Change>
    where
        F: FnOnce(&mut Draft) -> Result<()>,
    {
        let timestamp = Utc::now().timestamp_millis();
        let mut engine = self.engine.write();
        let replica = engine.replica_mut();

        let mut draft = Draft::new(replica, timestamp);
        edit(&mut draft)?;
        let ops = draft.finish();

        let change = replica.commit(message, timestamp, ops)?;
        debug!(
            hash = %change.hash.short(),
            ops = change.len(),
            "committed draft"
        );
        Ok(change)
    }

    /// The integrated changes a peer is missing, in a dependency-respecting
    /// order. Pass an empty set for the full history.
    pub fn changes_since(&self, peer_known: &HashSet<ChangeHash>) -> Vec<Change> {
        self.engine.read().replica().changes_since(peer_known)
    }

    /// Every integrated change, in a dependency-respecting order.
    pub fn all_changes(&self) -> Vec<Change> {
        self.changes_since(&HashSet::new())
    }

    /// Integrate changes from a peer, in any order. Returns the number
    /// applied.
    pub fn apply_changes(&self, changes: impl IntoIterator<Item = Change>) -> Result<usize> {
        Ok(self.engine.write().ingest_all(changes)?)
    }

    /// Integrate one change from a peer.
    pub fn apply_change(&self, change: Change) -> Result<ApplyStatus> {
        Ok(self.engine.write().ingest(change)?)
    }

    /// Decode and integrate binary changes from the network.
    pub fn apply_encoded_changes<'a>(
        &self,
        payloads: impl IntoIterator<Item = &'a [u8]>,
    ) -> Result<usize> {
        let mut changes = Vec::new();
        for bytes in payloads {
            changes.push(Change::decode(bytes)?);
        }
        self.apply_changes(changes)
    }

    /// Create an independent session with its own actor that has integrated
    /// this session's full history. The two sessions can then edit offline
    /// and merge later.
    pub fn fork(&self) -> Result<DocSession> {
        let forked = DocSession::new();
        forked.apply_changes(self.all_changes())?;
        Ok(forked)
    }

    /// Exchange changes both ways until the two sessions agree.
    pub fn sync_with(&self, peer: &DocSession) -> Result<()> {
        peer.apply_changes(self.changes_since(&peer.known()))?;
        self.apply_changes(peer.changes_since(&self.known()))?;
        Ok(())
    }
}

impl Default for DocSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Staged local edits against a scratch copy of the document.
///
/// Edits are validated and applied to the scratch state as they are staged,
/// so later edits in the same draft see earlier ones (a pushed element can
/// be removed by index within one draft). The real replica is untouched
/// until the draft commits.
pub struct Draft {
    scratch: Document,
    clock: ActorClock,
    timestamp: i64,
    ops: Vec<Operation>,
}

impl Draft {
    fn new(replica: &Replica, timestamp: i64) -> Self {
        Draft {
            scratch: replica.doc().clone(),
            clock: replica.clock().clone(),
            timestamp,
            ops: Vec::new(),
        }
    }

    fn finish(self) -> Vec<Operation> {
        self.ops
    }

    /// Read a value from the draft state (staged edits included).
    pub fn get(&self, path: &Path) -> Option<Value> {
        self.scratch.get(path)
    }

    /// Set a map key to a JSON value. Nested objects and arrays become
    /// nested containers.
    pub fn put(&mut self, path: &Path, key: &str, json: &serde_json::Value) -> Result<()> {
        self.put_value(path, key, Value::from_json(json))
    }

    /// Set a map key to a document value.
    pub fn put_value(&mut self, path: &Path, key: &str, value: Value) -> Result<()> {
        match value {
            Value::Scalar(scalar) => {
                self.stage_set(path, key, Payload::Scalar(scalar))?;
            }
            Value::Map(entries) => {
                self.stage_set(path, key, Payload::Map)?;
                let child = path.child_key(key);
                for (k, v) in entries {
                    self.put_value(&child, &k, v)?;
                }
            }
            Value::Sequence(items) => {
                self.stage_set(path, key, Payload::Seq)?;
                let child = path.child_key(key);
                for item in items {
                    self.push_value(&child, item)?;
                }
            }
        }
        Ok(())
    }

    /// Delete a map key. Competes with concurrent writes under the
    /// last-writer-wins rule.
    pub fn delete(&mut self, path: &Path, key: &str) -> Result<()> {
        self.ensure_map(path)?;
        let preds = self.write_preds(path, key);
        self.stage(
            path.clone(),
            OpAction::Delete {
                key: key.to_string(),
            },
            preds,
        )?;
        Ok(())
    }

    /// Insert a JSON value into a sequence at a visible index.
    pub fn insert(&mut self, path: &Path, index: usize, json: &serde_json::Value) -> Result<()> {
        self.insert_value(path, index, Value::from_json(json))
    }

    /// Insert a document value into a sequence at a visible index.
    ///
    /// The operation records the element currently before the index as its
    /// anchor, so the position stays meaningful under concurrent edits.
    pub fn insert_value(&mut self, path: &Path, index: usize, value: Value) -> Result<()> {
        self.ensure_sequence(path)?;
        let (len, anchor) = {
            let seq = self.scratch.sequence(path);
            let len = seq.map(|s| s.visible_len()).unwrap_or(0);
            let anchor = if index == 0 {
                None
            } else {
                seq.and_then(|s| s.id_at(index - 1))
            };
            (len, anchor)
        };
        if index > len {
            return Err(SdkError::IndexOutOfBounds {
                path: path.clone(),
                index,
                len,
            });
        }

        let mut preds: Vec<OpId> = anchor.into_iter().collect();
        preds.extend(self.container_pred(path));

        match value {
            Value::Scalar(scalar) => {
                self.stage(
                    path.clone(),
                    OpAction::Insert {
                        after: anchor,
                        payload: Payload::Scalar(scalar),
                    },
                    preds,
                )?;
            }
            Value::Map(entries) => {
                let id = self.stage(
                    path.clone(),
                    OpAction::Insert {
                        after: anchor,
                        payload: Payload::Map,
                    },
                    preds,
                )?;
                let child = path.child_elem(id);
                for (k, v) in entries {
                    self.put_value(&child, &k, v)?;
                }
            }
            Value::Sequence(items) => {
                let id = self.stage(
                    path.clone(),
                    OpAction::Insert {
                        after: anchor,
                        payload: Payload::Seq,
                    },
                    preds,
                )?;
                let child = path.child_elem(id);
                for item in items {
                    self.push_value(&child, item)?;
                }
            }
        }
        Ok(())
    }

    /// Append a JSON value to the end of a sequence.
    pub fn push(&mut self, path: &Path, json: &serde_json::Value) -> Result<()> {
        self.push_value(path, Value::from_json(json))
    }

    /// Append a document value to the end of a sequence.
    pub fn push_value(&mut self, path: &Path, value: Value) -> Result<()> {
        self.ensure_sequence(path)?;
        let len = self
            .scratch
            .sequence(path)
            .map(|s| s.visible_len())
            .unwrap_or(0);
        self.insert_value(path, len, value)
    }

    /// Tombstone the sequence element at a visible index.
    pub fn remove(&mut self, path: &Path, index: usize) -> Result<()> {
        self.ensure_sequence(path)?;
        let (len, target) = {
            let seq = self.scratch.sequence(path);
            let len = seq.map(|s| s.visible_len()).unwrap_or(0);
            (len, seq.and_then(|s| s.id_at(index)))
        };
        let Some(target) = target else {
            return Err(SdkError::IndexOutOfBounds {
                path: path.clone(),
                index,
                len,
            });
        };

        let mut preds = vec![target];
        preds.extend(self.container_pred(path));
        self.stage(path.clone(), OpAction::Remove { target }, preds)?;
        Ok(())
    }

    fn stage_set(&mut self, path: &Path, key: &str, payload: Payload) -> Result<()> {
        self.ensure_map(path)?;
        let preds = self.write_preds(path, key);
        self.stage(
            path.clone(),
            OpAction::Set {
                key: key.to_string(),
                payload,
            },
            preds,
        )?;
        Ok(())
    }

    /// Mint an id, apply the operation to the scratch state and record it.
    fn stage(&mut self, path: Path, action: OpAction, preds: Vec<OpId>) -> Result<OpId> {
        let op = Operation::new(self.clock.next_op_id(), path, action, preds);
        self.scratch.apply(&op, self.timestamp)?;
        self.scratch.invalidate([op.path.clone()]);
        let id = op.id;
        self.ops.push(op);
        Ok(id)
    }

    /// Predecessors for a map write: the winner being overwritten plus the
    /// operation that created the container.
    fn write_preds(&self, path: &Path, key: &str) -> Vec<OpId> {
        let mut preds: Vec<OpId> = self.scratch.winner(path, key).into_iter().collect();
        preds.extend(self.container_pred(path));
        preds
    }

    /// The operation that created the container at `path`, if addressable.
    fn container_pred(&self, path: &Path) -> Option<OpId> {
        match path.last()? {
            PathSegment::Key(key) => {
                let parent = path.parent()?;
                self.scratch.winner(&parent, key)
            }
            PathSegment::Elem(id) => Some(*id),
        }
    }

    fn ensure_map(&self, path: &Path) -> Result<()> {
        if path.is_root() || matches!(self.scratch.get(path), Some(Value::Map(_))) {
            Ok(())
        } else {
            Err(SdkError::NotAMap(path.clone()))
        }
    }

    fn ensure_sequence(&self, path: &Path) -> Result<()> {
        if matches!(self.scratch.get(path), Some(Value::Sequence(_))) {
            Ok(())
        } else {
            Err(SdkError::NotASequence(path.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_seed_and_read() {
        let session = DocSession::from_json(&json!({
            "name": "Foo",
            "tags": ["a", "b"],
            "meta": { "stars": 3 }
        }))
        .unwrap();

        assert_eq!(
            session.to_json(),
            json!({
                "name": "Foo",
                "tags": ["a", "b"],
                "meta": { "stars": 3 }
            })
        );
        assert_eq!(session.heads().len(), 1);
    }

    #[test]
    fn test_seed_rejects_non_object() {
        assert_eq!(
            DocSession::from_json(&json!([1, 2])).unwrap_err(),
            SdkError::RootNotAnObject
        );
    }

    #[test]
    fn test_draft_sees_its_own_edits() {
        let session = DocSession::from_json(&json!({ "items": ["keep"] })).unwrap();
        let items = Path::keys("items");

        session
            .change("push then remove", |draft| {
                draft.push(&items, &json!("transient"))?;
                // The staged element is visible at index 1 inside the draft.
                draft.remove(&items, 1)?;
                Ok(())
            })
            .unwrap();

        assert_eq!(session.to_json(), json!({ "items": ["keep"] }));
    }

    #[test]
    fn test_failed_draft_commits_nothing() {
        let session = DocSession::from_json(&json!({ "name": "Foo" })).unwrap();
        let before = session.heads();

        let err = session
            .change("bad edit", |draft| {
                draft.put(&Path::root(), "ok", &json!(1))?;
                draft.remove(&Path::keys("name"), 0)
            })
            .unwrap_err();

        assert_eq!(err, SdkError::NotASequence(Path::keys("name")));
        assert_eq!(session.heads(), before);
        assert_eq!(session.to_json(), json!({ "name": "Foo" }));
    }

    #[test]
    fn test_index_bounds_checked() {
        let session = DocSession::from_json(&json!({ "items": ["a"] })).unwrap();
        let err = session
            .change("too far", |draft| {
                draft.insert(&Path::keys("items"), 5, &json!("x"))
            })
            .unwrap_err();
        assert_eq!(
            err,
            SdkError::IndexOutOfBounds {
                path: Path::keys("items"),
                index: 5,
                len: 1
            }
        );
    }

    #[test]
    fn test_reads_fresh_after_remote_ingest() {
        let local = DocSession::from_json(&json!({ "n": 1 })).unwrap();
        let remote = local.fork().unwrap();

        local
            .change("bump", |draft| draft.put(&Path::root(), "n", &json!(2)))
            .unwrap();
        remote.apply_changes(local.all_changes()).unwrap();

        assert_eq!(remote.to_json(), json!({ "n": 2 }));
    }

    #[test]
    fn test_clones_read_while_another_commits() {
        let session = DocSession::from_json(&json!({ "n": 0 })).unwrap();

        let reader = session.clone();
        let handle = std::thread::spawn(move || {
            for _ in 0..50 {
                let value = reader.to_json();
                assert!(value.get("n").is_some());
            }
        });

        for i in 1..10 {
            session
                .change("bump", |draft| draft.put(&Path::root(), "n", &json!(i)))
                .unwrap();
        }
        handle.join().unwrap();

        assert_eq!(session.to_json(), json!({ "n": 9 }));
    }

    #[test]
    fn test_fork_and_merge() {
        let session = DocSession::from_json(&json!({ "name": "Foo" })).unwrap();
        let remote = session.fork().unwrap();
        assert_ne!(session.actor(), remote.actor());
        assert_eq!(session.to_json(), remote.to_json());

        session
            .change("rename", |draft| {
                draft.put(&Path::root(), "name", &json!("Bar"))
            })
            .unwrap();
        remote
            .change("describe", |draft| {
                draft.put(&Path::root(), "description", &json!("a thing"))
            })
            .unwrap();

        session.sync_with(&remote).unwrap();
        assert_eq!(
            session.to_json(),
            json!({ "name": "Bar", "description": "a thing" })
        );
        assert_eq!(session.to_json(), remote.to_json());
    }

    #[test]
    fn test_encoded_round_trip_between_sessions() {
        let session = DocSession::from_json(&json!({ "n": 1 })).unwrap();
        session
            .change("bump", |draft| draft.put(&Path::root(), "n", &json!(2)))
            .unwrap();

        let remote = DocSession::new();
        let payloads: Vec<Vec<u8>> = session
            .all_changes()
            .iter()
            .map(Change::encode)
            .collect();
        remote
            .apply_encoded_changes(payloads.iter().map(Vec::as_slice))
            .unwrap();

        assert_eq!(remote.to_json(), json!({ "n": 2 }));
    }

    #[test]
    fn test_nested_container_edit() {
        let session = DocSession::from_json(&json!({
            "meta": { "links": [] }
        }))
        .unwrap();

        session
            .change("add link", |draft| {
                draft.push(&Path::keys("meta.links"), &json!({ "href": "/a" }))
            })
            .unwrap();

        assert_eq!(
            session.to_json(),
            json!({ "meta": { "links": [{ "href": "/a" }] } })
        );
    }
}
