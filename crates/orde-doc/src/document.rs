//! The materialized document.
//!
//! A [`Document`] holds the container states (LWW map slots and RGA
//! sequences) derived from applied operations, plus a cached materialized
//! value. Containers are stored in arenas keyed by [`Path`], so the same
//! path can hold both map state and sequence state after a kind conflict;
//! the last-writer-wins winner's payload kind decides which one is visible.
//!
//! Mutation happens exclusively through [`Document::apply`]. The cache is
//! recomputed incrementally: callers invalidate the container paths touched
//! by appended operations (the operation log tracks them) and [`refresh`]
//! rebuilds only those subtrees.
//!
//! [`refresh`]: Document::refresh

use crate::error::{DocError, Result};
use crate::sequence::SeqState;
use crate::slot::LwwSlot;
use orde_core::{OpAction, OpId, Operation, Path, PathSegment, Payload, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// The kind of container visible at a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Map,
    Seq,
}

fn payload_kind(payload: &Payload) -> Option<Kind> {
    match payload {
        Payload::Map => Some(Kind::Map),
        Payload::Seq => Some(Kind::Seq),
        Payload::Scalar(_) => None,
    }
}

/// LWW slots for one map container.
type MapState = BTreeMap<String, LwwSlot>;

/// A document: container states plus a cached materialized value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    /// Map containers by path.
    maps: HashMap<Path, MapState>,
    /// Sequence containers by path.
    seqs: HashMap<Path, SeqState>,
    /// Cached materialized root value.
    cache: Value,
    /// Paths whose cached subtree is stale.
    dirty: BTreeSet<Path>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document (an empty root map).
    pub fn new() -> Self {
        Document {
            maps: HashMap::new(),
            seqs: HashMap::new(),
            cache: Value::empty_map(),
            dirty: BTreeSet::new(),
        }
    }

    /// Apply one operation, stamped with its change's timestamp.
    ///
    /// Idempotent and commutative under the conflict rules: replaying the
    /// same operation or reordering concurrent ones cannot change the
    /// resulting state. The caller is responsible for causal gating and for
    /// invalidating the touched path afterwards (see [`Document::invalidate`]).
    pub fn apply(&mut self, op: &Operation, timestamp: i64) -> Result<()> {
        match &op.action {
            OpAction::Set { key, payload } => {
                self.maps
                    .entry(op.path.clone())
                    .or_default()
                    .entry(key.clone())
                    .or_default()
                    .write(op.id, timestamp, Some(payload.clone()));
            }
            OpAction::Delete { key } => {
                self.maps
                    .entry(op.path.clone())
                    .or_default()
                    .entry(key.clone())
                    .or_default()
                    .write(op.id, timestamp, None);
            }
            OpAction::Insert { after, payload } => {
                let seq = self.seqs.entry(op.path.clone()).or_default();
                if let Some(anchor) = *after {
                    if !seq.contains(anchor) {
                        return Err(DocError::UnknownAnchor {
                            path: op.path.clone(),
                            id: anchor,
                        });
                    }
                }
                seq.insert(op.id, *after, payload.clone());
            }
            OpAction::Remove { target } => {
                let known = self
                    .seqs
                    .get_mut(&op.path)
                    .map(|seq| seq.remove(*target))
                    .unwrap_or(false);
                if !known {
                    return Err(DocError::UnknownElement {
                        path: op.path.clone(),
                        id: *target,
                    });
                }
            }
        }
        Ok(())
    }

    /// Mark container paths whose cached subtree must be recomputed.
    pub fn invalidate(&mut self, paths: impl IntoIterator<Item = Path>) {
        self.dirty.extend(paths);
    }

    /// Recompute stale cache subtrees. Cheap when nothing is dirty.
    pub fn refresh(&mut self) {
        if self.dirty.is_empty() {
            return;
        }
        let dirty = std::mem::take(&mut self.dirty);

        if dirty.contains(&Path::root()) {
            self.cache = self.build_container(Kind::Map, &Path::root());
            return;
        }

        // Keep only the shallowest dirty paths; rebuilding a subtree covers
        // everything underneath it. BTreeSet order puts prefixes first.
        let mut kept: Vec<Path> = Vec::new();
        for path in dirty {
            if !kept.iter().any(|k| path.starts_with(k)) {
                kept.push(path);
            }
        }

        let mut cache = std::mem::take(&mut self.cache);
        for path in kept {
            let Some(kind) = self.visible_kind(&path) else {
                // Not visible from the root right now; when a winning write
                // exposes it, the parent container will be invalidated.
                continue;
            };
            let rebuilt = self.build_container(kind, &path);
            if let Some(slot) = locate_mut(&self.seqs, &mut cache, &path) {
                *slot = rebuilt;
            }
        }
        self.cache = cache;
    }

    /// The materialized document value. Refreshes stale subtrees first.
    pub fn value(&mut self) -> &Value {
        self.refresh();
        &self.cache
    }

    /// A snapshot of the materialized document value.
    pub fn materialize(&mut self) -> Value {
        self.value().clone()
    }

    /// The cached materialized value as of the last [`refresh`], without
    /// touching dirty state. Stale while invalidated paths are pending.
    ///
    /// [`refresh`]: Document::refresh
    pub fn snapshot(&self) -> &Value {
        &self.cache
    }

    /// Read the value at a path straight from container state, bypassing
    /// the cache. The empty path yields the whole document.
    pub fn get(&self, path: &Path) -> Option<Value> {
        if path.is_root() {
            return Some(self.build_container(Kind::Map, path));
        }
        let parent = path.parent().expect("non-root path has a parent");
        let parent_kind = self.visible_kind(&parent)?;
        let payload = self.resolve_segment(parent_kind, &parent, path.last()?)?;
        Some(match payload_kind(payload) {
            None => match payload {
                Payload::Scalar(s) => Value::Scalar(s.clone()),
                _ => unreachable!(),
            },
            Some(kind) => self.build_container(kind, path),
        })
    }

    /// Read a map key at a path (`get` on the child path, as a convenience).
    pub fn get_key(&self, path: &Path, key: &str) -> Option<Value> {
        self.get(&path.child_key(key))
    }

    /// The id of the winning write for a map key, if any write happened.
    /// Used by the session layer to record causal predecessors.
    pub fn winner(&self, path: &Path, key: &str) -> Option<OpId> {
        self.maps.get(path)?.get(key)?.writer()
    }

    /// The sequence state at a path, if any sequence operation touched it.
    /// Used by the session layer for index/anchor resolution.
    pub fn sequence(&self, path: &Path) -> Option<&SeqState> {
        self.seqs.get(path)
    }

    /// Fully recompute the materialized value from container state,
    /// ignoring the cache. Reference implementation for the incremental
    /// path; used by tests and by callers that clone state wholesale.
    pub fn rebuild(&self) -> Value {
        self.build_container(Kind::Map, &Path::root())
    }

    /// Walk winners from the root to decide what kind of container, if any,
    /// is visible at `path`.
    fn visible_kind(&self, path: &Path) -> Option<Kind> {
        let mut kind = Kind::Map;
        let mut prefix = Path::root();
        for segment in path.segments() {
            let payload = self.resolve_segment(kind, &prefix, segment)?;
            kind = payload_kind(payload)?;
            prefix = match segment {
                PathSegment::Key(k) => prefix.child_key(k.clone()),
                PathSegment::Elem(id) => prefix.child_elem(*id),
            };
        }
        Some(kind)
    }

    /// The winning payload one segment below a container, if visible.
    fn resolve_segment(
        &self,
        kind: Kind,
        container: &Path,
        segment: &PathSegment,
    ) -> Option<&Payload> {
        match (kind, segment) {
            (Kind::Map, PathSegment::Key(key)) => {
                self.maps.get(container)?.get(key)?.payload()
            }
            (Kind::Seq, PathSegment::Elem(id)) => {
                let elem = self.seqs.get(container)?.get(*id)?;
                if elem.tombstoned {
                    None
                } else {
                    Some(&elem.payload)
                }
            }
            _ => None,
        }
    }

    /// Materialize the container at `path` as a value tree.
    fn build_container(&self, kind: Kind, path: &Path) -> Value {
        match kind {
            Kind::Map => {
                let mut out = BTreeMap::new();
                if let Some(map) = self.maps.get(path) {
                    for (key, slot) in map {
                        if let Some(payload) = slot.payload() {
                            out.insert(
                                key.clone(),
                                self.build_payload(payload, &path.child_key(key.clone())),
                            );
                        }
                    }
                }
                Value::Map(out)
            }
            Kind::Seq => {
                let mut out = Vec::new();
                if let Some(seq) = self.seqs.get(path) {
                    for elem in seq.iter_visible() {
                        out.push(self.build_payload(&elem.payload, &path.child_elem(elem.id)));
                    }
                }
                Value::Sequence(out)
            }
        }
    }

    fn build_payload(&self, payload: &Payload, child: &Path) -> Value {
        match payload {
            Payload::Scalar(s) => Value::Scalar(s.clone()),
            Payload::Map => self.build_container(Kind::Map, child),
            Payload::Seq => self.build_container(Kind::Seq, child),
        }
    }
}

/// Walk the cached value tree to the slot holding the container at `path`.
/// Element segments resolve to indices through the sequence states.
fn locate_mut<'a>(
    seqs: &HashMap<Path, SeqState>,
    root: &'a mut Value,
    path: &Path,
) -> Option<&'a mut Value> {
    let mut current = root;
    let mut prefix = Path::root();
    for segment in path.segments() {
        current = match segment {
            PathSegment::Key(key) => match current {
                Value::Map(map) => map.get_mut(key)?,
                _ => return None,
            },
            PathSegment::Elem(id) => {
                let index = seqs.get(&prefix)?.index_of(*id)?;
                match current {
                    Value::Sequence(items) => items.get_mut(index)?,
                    _ => return None,
                }
            }
        };
        prefix = match segment {
            PathSegment::Key(k) => prefix.child_key(k.clone()),
            PathSegment::Elem(id) => prefix.child_elem(*id),
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use orde_core::{ActorClock, ActorId, Scalar};

    fn set(
        clock: &mut ActorClock,
        path: &Path,
        key: &str,
        payload: Payload,
        preds: Vec<OpId>,
    ) -> Operation {
        Operation::new(
            clock.next_op_id(),
            path.clone(),
            OpAction::Set {
                key: key.to_string(),
                payload,
            },
            preds,
        )
    }

    fn str_payload(s: &str) -> Payload {
        Payload::Scalar(Scalar::Str(s.to_string()))
    }

    fn apply_all(doc: &mut Document, ops: &[(Operation, i64)]) {
        for (op, ts) in ops {
            doc.apply(op, *ts).unwrap();
            doc.invalidate([op.path.clone()]);
        }
    }

    #[test]
    fn test_root_map_set_and_delete() {
        let mut clock = ActorClock::new(ActorId::generate());
        let mut doc = Document::new();
        let root = Path::root();

        let name = set(&mut clock, &root, "name", str_payload("Foo"), vec![]);
        let url = set(&mut clock, &root, "url", str_payload("https://example.com"), vec![]);
        apply_all(&mut doc, &[(name, 100), (url.clone(), 100)]);

        let del = Operation::new(
            clock.next_op_id(),
            root.clone(),
            OpAction::Delete {
                key: "url".to_string(),
            },
            vec![url.id],
        );
        apply_all(&mut doc, &[(del, 200)]);

        let value = doc.materialize();
        assert_eq!(value.get("name").and_then(Value::as_str), Some("Foo"));
        assert_eq!(value.get("url"), None);
    }

    #[test]
    fn test_concurrent_writes_pick_one_winner() {
        let mut actors = [ActorId::generate(), ActorId::generate()];
        actors.sort();
        let mut low = ActorClock::new(actors[0]);
        let mut high = ActorClock::new(actors[1]);
        let root = Path::root();

        let from_low = set(&mut low, &root, "name", str_payload("low"), vec![]);
        let from_high = set(&mut high, &root, "name", str_payload("high"), vec![]);

        // Same timestamp, delivered in opposite orders.
        let mut doc_a = Document::new();
        apply_all(&mut doc_a, &[(from_low.clone(), 100), (from_high.clone(), 100)]);
        let mut doc_b = Document::new();
        apply_all(&mut doc_b, &[(from_high, 100), (from_low, 100)]);

        assert_eq!(doc_a.materialize(), doc_b.materialize());
        assert_eq!(
            doc_a.materialize().get("name").and_then(Value::as_str),
            Some("high")
        );
    }

    #[test]
    fn test_nested_map() {
        let mut clock = ActorClock::new(ActorId::generate());
        let mut doc = Document::new();
        let root = Path::root();

        let user = set(&mut clock, &root, "user", Payload::Map, vec![]);
        let user_path = root.child_key("user");
        let name = set(&mut clock, &user_path, "name", str_payload("Alice"), vec![user.id]);
        apply_all(&mut doc, &[(user, 100), (name, 100)]);

        let value = doc.materialize();
        assert_eq!(
            value.get("user").and_then(|u| u.get("name")).and_then(Value::as_str),
            Some("Alice")
        );
        assert_eq!(
            doc.get(&user_path.child_key("name")),
            Some(Value::Scalar(Scalar::Str("Alice".to_string())))
        );
    }

    #[test]
    fn test_sequence_materialization() {
        let mut clock = ActorClock::new(ActorId::generate());
        let mut doc = Document::new();
        let root = Path::root();

        let items = set(&mut clock, &root, "items", Payload::Seq, vec![]);
        let items_path = root.child_key("items");

        let first = Operation::new(
            clock.next_op_id(),
            items_path.clone(),
            OpAction::Insert {
                after: None,
                payload: str_payload("a"),
            },
            vec![items.id],
        );
        let second = Operation::new(
            clock.next_op_id(),
            items_path.clone(),
            OpAction::Insert {
                after: Some(first.id),
                payload: str_payload("b"),
            },
            vec![first.id],
        );
        let remove_first = Operation::new(
            clock.next_op_id(),
            items_path.clone(),
            OpAction::Remove { target: first.id },
            vec![first.id],
        );
        apply_all(
            &mut doc,
            &[(items, 1), (first, 2), (second, 3), (remove_first, 4)],
        );

        assert_eq!(
            doc.materialize().get("items"),
            Some(&Value::Sequence(vec![Value::Scalar(Scalar::Str(
                "b".to_string()
            ))]))
        );
    }

    #[test]
    fn test_kind_conflict_resolved_by_winner() {
        let mut actors = [ActorId::generate(), ActorId::generate()];
        actors.sort();
        let mut low = ActorClock::new(actors[0]);
        let mut high = ActorClock::new(actors[1]);
        let root = Path::root();
        let data_path = root.child_key("data");

        // One actor makes "data" a map, the other a sequence, concurrently.
        let as_map = set(&mut low, &root, "data", Payload::Map, vec![]);
        let map_entry = set(&mut low, &data_path, "k", str_payload("v"), vec![as_map.id]);

        let as_seq = set(&mut high, &root, "data", Payload::Seq, vec![]);
        let seq_entry = Operation::new(
            high.next_op_id(),
            data_path.clone(),
            OpAction::Insert {
                after: None,
                payload: str_payload("e"),
            },
            vec![as_seq.id],
        );

        let mut doc = Document::new();
        apply_all(
            &mut doc,
            &[(as_map, 100), (map_entry, 100), (as_seq, 100), (seq_entry, 100)],
        );

        // The higher actor's write wins, so "data" materializes as the
        // sequence; the map state stays dormant.
        assert_eq!(
            doc.materialize().get("data"),
            Some(&Value::Sequence(vec![Value::Scalar(Scalar::Str(
                "e".to_string()
            ))]))
        );
    }

    #[test]
    fn test_incremental_refresh_matches_rebuild() {
        let mut clock = ActorClock::new(ActorId::generate());
        let mut doc = Document::new();
        let root = Path::root();

        let user = set(&mut clock, &root, "user", Payload::Map, vec![]);
        let user_path = root.child_key("user");
        let name = set(&mut clock, &user_path, "name", str_payload("Alice"), vec![user.id]);
        apply_all(&mut doc, &[(user, 1), (name, 2)]);
        assert_eq!(doc.materialize(), doc.rebuild());

        // A later edit deep in the tree only dirties the nested path.
        let rename = set(&mut clock, &user_path, "name", str_payload("Bob"), vec![]);
        apply_all(&mut doc, &[(rename, 3)]);
        assert_eq!(doc.materialize(), doc.rebuild());
        assert_eq!(
            doc.materialize()
                .get("user")
                .and_then(|u| u.get("name"))
                .and_then(Value::as_str),
            Some("Bob")
        );
    }

    #[test]
    fn test_apply_is_pure_on_error() {
        let mut clock = ActorClock::new(ActorId::generate());
        let mut doc = Document::new();

        let ghost = OpId::new(99, ActorId::generate());
        let bad = Operation::new(
            clock.next_op_id(),
            Path::keys("items"),
            OpAction::Remove { target: ghost },
            vec![],
        );
        let err = doc.apply(&bad, 1).unwrap_err();
        assert_eq!(
            err,
            DocError::UnknownElement {
                path: Path::keys("items"),
                id: ghost
            }
        );
        assert_eq!(doc.rebuild(), Value::empty_map());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        const KEYS: [&str; 4] = ["a", "b", "c", "d"];

        /// Root-map writes with preassigned ids: key index, timestamp,
        /// delete flag.
        type Script = Vec<(usize, i64, bool)>;

        fn script_and_permutation() -> impl Strategy<Value = (Script, Vec<usize>)> {
            proptest::collection::vec((0usize..KEYS.len(), 0i64..50, any::<bool>()), 1..16)
                .prop_flat_map(|script| {
                    let indices: Vec<usize> = (0..script.len()).collect();
                    (Just(script), Just(indices).prop_shuffle())
                })
        }

        fn build_ops(script: &Script) -> Vec<(Operation, i64)> {
            let mut actors = [ActorId::from_bytes([1; 16]), ActorId::from_bytes([2; 16])];
            actors.sort();
            script
                .iter()
                .enumerate()
                .map(|(i, &(key, ts, deleted))| {
                    let id = OpId::new(i as u64 + 1, actors[i % 2]);
                    let action = if deleted {
                        OpAction::Delete {
                            key: KEYS[key].to_string(),
                        }
                    } else {
                        OpAction::Set {
                            key: KEYS[key].to_string(),
                            payload: Payload::Scalar(Scalar::Int(i as i64)),
                        }
                    };
                    (Operation::new(id, Path::root(), action, vec![]), ts)
                })
                .collect()
        }

        proptest! {
            #[test]
            fn prop_order_independent((script, perm) in script_and_permutation()) {
                let ops = build_ops(&script);

                let mut forward = Document::new();
                apply_all(&mut forward, &ops);

                let mut permuted = Document::new();
                for &i in &perm {
                    let (op, ts) = &ops[i];
                    permuted.apply(op, *ts).unwrap();
                    permuted.invalidate([op.path.clone()]);
                }

                prop_assert_eq!(forward.materialize(), permuted.materialize());
            }

            #[test]
            fn prop_incremental_matches_rebuild((script, _) in script_and_permutation()) {
                let ops = build_ops(&script);
                let mut doc = Document::new();
                for window in ops.chunks(3) {
                    apply_all(&mut doc, window);
                    // Refresh between batches so later batches hit the
                    // incremental path with a warm cache.
                    prop_assert_eq!(doc.materialize(), doc.rebuild());
                }
            }
        }
    }
}
