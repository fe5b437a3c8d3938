//! A replica: one actor's complete view of a document.
//!
//! The replica ties the layers together: the operation log, the materialized
//! document, the set of integrated changes and the current DAG heads. Local
//! edits are committed into changes whose dependencies are the replica's
//! heads at commit time; remote changes are integrated atomically, with a
//! full readiness check before any state mutates.

use crate::error::{MergeError, Result};
use orde_change::{Change, ChangeBuilder, ChangeHash};
use orde_core::{ActorClock, ActorId, OpAction, OpId, Operation, Path, Value};
use orde_doc::{DocError, Document};
use orde_oplog::{OpLog, VersionVector};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Outcome of handing a change to a replica or merge engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyStatus {
    /// The change was new and its operations are now in effect.
    Applied,
    /// The change was already integrated (or already parked); nothing
    /// changed.
    Duplicate,
    /// The change is parked until its dependencies arrive. Only the
    /// [`MergeEngine`](crate::MergeEngine) returns this.
    Deferred,
}

/// One actor's replica of a document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Replica {
    clock: ActorClock,
    log: OpLog,
    doc: Document,
    /// Hashes of every integrated change.
    known: HashSet<ChangeHash>,
    /// Integrated changes in application order.
    history: Vec<Change>,
    /// Hashes of the changes nothing integrated so far depends on, sorted.
    heads: Vec<ChangeHash>,
    /// Number of changes this replica has committed itself.
    seq: u64,
}

impl Replica {
    /// Create a replica with a fresh actor identity.
    pub fn new() -> Self {
        Self::with_actor(ActorId::generate())
    }

    /// Create a replica for a known actor identity.
    ///
    /// The actor must not be editing anywhere else; two live replicas
    /// sharing an actor would mint colliding operation ids.
    pub fn with_actor(actor: ActorId) -> Self {
        Replica {
            clock: ActorClock::new(actor),
            log: OpLog::new(),
            doc: Document::new(),
            known: HashSet::new(),
            history: Vec::new(),
            heads: Vec::new(),
            seq: 0,
        }
    }

    /// This replica's actor identity.
    pub fn actor(&self) -> ActorId {
        self.clock.actor()
    }

    /// The replica's operation clock.
    pub fn clock(&self) -> &ActorClock {
        &self.clock
    }

    /// Mint the next operation id for a local edit.
    pub fn next_op_id(&mut self) -> OpId {
        self.clock.next_op_id()
    }

    /// The materialized document state (read-only container view).
    pub fn doc(&self) -> &Document {
        &self.doc
    }

    /// The operation log.
    pub fn log(&self) -> &OpLog {
        &self.log
    }

    /// The version vector summarizing every integrated operation.
    pub fn version(&self) -> &VersionVector {
        self.log.version()
    }

    /// Current heads of the change DAG, sorted.
    pub fn heads(&self) -> &[ChangeHash] {
        &self.heads
    }

    /// Check whether a change has been integrated.
    pub fn knows(&self, hash: ChangeHash) -> bool {
        self.known.contains(&hash)
    }

    /// Hashes of every integrated change.
    pub fn known(&self) -> &HashSet<ChangeHash> {
        &self.known
    }

    /// Integrated changes in application order.
    pub fn history(&self) -> &[Change] {
        &self.history
    }

    /// Number of changes this replica has committed itself.
    pub fn own_seq(&self) -> u64 {
        self.seq
    }

    /// The materialized document value.
    pub fn value(&mut self) -> Value {
        self.doc.invalidate(self.log.take_dirty());
        self.doc.materialize()
    }

    /// The materialized value as of the last integrated change.
    ///
    /// Integration refreshes the cache eagerly, so this is always current
    /// and needs no mutable access; session handles use it for reads that
    /// must not contend with writers.
    pub fn snapshot(&self) -> Value {
        self.doc.snapshot().clone()
    }

    /// Commit local operations as a new change and apply it.
    ///
    /// The change depends on the replica's current heads, so every other
    /// replica integrates it only after everything it was based on. The
    /// operations must come from this replica's clock, in issue order.
    pub fn commit(
        &mut self,
        message: impl Into<String>,
        timestamp: i64,
        ops: Vec<Operation>,
    ) -> Result<Change> {
        let start_counter = ops
            .first()
            .map(|op| op.id.counter)
            .unwrap_or(self.clock.counter() + 1);

        let change = ChangeBuilder::new()
            .with_actor(self.actor())
            .with_seq(self.seq + 1)
            .with_start_counter(start_counter)
            .with_timestamp(timestamp)
            .with_message(message)
            .with_deps(self.heads.clone())
            .with_ops(ops)
            .build();

        self.integrate(&change)?;
        self.seq += 1;
        debug!(
            hash = %change.hash.short(),
            seq = self.seq,
            ops = change.len(),
            "committed local change"
        );
        Ok(change)
    }

    /// Integrate a change: verify, gate on dependencies, then apply every
    /// operation. All-or-nothing: if anything is not ready, no state mutates.
    ///
    /// Idempotent: re-integrating a known change returns
    /// [`ApplyStatus::Duplicate`] without touching anything.
    pub fn integrate(&mut self, change: &Change) -> Result<ApplyStatus> {
        if !change.verify() {
            return Err(MergeError::HashMismatch { hash: change.hash });
        }
        if self.known.contains(&change.hash) {
            return Ok(ApplyStatus::Duplicate);
        }
        if let Some(missing) = change.deps.iter().find(|dep| !self.known.contains(dep)) {
            return Err(MergeError::MissingChange(*missing));
        }
        self.check_ops_ready(change)?;

        for op in &change.ops {
            self.log.append(op.clone(), change.timestamp)?;
            self.doc.apply(op, change.timestamp)?;
            self.clock.observe(op.id.counter);
        }
        self.doc.invalidate(self.log.take_dirty());
        self.doc.refresh();

        self.known.insert(change.hash);
        self.heads.retain(|head| !change.deps.contains(head));
        self.heads.push(change.hash);
        self.heads.sort();
        self.history.push(change.clone());

        debug!(
            hash = %change.hash.short(),
            actor = %change.actor.short(),
            ops = change.len(),
            heads = self.heads.len(),
            "integrated change"
        );
        Ok(ApplyStatus::Applied)
    }

    /// The integrated changes a peer is missing, in application order.
    ///
    /// Application order is a valid delivery order: every change appears
    /// after all of its dependencies.
    pub fn changes_since(&self, peer_known: &HashSet<ChangeHash>) -> Vec<Change> {
        self.history
            .iter()
            .filter(|change| !peer_known.contains(&change.hash))
            .cloned()
            .collect()
    }

    /// Verify that a change is fully applicable before any state mutates.
    ///
    /// Every id an operation depends on must be in the log or defined
    /// earlier in the change, and every sequence anchor or removal target
    /// must resolve to an element of the addressed sequence. The last part
    /// matters for atomicity: a change that would fail in the document layer
    /// on its third operation must be rejected before the first one lands.
    fn check_ops_ready(&self, change: &Change) -> Result<()> {
        let in_change = |id: OpId, before: OpId| {
            id.actor == change.actor
                && id.counter >= change.start_counter
                && id.counter < before.counter
        };
        // Sequence elements inserted by earlier operations of this change.
        let mut staged: HashMap<&Path, HashSet<OpId>> = HashMap::new();
        for op in &change.ops {
            for id in op.preds.iter().copied().chain(op.referenced_ids()) {
                if !in_change(id, op.id) && !self.log.contains(id) {
                    return Err(MergeError::Log(orde_oplog::LogError::MissingDependency(id)));
                }
            }
            match &op.action {
                OpAction::Insert { after, .. } => {
                    if let Some(anchor) = *after {
                        if !self.element_known(&staged, &op.path, anchor) {
                            return Err(MergeError::Doc(DocError::UnknownAnchor {
                                path: op.path.clone(),
                                id: anchor,
                            }));
                        }
                    }
                    staged.entry(&op.path).or_default().insert(op.id);
                }
                OpAction::Remove { target } => {
                    if !self.element_known(&staged, &op.path, *target) {
                        return Err(MergeError::Doc(DocError::UnknownElement {
                            path: op.path.clone(),
                            id: *target,
                        }));
                    }
                }
                OpAction::Set { .. } | OpAction::Delete { .. } => {}
            }
        }
        Ok(())
    }

    /// True when `id` is an element (live or tombstoned) of the sequence at
    /// `path`, counting elements staged earlier in the change being checked.
    fn element_known(
        &self,
        staged: &HashMap<&Path, HashSet<OpId>>,
        path: &Path,
        id: OpId,
    ) -> bool {
        self.doc
            .sequence(path)
            .map_or(false, |seq| seq.contains(id))
            || staged.get(path).map_or(false, |ids| ids.contains(&id))
    }
}

impl Default for Replica {
    fn default() -> Self {
        Self::new()
    }
}
