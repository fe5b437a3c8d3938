//! The change: an ordered, contiguous batch of one actor's operations.
//!
//! A change is the unit of network transfer. It carries a human message and
//! a wall-clock timestamp, and is identified by the SHA-256 hash of its
//! canonical encoding. Since that encoding includes the hashes of the
//! changes it depends on, changes form a Merkle-DAG.

use crate::codec;
use crate::hash::ChangeHash;
use orde_core::{ActorId, Operation};
use serde::{Deserialize, Serialize};

/// An immutable batch of one actor's operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Change {
    /// SHA-256 of the canonical encoding. Identifies the change globally.
    pub hash: ChangeHash,
    /// The actor that produced every operation in this change.
    pub actor: ActorId,
    /// Per-actor change sequence number (1 for the actor's first change).
    pub seq: u64,
    /// Counter of the first operation in the change.
    pub start_counter: u64,
    /// Wall-clock timestamp in milliseconds since the epoch.
    pub timestamp: i64,
    /// Human-readable description of the edit session.
    pub message: String,
    /// Hashes of the changes this one depends on (the committing replica's
    /// heads), sorted.
    pub deps: Vec<ChangeHash>,
    /// The operations, in the order they were issued.
    pub ops: Vec<Operation>,
}

impl Change {
    /// Number of operations in the change.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True if the change carries no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Counter just past the last operation in the change. Saturates
    /// rather than wrapping on hostile counter values.
    pub fn end_counter(&self) -> u64 {
        self.start_counter.saturating_add(self.ops.len() as u64)
    }

    /// Serialize to the versioned binary wire format.
    pub fn encode(&self) -> Vec<u8> {
        codec::encode(self)
    }

    /// Parse a change from its binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Change, codec::DecodeError> {
        codec::decode(bytes)
    }

    /// Verify that the stored hash matches the change contents.
    pub fn verify(&self) -> bool {
        ChangeHash::of(&codec::encode(self)) == self.hash
    }
}

/// Builder assembling a change and computing its hash.
#[derive(Clone, Debug, Default)]
pub struct ChangeBuilder {
    actor: Option<ActorId>,
    seq: u64,
    start_counter: Option<u64>,
    timestamp: i64,
    message: String,
    deps: Vec<ChangeHash>,
    ops: Vec<Operation>,
}

impl ChangeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the producing actor.
    pub fn with_actor(mut self, actor: ActorId) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Set the per-actor change sequence number.
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    /// Set the counter of the first operation. Only needed for empty
    /// changes; otherwise derived from the first operation.
    pub fn with_start_counter(mut self, start_counter: u64) -> Self {
        self.start_counter = Some(start_counter);
        self
    }

    /// Set the wall-clock timestamp (milliseconds).
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the human message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Set the dependency hashes (sorted for a canonical encoding).
    pub fn with_deps(mut self, mut deps: Vec<ChangeHash>) -> Self {
        deps.sort();
        deps.dedup();
        self.deps = deps;
        self
    }

    /// Set the operations.
    pub fn with_ops(mut self, ops: Vec<Operation>) -> Self {
        self.ops = ops;
        self
    }

    /// Append a single operation.
    pub fn with_op(mut self, op: Operation) -> Self {
        self.ops.push(op);
        self
    }

    /// Build the change, computing its content hash.
    ///
    /// The caller must supply operations with contiguous counters all owned
    /// by the change's actor; the session layer guarantees this.
    pub fn build(self) -> Change {
        let actor = self.actor.unwrap_or_else(ActorId::nil);
        let start_counter = self
            .start_counter
            .or_else(|| self.ops.first().map(|op| op.id.counter))
            .unwrap_or(1);

        debug_assert!(self
            .ops
            .iter()
            .enumerate()
            .all(|(i, op)| op.id.actor == actor && op.id.counter == start_counter + i as u64));

        let mut change = Change {
            hash: ChangeHash::zero(),
            actor,
            seq: self.seq,
            start_counter,
            timestamp: self.timestamp,
            message: self.message,
            deps: self.deps,
            ops: self.ops,
        };
        change.hash = ChangeHash::of(&codec::encode(&change));
        change
    }
}
