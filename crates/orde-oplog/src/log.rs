//! The append-only operation log.
//!
//! Operations live in an arena keyed by [`OpId`], with causal links expressed
//! as explicit id references rather than in-memory pointers. Appends are
//! causally gated: an operation whose predecessors are absent is rejected
//! with [`LogError::MissingDependency`] so the caller can buffer it, and
//! appending an already-present id is a harmless no-op.

use crate::version::VersionVector;
use orde_core::{OpId, Operation, Path};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Errors that can occur while appending to the log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    /// A declared predecessor is not in the log yet. Recoverable: buffer the
    /// operation and retry once the dependency arrives.
    #[error("missing dependency: {0} is not in the log")]
    MissingDependency(OpId),
}

pub type Result<T> = std::result::Result<T, LogError>;

/// Outcome of a successful append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Appended {
    /// The operation was new and is now in the log.
    Inserted,
    /// The operation id was already present; nothing changed.
    Duplicate,
}

/// An operation at rest in the log, stamped with the wall-clock timestamp of
/// the change that carried it (used for last-writer-wins comparison).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredOp {
    pub op: Operation,
    pub timestamp: i64,
}

/// Append-only, causally-gated store of operations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OpLog {
    /// Arena of all known operations, keyed by id.
    ops: BTreeMap<OpId, StoredOp>,
    /// Summary of the highest counter seen per actor.
    version: VersionVector,
    /// Container paths touched since the last drain, for incremental
    /// document recomputation.
    dirty: BTreeSet<Path>,
}

impl OpLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation stamped with its change's timestamp.
    ///
    /// Fails with [`LogError::MissingDependency`] if any declared
    /// predecessor is absent. Idempotent: appending a known id succeeds
    /// without mutating anything.
    pub fn append(&mut self, op: Operation, timestamp: i64) -> Result<Appended> {
        if self.ops.contains_key(&op.id) {
            return Ok(Appended::Duplicate);
        }
        if let Some(missing) = self.first_missing_dep(&op) {
            return Err(LogError::MissingDependency(missing));
        }

        self.version.observe(op.id);
        self.dirty.insert(op.path.clone());
        self.ops.insert(op.id, StoredOp { op, timestamp });
        Ok(Appended::Inserted)
    }

    /// Look up an operation by id.
    pub fn get(&self, id: OpId) -> Option<&StoredOp> {
        self.ops.get(&id)
    }

    /// Check whether an id is in the log.
    pub fn contains(&self, id: OpId) -> bool {
        self.ops.contains_key(&id)
    }

    /// True iff all of the operation's declared predecessors are present.
    pub fn causally_ready(&self, op: &Operation) -> bool {
        self.first_missing_dep(op).is_none()
    }

    /// The first absent predecessor, if any.
    pub fn first_missing_dep(&self, op: &Operation) -> Option<OpId> {
        op.preds
            .iter()
            .copied()
            .find(|pred| !self.ops.contains_key(pred))
    }

    /// The version vector summarizing everything in the log.
    pub fn version(&self) -> &VersionVector {
        &self.version
    }

    /// Drain the set of container paths touched since the last drain.
    pub fn take_dirty(&mut self) -> BTreeSet<Path> {
        std::mem::take(&mut self.dirty)
    }

    /// Iterate over all stored operations in id order.
    pub fn iter(&self) -> impl Iterator<Item = &StoredOp> {
        self.ops.values()
    }

    /// Number of operations in the log.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Check if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
