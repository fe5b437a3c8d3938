//! Operations: the atomic edits a document is built from.
//!
//! Each operation records its own id, the container path it targets, the
//! edit itself, and the ids of the operations it causally depends on (the
//! document state it was applied against). Operations are immutable once
//! created.

use crate::actor::OpId;
use crate::path::Path;
use crate::value::Scalar;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The payload written by a `Set` or `Insert` operation.
///
/// Container creation is a payload kind: writing `Map` or `Seq` creates an
/// empty container at the target slot, to be filled by later operations
/// addressing the child path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// A scalar leaf value.
    Scalar(Scalar),
    /// A new empty map container.
    Map,
    /// A new empty sequence container.
    Seq,
}

impl Payload {
    pub fn is_container(&self) -> bool {
        !matches!(self, Payload::Scalar(_))
    }
}

impl From<Scalar> for Payload {
    fn from(s: Scalar) -> Self {
        Payload::Scalar(s)
    }
}

/// The edit performed by an operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum OpAction {
    /// Set a key in the map at the operation's path.
    Set {
        /// The map key being written.
        key: String,
        /// The value written.
        payload: Payload,
    },
    /// Delete a key from the map at the operation's path.
    ///
    /// Recorded with no value payload; competes with concurrent sets on the
    /// same key under the last-writer-wins rule.
    Delete {
        /// The map key being deleted.
        key: String,
    },
    /// Insert an element into the sequence at the operation's path.
    Insert {
        /// The element this one goes after; `None` inserts at the head.
        after: Option<OpId>,
        /// The value inserted.
        payload: Payload,
    },
    /// Tombstone a sequence element.
    ///
    /// The element stays in place as a position reference for concurrent
    /// inserts; only the materialized view skips it.
    Remove {
        /// The id of the insert that created the element.
        target: OpId,
    },
}

impl OpAction {
    /// True for map edits (`Set` / `Delete`).
    pub fn is_map_action(&self) -> bool {
        matches!(self, OpAction::Set { .. } | OpAction::Delete { .. })
    }

    /// True for sequence edits (`Insert` / `Remove`).
    pub fn is_seq_action(&self) -> bool {
        matches!(self, OpAction::Insert { .. } | OpAction::Remove { .. })
    }
}

/// A single atomic edit, immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique id of this operation.
    pub id: OpId,
    /// The container this operation edits.
    pub path: Path,
    /// The edit itself.
    pub action: OpAction,
    /// Ids of the operations this one was created against.
    ///
    /// All predecessors must be present in a replica's log before the
    /// operation is applicable (causal consistency).
    pub preds: Vec<OpId>,
}

impl Operation {
    /// Create an operation. Predecessors are sorted for a canonical encoding.
    pub fn new(id: OpId, path: Path, action: OpAction, mut preds: Vec<OpId>) -> Self {
        preds.sort();
        preds.dedup();
        Operation {
            id,
            path,
            action,
            preds,
        }
    }

    /// An operation listing itself as a predecessor is structurally invalid.
    pub fn is_self_referential(&self) -> bool {
        self.preds.contains(&self.id)
    }

    /// Ids this operation references besides its predecessors (sequence
    /// anchors and removal targets).
    pub fn referenced_ids(&self) -> Vec<OpId> {
        match &self.action {
            OpAction::Insert {
                after: Some(anchor),
                ..
            } => vec![*anchor],
            OpAction::Remove { target } => vec![*target],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            OpAction::Set { key, payload } => {
                write!(f, "{} set {}.{} = {:?}", self.id, self.path, key, payload)
            }
            OpAction::Delete { key } => {
                write!(f, "{} delete {}.{}", self.id, self.path, key)
            }
            OpAction::Insert { after, payload } => match after {
                Some(anchor) => write!(
                    f,
                    "{} insert {:?} after {} in {}",
                    self.id, payload, anchor, self.path
                ),
                None => write!(f, "{} insert {:?} at head of {}", self.id, payload, self.path),
            },
            OpAction::Remove { target } => {
                write!(f, "{} remove {} from {}", self.id, target, self.path)
            }
        }
    }
}
