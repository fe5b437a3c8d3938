//! Last-writer-wins slot for one map key.
//!
//! The slot retains the write with the highest `(timestamp, OpId)` pair; on
//! a timestamp tie the higher operation id wins. A delete is a write with no
//! payload and competes under the same rule, so a concurrent set with a
//! higher stamp revives the key deterministically on every replica.

use orde_core::{OpId, Payload};
use serde::{Deserialize, Serialize};

/// The current winner for one map key.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LwwSlot {
    timestamp: i64,
    writer: Option<OpId>,
    /// `None` once a delete wins (or before any write).
    payload: Option<Payload>,
}

impl LwwSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a write. `payload` is `None` for a delete.
    ///
    /// Commutative and idempotent: the outcome depends only on the set of
    /// writes ever recorded, not on their arrival order.
    pub fn write(&mut self, id: OpId, timestamp: i64, payload: Option<Payload>) {
        let wins = match self.writer {
            None => true,
            Some(current) => (timestamp, id) > (self.timestamp, current),
        };
        if wins {
            self.timestamp = timestamp;
            self.writer = Some(id);
            self.payload = payload;
        }
    }

    /// The winning payload, or `None` if the key is absent (deleted or never
    /// written).
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// The id of the winning write, if any write has been recorded.
    pub fn writer(&self) -> Option<OpId> {
        self.writer
    }

    /// The timestamp of the winning write.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// True once a non-delete write holds the slot.
    pub fn is_present(&self) -> bool {
        self.payload.is_some()
    }
}
