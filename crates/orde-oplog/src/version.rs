//! Version vector summarizing the operations seen per actor.
//!
//! Because each actor's operations carry contiguous counters, the highest
//! counter seen per actor is a compact summary of the whole causal history.

use orde_core::{ActorId, OpId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tracks the highest operation counter seen from each actor.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector {
    entries: BTreeMap<ActorId, u64>,
}

impl VersionVector {
    /// Create an empty version vector.
    pub fn new() -> Self {
        VersionVector {
            entries: BTreeMap::new(),
        }
    }

    /// The highest counter seen from an actor (0 if never seen).
    pub fn get(&self, actor: ActorId) -> u64 {
        self.entries.get(&actor).copied().unwrap_or(0)
    }

    /// Record an operation id, advancing the actor's entry if needed.
    pub fn observe(&mut self, id: OpId) {
        let entry = self.entries.entry(id.actor).or_insert(0);
        *entry = (*entry).max(id.counter);
    }

    /// Check whether an operation id is covered by this vector.
    pub fn contains(&self, id: OpId) -> bool {
        self.get(id.actor) >= id.counter
    }

    /// Merge with another vector (component-wise max).
    pub fn merge(&mut self, other: &VersionVector) {
        for (&actor, &counter) in &other.entries {
            let entry = self.entries.entry(actor).or_insert(0);
            *entry = (*entry).max(counter);
        }
    }

    /// Check if this vector dominates another: for all actors,
    /// `self[a] >= other[a]`.
    pub fn dominates(&self, other: &VersionVector) -> bool {
        other
            .entries
            .iter()
            .all(|(&actor, &counter)| self.get(actor) >= counter)
    }

    /// Check if two vectors are concurrent (neither dominates the other).
    pub fn is_concurrent_with(&self, other: &VersionVector) -> bool {
        !self.dominates(other) && !other.dominates(self)
    }

    /// Iterate over `(actor, highest counter)` entries.
    pub fn iter(&self) -> impl Iterator<Item = (ActorId, u64)> + '_ {
        self.entries.iter().map(|(&a, &c)| (a, c))
    }

    /// Number of actors tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the vector is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of operations covered across all actors.
    pub fn total_operations(&self) -> u64 {
        self.entries.values().sum()
    }
}
