//! Actor identity and the per-actor operation clock.
//!
//! Every replica owns exactly one [`ActorId`] for its lifetime. Operation
//! identifiers pair that actor with a strictly increasing counter, giving a
//! total order within an actor and a globally unique key across the system.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identity of one replica contributing operations.
///
/// Backed by a 16-byte ULID. Immutable once chosen for a replica's lifetime;
/// two sessions must never share an actor while editing concurrently.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(Ulid);

impl ActorId {
    /// Generate a fresh random actor identity.
    pub fn generate() -> Self {
        ActorId(Ulid::new())
    }

    /// Reconstruct an actor identity from its raw 16 bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        ActorId(Ulid::from_bytes(bytes))
    }

    /// The raw 16 bytes of this identity (big-endian ULID).
    pub fn to_bytes(self) -> [u8; 16] {
        self.0.to_bytes()
    }

    /// The all-zero actor, used only as a placeholder in tests.
    pub fn nil() -> Self {
        ActorId(Ulid::nil())
    }

    /// Truncated display (first 8 chars of the ULID).
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({}...)", self.short())
    }
}

/// Globally unique identifier of a single operation.
///
/// Ordered by `(counter, actor)`, which is a Lamport order: an operation
/// created after observing another always has a higher counter, and
/// concurrent operations are tie-broken by actor identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpId {
    /// Per-actor monotonically increasing counter. Never reused.
    pub counter: u64,
    /// The actor that created the operation.
    pub actor: ActorId,
}

impl OpId {
    /// Create an operation id from its parts.
    pub fn new(counter: u64, actor: ActorId) -> Self {
        OpId { counter, actor }
    }
}

impl PartialOrd for OpId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.counter
            .cmp(&other.counter)
            .then_with(|| self.actor.cmp(&other.actor))
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.counter, self.actor.short())
    }
}

impl fmt::Debug for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpId({}@{})", self.counter, self.actor.short())
    }
}

/// Per-actor operation counter.
///
/// `next` returns a strictly increasing counter value, and `observe` advances
/// the clock past counters seen in remote operations so that later local
/// operations sort after everything already applied (Lamport merge).
///
/// The counter lives in memory only. A caller that resumes an existing actor
/// identity after a restart must persist the counter itself (see
/// [`ActorClock::resume`]); otherwise it should generate a fresh actor per
/// session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActorClock {
    actor: ActorId,
    counter: u64,
}

impl ActorClock {
    /// Create a clock for a fresh actor, starting at zero.
    pub fn new(actor: ActorId) -> Self {
        ActorClock { actor, counter: 0 }
    }

    /// Resume a clock from a persisted counter value.
    pub fn resume(actor: ActorId, counter: u64) -> Self {
        ActorClock { actor, counter }
    }

    /// The actor this clock belongs to.
    pub fn actor(&self) -> ActorId {
        self.actor
    }

    /// The last counter value handed out.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Hand out the next operation id. Strictly increasing, never reused.
    pub fn next_op_id(&mut self) -> OpId {
        self.counter += 1;
        OpId::new(self.counter, self.actor)
    }

    /// Advance the clock past a counter observed in a remote operation.
    pub fn observe(&mut self, counter: u64) {
        self.counter = self.counter.max(counter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_bytes_roundtrip() {
        let actor = ActorId::generate();
        let bytes = actor.to_bytes();
        assert_eq!(ActorId::from_bytes(bytes), actor);
    }

    #[test]
    fn test_opid_order_counter_first() {
        let a = ActorId::generate();
        let b = ActorId::generate();
        assert!(OpId::new(1, a) < OpId::new(2, b));
        assert!(OpId::new(2, a) > OpId::new(1, b));
    }

    #[test]
    fn test_opid_order_actor_tiebreak() {
        let mut actors = [ActorId::generate(), ActorId::generate()];
        actors.sort();
        assert!(OpId::new(5, actors[0]) < OpId::new(5, actors[1]));
    }

    #[test]
    fn test_clock_strictly_increasing() {
        let mut clock = ActorClock::new(ActorId::generate());
        let first = clock.next_op_id();
        let second = clock.next_op_id();
        assert!(second > first);
        assert_eq!(second.counter, first.counter + 1);
    }

    #[test]
    fn test_clock_observe_advances() {
        let mut clock = ActorClock::new(ActorId::generate());
        clock.next_op_id();
        clock.observe(41);
        assert_eq!(clock.next_op_id().counter, 42);

        // Observing an older counter is a no-op
        clock.observe(3);
        assert_eq!(clock.next_op_id().counter, 43);
    }

    #[test]
    fn test_clock_resume() {
        let actor = ActorId::generate();
        let clock = ActorClock::resume(actor, 100);
        let mut clock = clock;
        assert_eq!(clock.next_op_id().counter, 101);
    }
}
