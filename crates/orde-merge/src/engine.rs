//! The merge engine: change delivery with causal buffering.
//!
//! Wraps a [`Replica`] with a bounded buffer of changes that arrived before
//! their dependencies. Delivery order does not matter: a change that is not
//! ready is parked, and every successful integration retries the parked
//! changes until no further progress is possible.
//!
//! The buffer is bounded. When it overflows, the oldest parked change is
//! evicted and the caller is told which one, so the transport can deliver it
//! again once its dependencies have arrived.

use crate::error::{MergeError, Result};
use crate::replica::{ApplyStatus, Replica};
use orde_change::Change;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Default bound on the number of parked changes.
pub const DEFAULT_PENDING_CAPACITY: usize = 64;

/// A replica plus a bounded buffer for out-of-order change delivery.
#[derive(Clone, Debug)]
pub struct MergeEngine {
    replica: Replica,
    /// Changes awaiting dependencies, oldest first.
    pending: VecDeque<Change>,
    capacity: usize,
}

impl MergeEngine {
    /// Wrap a replica with the default pending capacity.
    pub fn new(replica: Replica) -> Self {
        Self::with_capacity(replica, DEFAULT_PENDING_CAPACITY)
    }

    /// Wrap a replica with an explicit pending capacity.
    pub fn with_capacity(replica: Replica, capacity: usize) -> Self {
        MergeEngine {
            replica,
            pending: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// The wrapped replica.
    pub fn replica(&self) -> &Replica {
        &self.replica
    }

    /// The wrapped replica, mutably (for local commits).
    pub fn replica_mut(&mut self) -> &mut Replica {
        &mut self.replica
    }

    /// Number of changes parked awaiting dependencies.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing is parked.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Deliver one change.
    ///
    /// A ready change is integrated immediately and any parked changes it
    /// unblocks are integrated as well. A change whose dependencies are
    /// missing is parked and [`ApplyStatus::Deferred`] is returned.
    /// Corrupt changes are rejected without being parked.
    pub fn ingest(&mut self, change: Change) -> Result<ApplyStatus> {
        match self.replica.integrate(&change) {
            Ok(ApplyStatus::Applied) => {
                self.drain_pending();
                Ok(ApplyStatus::Applied)
            }
            Ok(status) => Ok(status),
            Err(MergeError::MissingChange(_)) | Err(MergeError::Log(_)) => self.park(change),
            Err(err) => Err(err),
        }
    }

    /// Deliver a batch of changes; order within the batch does not matter.
    ///
    /// Returns the number of changes applied. Stops early only on a
    /// non-recoverable error.
    pub fn ingest_all(&mut self, changes: impl IntoIterator<Item = Change>) -> Result<usize> {
        let mut applied = 0;
        for change in changes {
            if self.ingest(change)? == ApplyStatus::Applied {
                applied += 1;
            }
        }
        Ok(applied)
    }

    fn park(&mut self, change: Change) -> Result<ApplyStatus> {
        if self.pending.iter().any(|parked| parked.hash == change.hash) {
            return Ok(ApplyStatus::Duplicate);
        }
        debug!(
            hash = %change.hash.short(),
            parked = self.pending.len() + 1,
            "parking change awaiting dependencies"
        );
        self.pending.push_back(change);

        if self.pending.len() > self.capacity {
            if let Some(evicted) = self.pending.pop_front() {
                warn!(
                    hash = %evicted.hash.short(),
                    capacity = self.capacity,
                    "pending buffer full, evicting oldest parked change"
                );
                return Err(MergeError::Backpressure {
                    evicted: evicted.hash,
                });
            }
        }
        Ok(ApplyStatus::Deferred)
    }

    /// Retry parked changes until a pass makes no progress.
    fn drain_pending(&mut self) {
        loop {
            let mut progressed = false;
            let mut still_parked = VecDeque::new();

            while let Some(change) = self.pending.pop_front() {
                match self.replica.integrate(&change) {
                    Ok(ApplyStatus::Applied) => {
                        debug!(hash = %change.hash.short(), "unparked change applied");
                        progressed = true;
                    }
                    Ok(_) => {}
                    Err(MergeError::MissingChange(_)) | Err(MergeError::Log(_)) => {
                        still_parked.push_back(change);
                    }
                    Err(err) => {
                        warn!(
                            hash = %change.hash.short(),
                            error = %err,
                            "discarding unapplicable parked change"
                        );
                    }
                }
            }

            self.pending = still_parked;
            if !progressed || self.pending.is_empty() {
                return;
            }
        }
    }
}
