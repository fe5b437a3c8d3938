//! The client API: document lifecycle and change inspection.
//!
//! Free-function forms of the [`DocSession`] surface, plus
//! [`ChangeSummary`]: a human-oriented view of a binary change that tools,
//! logs and sync debuggers can show without integrating it anywhere.

use crate::error::Result;
use crate::session::DocSession;
use chrono::{DateTime, Utc};
use orde_change::Change;
use serde::Serialize;

/// Create a document seeded from a JSON object, with a fresh actor.
pub fn create_document(initial: &serde_json::Value) -> Result<DocSession> {
    DocSession::from_json(initial)
}

/// The changes `source` has that `target` is missing, in a
/// dependency-respecting order.
pub fn get_changes(source: &DocSession, target: &DocSession) -> Vec<Change> {
    source.changes_since(&target.known())
}

/// Integrate changes from a peer, in any order. Returns the number applied.
pub fn apply_changes(
    session: &DocSession,
    changes: impl IntoIterator<Item = Change>,
) -> Result<usize> {
    session.apply_changes(changes)
}

/// An independent session with its own actor and the full history of
/// `session`.
pub fn clone_session(session: &DocSession) -> Result<DocSession> {
    session.fork()
}

/// A human-oriented view of one change.
#[derive(Clone, Debug, Serialize)]
pub struct ChangeSummary {
    /// Hex hash identifying the change.
    pub hash: String,
    /// The committing actor.
    pub actor: String,
    /// Per-actor change sequence number.
    pub seq: u64,
    /// Counter of the first operation.
    pub start_counter: u64,
    /// Commit wall clock, RFC 3339 (falls back to the raw millisecond value
    /// when out of range).
    pub time: String,
    /// The commit message.
    pub message: String,
    /// Hex hashes of the changes this one depends on.
    pub deps: Vec<String>,
    /// One rendered line per operation.
    pub ops: Vec<String>,
}

impl ChangeSummary {
    /// Summarize a decoded change.
    pub fn of(change: &Change) -> Self {
        let time = DateTime::<Utc>::from_timestamp_millis(change.timestamp)
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| change.timestamp.to_string());
        ChangeSummary {
            hash: change.hash.to_hex(),
            actor: change.actor.to_string(),
            seq: change.seq,
            start_counter: change.start_counter,
            time,
            message: change.message.clone(),
            deps: change.deps.iter().map(|d| d.to_hex()).collect(),
            ops: change.ops.iter().map(|op| op.to_string()).collect(),
        }
    }
}

/// Decode a binary change and summarize it, without applying it anywhere.
pub fn decode_change(bytes: &[u8]) -> Result<ChangeSummary> {
    let change = Change::decode(bytes)?;
    Ok(ChangeSummary::of(&change))
}
