//! Error types for the merge layer.

use orde_change::ChangeHash;
use orde_doc::DocError;
use orde_oplog::LogError;
use thiserror::Error;

/// Errors that can occur while integrating changes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// The change's stored hash does not match its contents. The change is
    /// corrupt or tampered with and must be discarded.
    #[error("change {} fails hash verification", .hash.short())]
    HashMismatch { hash: ChangeHash },

    /// A change this one depends on has not been integrated yet.
    /// Recoverable: deliver the dependency first, or hand the change to the
    /// [`MergeEngine`](crate::MergeEngine), which buffers it.
    #[error("missing dependency change {}", .0.short())]
    MissingChange(ChangeHash),

    /// An operation's declared predecessor is absent from the log.
    #[error(transparent)]
    Log(#[from] LogError),

    /// The document rejected an operation.
    #[error(transparent)]
    Doc(#[from] DocError),

    /// The pending buffer overflowed and the oldest parked change was
    /// dropped. The evicted change must be delivered again later.
    #[error("pending buffer full, evicted parked change {}", .evicted.short())]
    Backpressure { evicted: ChangeHash },
}

pub type Result<T> = std::result::Result<T, MergeError>;
