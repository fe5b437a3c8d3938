//! Error types for the SDK layer.

use orde_change::DecodeError;
use orde_core::Path;
use orde_doc::DocError;
use orde_merge::MergeError;
use thiserror::Error;

/// Errors surfaced by document sessions and drafts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdkError {
    /// Change integration failed.
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// A binary change could not be parsed.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A staged edit was rejected by the document.
    #[error(transparent)]
    Doc(#[from] DocError),

    /// A map edit targeted a path that does not hold a map.
    #[error("path {0} does not address a map")]
    NotAMap(Path),

    /// A sequence edit targeted a path that does not hold a sequence.
    #[error("path {0} does not address a sequence")]
    NotASequence(Path),

    /// A sequence index is past the end.
    #[error("index {index} out of bounds at {path} (length {len})")]
    IndexOutOfBounds {
        path: Path,
        index: usize,
        len: usize,
    },

    /// A document was seeded from JSON that is not an object at the top
    /// level.
    #[error("document root must be a JSON object")]
    RootNotAnObject,
}

pub type Result<T> = std::result::Result<T, SdkError>;
