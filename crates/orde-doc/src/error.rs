//! Error types for the document layer.

use orde_core::{OpId, Path};
use thiserror::Error;

/// Errors that can occur while applying operations to a document.
///
/// With causal gating in front of the document (the operation log refuses
/// operations whose predecessors are missing) neither of these is reachable
/// through the merge path; they guard direct use of the document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocError {
    #[error("unknown sequence element {id} at {path}")]
    UnknownElement { path: Path, id: OpId },

    #[error("unknown insert anchor {id} at {path}")]
    UnknownAnchor { path: Path, id: OpId },
}

pub type Result<T> = std::result::Result<T, DocError>;
