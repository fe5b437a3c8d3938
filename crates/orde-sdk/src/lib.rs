//! Citrine SDK - high-level API for replicated documents
//!
//! A document is a JSON-like tree that any number of replicas can edit
//! offline. Edits are committed as content-addressed binary changes;
//! replicas exchange changes in any order, and once two replicas have seen
//! the same set of changes their documents are identical.
//!
//! # Quick Start
//!
//! ```rust
//! use orde_sdk::{DocSession, Path};
//! use serde_json::json;
//!
//! // Seed a document and hand a copy to a second device.
//! let local = DocSession::from_json(&json!({ "name": "Foo" })).unwrap();
//! let remote = local.fork().unwrap();
//!
//! // Both edit offline.
//! let change = local
//!     .change("rename", |draft| {
//!         draft.put(&Path::root(), "name", &json!("Bar"))
//!     })
//!     .unwrap();
//!
//! // Changes travel as bytes and merge on arrival.
//! remote.apply_encoded_changes([change.encode().as_slice()]).unwrap();
//! assert_eq!(remote.to_json(), local.to_json());
//! ```
//!
//! # Architecture
//!
//! The SDK sits on top of the lower-level crates:
//!
//! - [`session`] - document sessions, drafts and change exchange
//! - [`api`] - decoding and summarizing binary changes
//! - [`error`] - error types

pub mod api;
pub mod error;
pub mod session;

// Re-exports for convenience
pub use api::{
    apply_changes, clone_session, create_document, decode_change, get_changes, ChangeSummary,
};
pub use error::{Result, SdkError};
pub use session::{DocSession, Draft};

// Re-export commonly used types from the lower layers
pub use orde_change::{Change, ChangeHash};
pub use orde_core::{ActorId, OpId, Path, PathSegment, Scalar, Value};
pub use orde_merge::{ApplyStatus, MergeEngine, Replica};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::api::{decode_change, ChangeSummary};
    pub use crate::error::SdkError;
    pub use crate::session::{DocSession, Draft};
    pub use orde_change::{Change, ChangeHash};
    pub use orde_core::{ActorId, Path, Scalar, Value};
    pub use orde_merge::ApplyStatus;
}
