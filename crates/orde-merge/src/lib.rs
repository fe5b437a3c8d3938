//! # orde-merge: Replicas and Change Integration
//!
//! The merge layer ties the operation log and the document model into a
//! [`Replica`]: one actor's complete view of a document, able to commit
//! local edits as changes and integrate changes from peers. The
//! [`MergeEngine`] adds a bounded buffer so changes can arrive in any
//! order; replicas that have integrated the same set of changes always
//! materialize the same document value.
//!
//! ## Example
//!
//! ```
//! use orde_core::{OpAction, Operation, Path, Payload, Scalar};
//! use orde_merge::{MergeEngine, Replica};
//!
//! let mut local = Replica::new();
//! let op = Operation::new(
//!     local.next_op_id(),
//!     Path::root(),
//!     OpAction::Set {
//!         key: "name".to_string(),
//!         payload: Payload::Scalar(Scalar::Str("Foo".to_string())),
//!     },
//!     vec![],
//! );
//! let change = local.commit("initial", 1_700_000_000_000, vec![op]).unwrap();
//!
//! let mut remote = MergeEngine::new(Replica::new());
//! remote.ingest(change).unwrap();
//! assert_eq!(remote.replica_mut().value(), local.value());
//! ```

pub mod engine;
pub mod error;
pub mod replica;

pub use engine::{MergeEngine, DEFAULT_PENDING_CAPACITY};
pub use error::{MergeError, Result};
pub use replica::{ApplyStatus, Replica};
