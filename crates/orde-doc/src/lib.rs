//! # orde-doc: Document Model
//!
//! Materializes the operation log into a JSON-like value tree. Map keys
//! resolve conflicts last-writer-wins on `(timestamp, OpId)`; sequences are
//! replicated growable arrays whose elements are addressed by the id of the
//! insert that created them and tombstoned on removal. Both rules are
//! commutative and idempotent, so replicas that have seen the same
//! operations materialize the same value regardless of delivery order.
//!
//! ## Example
//!
//! ```
//! use orde_core::{ActorClock, ActorId, OpAction, Operation, Path, Payload, Scalar};
//! use orde_doc::Document;
//!
//! let mut clock = ActorClock::new(ActorId::generate());
//! let mut doc = Document::new();
//!
//! let op = Operation::new(
//!     clock.next_op_id(),
//!     Path::root(),
//!     OpAction::Set {
//!         key: "name".to_string(),
//!         payload: Payload::Scalar(Scalar::Str("Foo".to_string())),
//!     },
//!     vec![],
//! );
//! doc.apply(&op, 1).unwrap();
//! doc.invalidate([Path::root()]);
//!
//! assert_eq!(doc.value().get("name").and_then(|v| v.as_str()), Some("Foo"));
//! ```

pub mod document;
pub mod error;
pub mod sequence;
pub mod slot;

pub use document::Document;
pub use error::{DocError, Result};
pub use sequence::{SeqElem, SeqState};
pub use slot::LwwSlot;
