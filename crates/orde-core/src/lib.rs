//! Core types for the Citrine replicated document engine.
//!
//! This crate defines the vocabulary shared by every layer: actor identity
//! and the per-actor clock, operation identifiers, the operation type itself,
//! document paths, and the materialized value tree.

pub mod actor;
pub mod op;
pub mod path;
pub mod value;

pub use actor::{ActorClock, ActorId, OpId};
pub use op::{OpAction, Operation, Payload};
pub use path::{Path, PathSegment};
pub use value::{Scalar, Value};
