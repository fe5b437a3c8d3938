//! Operation log layer for the Citrine replicated document engine.
//!
//! Provides the append-only, causally-gated [`OpLog`] arena and the
//! [`VersionVector`] summary used to reason about what a replica has seen.

pub mod log;
pub mod version;

pub use log::{Appended, LogError, OpLog, StoredOp};
pub use version::VersionVector;
