//! Change batching, hashing and the binary wire codec.
//!
//! A [`Change`] is an ordered, contiguous batch of one actor's operations:
//! the unit of exchange between replicas. This crate gives changes a
//! content-addressed identity ([`ChangeHash`], forming a Merkle-DAG through
//! each change's `deps`) and a deterministic, versioned binary encoding.

pub mod change;
pub mod codec;
pub mod hash;

pub use change::{Change, ChangeBuilder};
pub use codec::{DecodeError, FORMAT_VERSION};
pub use hash::ChangeHash;
