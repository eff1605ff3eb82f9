#![deny(missing_docs)]

//! Physical types for Lattice array domains.
//!
//! Every dimension of an array shares one numeric coordinate type. This
//! crate defines the [`PType`] tag for those types, the [`NativeCellType`]
//! trait that binds each tag to its native Rust type together with the
//! domain arithmetic the query planner needs (midpoints, successors, tile
//! boundaries), and macros to dispatch from a runtime [`PType`] into
//! monomorphic code.

pub use ptype::*;

mod ptype;
