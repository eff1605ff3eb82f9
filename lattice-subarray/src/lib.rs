//! Subarrays and the subarray partitioner.
//!
//! A read query against a Lattice array names a *subarray*: one or more
//! closed coordinate ranges per dimension, traversed in a caller-chosen
//! layout. Result sizes are unbounded while caller buffers are not, so the
//! engine iterates a subarray as a sequence of partitions whose *estimated*
//! result footprint fits per-attribute byte budgets. This crate holds the
//! subarray data model ([`Subarray`], [`Range`], [`ArraySchema`]), the
//! estimation seam ([`ResultSizeEstimator`]), the budget store, and the
//! iterator that does the hard part: [`SubarrayPartitioner`].

pub use budget::*;
pub use estimate::*;
pub use partitioner::*;
pub use range::*;
pub use schema::*;
pub use subarray::*;

mod budget;
mod estimate;
mod partitioner;
mod range;
mod schema;
mod subarray;
