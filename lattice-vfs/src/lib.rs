//! Virtual filesystem layer.
//!
//! The reader consumes partitions and performs I/O through this crate; the
//! partitioner itself never touches it. Backends implement the
//! [`ObjectStore`] capability set and are dispatched by URI scheme. The
//! [`Vfs`] façade adds batched parallel reads: byte regions are coalesced
//! into batches, each batch is read on a pool thread, and the bytes are
//! scatter-copied into the caller's buffers. Process-wide file locks live
//! in the reference-counted [`FileLockService`].

pub use lock::*;
pub use store::*;
pub use uri::*;
pub use vfs::*;

mod lock;
mod store;
mod uri;
mod vfs;
