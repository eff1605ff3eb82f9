#![deny(missing_docs)]

//! Error handling for Lattice.
//!
//! This crate contains the shared error enum, the `LatticeResult` alias, and
//! the `lattice_err!`/`lattice_bail!`/`lattice_panic!` constructor macros
//! used across the workspace.

use std::fmt::Debug;

use thiserror::Error;

/// The top-level error type for all Lattice operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LatticeError {
    /// A caller-supplied argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A result budget was set or read incorrectly.
    #[error("budget error: {0}")]
    Budget(String),
    /// A range or subarray disagrees with the dimension domain.
    #[error("domain error: {0}")]
    Domain(String),
    /// An internal partitioner invariant was violated. Unreachable in
    /// correct use; treat as a bug.
    #[error("partitioner invariant violated: {0}")]
    Partitioner(String),
    /// Result-size estimation failed. The triggering call left its state
    /// unchanged and may be retried.
    #[error("estimation failed: {0}")]
    Estimation(String),
    /// A virtual filesystem operation failed.
    #[error("vfs error: {0}")]
    Vfs(String),
    /// An OS-level I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A [`Result`] with a [`LatticeError`] error type.
pub type LatticeResult<T> = Result<T, LatticeError>;

/// Construct a [`LatticeError`], optionally naming the variant:
/// `lattice_err!("bad {}", x)` produces `InvalidArgument`,
/// `lattice_err!(Domain: "bad {}", x)` produces `Domain`.
#[macro_export]
macro_rules! lattice_err {
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::LatticeError::$variant(format!($fmt $(, $arg)*))
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::LatticeError::InvalidArgument(format!($fmt $(, $arg)*))
    };
}

/// Return early with a [`LatticeError`]; arguments as for [`lattice_err!`].
#[macro_export]
macro_rules! lattice_bail {
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {
        return Err($crate::lattice_err!($variant: $fmt $(, $arg)*))
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        return Err($crate::lattice_err!($fmt $(, $arg)*))
    };
}

/// Panic for states that are unreachable unless an invariant is broken.
#[macro_export]
macro_rules! lattice_panic {
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        panic!("lattice invariant violation: {}", format!($fmt $(, $arg)*))
    };
}

/// Extension trait to unwrap with a [`lattice_panic!`] message instead of
/// the default panic payload.
pub trait LatticeExpect {
    /// The unwrapped type.
    type Output;

    /// Unwrap, panicking with `msg` on failure.
    fn lattice_expect(self, msg: &str) -> Self::Output;
}

impl<T> LatticeExpect for Option<T> {
    type Output = T;

    fn lattice_expect(self, msg: &str) -> T {
        match self {
            Some(v) => v,
            None => lattice_panic!("{}", msg),
        }
    }
}

impl<T> LatticeExpect for LatticeResult<T> {
    type Output = T;

    fn lattice_expect(self, msg: &str) -> T {
        match self {
            Ok(v) => v,
            Err(e) => lattice_panic!("{}: {}", msg, e),
        }
    }
}

/// Extension trait to unwrap results whose error is convertible to
/// [`LatticeError`].
pub trait LatticeUnwrap {
    /// The unwrapped type.
    type Output;

    /// Unwrap, panicking with the converted error on failure.
    fn lattice_unwrap(self) -> Self::Output;
}

impl<T, E: Into<LatticeError> + Debug> LatticeUnwrap for Result<T, E> {
    type Output = T;

    fn lattice_unwrap(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => lattice_panic!("{:?}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn err_macro_default_variant() {
        let e = lattice_err!("field {} missing", "a");
        assert!(matches!(e, LatticeError::InvalidArgument(_)));
        assert_eq!(e.to_string(), "invalid argument: field a missing");
    }

    #[test]
    fn err_macro_named_variant() {
        let e = lattice_err!(Budget: "no budget for {}", "a");
        assert!(matches!(e, LatticeError::Budget(_)));
    }

    fn bails() -> LatticeResult<()> {
        lattice_bail!(Domain: "lo {} > hi {}", 3, 1)
    }

    #[test]
    fn bail_macro() {
        assert!(matches!(bails(), Err(LatticeError::Domain(_))));
    }

    #[test]
    #[should_panic(expected = "lattice invariant violation")]
    fn expect_panics() {
        Option::<u8>::None.lattice_expect("empty");
    }

    #[test]
    fn unwrap_converts_errors() {
        let ok: Result<u8, std::io::Error> = Ok(3);
        assert_eq!(ok.lattice_unwrap(), 3);
    }
}
