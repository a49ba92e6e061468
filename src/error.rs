//! # Error Handling
//!
//! Recoverable allocation failures are surfaced as values; contract
//! violations (misaligned or out-of-range requests, zero sizes) are caller
//! bugs and panic instead.

use core::fmt;

/// Crate result type alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Recoverable allocation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// No free region is large enough for the request.
    OutOfSpace,
    /// The requested fixed address range is occupied or not fully free.
    RangeUnavailable,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfSpace => write!(f, "no free region large enough"),
            Self::RangeUnavailable => write!(f, "requested address range unavailable"),
        }
    }
}
