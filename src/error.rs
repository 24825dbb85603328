//! Unified error type for padlink.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging.

use core::fmt;

/// Top-level error type used across the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // Codec
    /// Frame or buffer size does not fit the codec's declared frame length.
    InvalidLength { expected: usize, actual: usize },

    /// A field holds a value wider than the family's declared bit width.
    OutOfRange,

    /// Caller handed in a buffer smaller than any valid frame.
    ContractViolation,

    // Connection
    /// Retry budget exhausted without a link.
    ConnectFailure,

    /// The stack already tracks its maximum number of connections.
    TooManyConnections,

    /// Service discovery, read or subscribe failed after connecting.
    SetupFailed,

    /// A write was requested while no controller is connected.
    NoActiveConnection,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidLength { expected, actual } => {
                write!(f, "invalid frame length {actual}, expected {expected}")
            }
            Error::OutOfRange => f.write_str("value exceeds the declared field width"),
            Error::ContractViolation => f.write_str("buffer smaller than the minimum frame"),
            Error::ConnectFailure => f.write_str("connection retries exhausted"),
            Error::TooManyConnections => f.write_str("connection limit reached"),
            Error::SetupFailed => f.write_str("post-connect setup failed"),
            Error::NoActiveConnection => f.write_str("no active connection"),
        }
    }
}
