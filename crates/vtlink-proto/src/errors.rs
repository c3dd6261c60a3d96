//! Structural errors for the wire codec.
//!
//! Every error here describes a framing problem: either the caller handed us
//! a buffer that cannot hold the requested operation, or the peer declared
//! lengths that do not fit the bytes it actually sent. Session-level policy
//! (authentication, flow control, I/O) lives in the client crate.

use thiserror::Error;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced by header, buffer, and payload codecs.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// Destination buffer cannot hold the value being written.
    #[error("buffer too small: need {expected} bytes, have {actual}")]
    BufferTooSmall {
        /// Bytes the operation requires.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// Read past the end of a borrowed buffer. The cursor is left where it
    /// was before the failing read.
    #[error("short read: {requested} bytes requested, {remaining} remaining")]
    ShortRead {
        /// Bytes the read requested.
        requested: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// Header magic does not identify this protocol.
    #[error("invalid magic {0:#010x}")]
    InvalidMagic(u32),

    /// Header names a protocol version we do not speak.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u16),

    /// String exceeds the u16 length prefix domain.
    #[error("string of {0} bytes exceeds the u16 length prefix")]
    StringTooLong(usize),

    /// A count or length field does not fit its wire representation.
    #[error("{field} count {count} does not fit the wire field")]
    CountOverflow {
        /// Which field overflowed.
        field: &'static str,
        /// The offending count.
        count: usize,
    },

    /// Peer declared a length that runs past the end of the payload.
    #[error("declared length {declared} exceeds {remaining} remaining payload bytes")]
    LengthOverrun {
        /// Length the peer declared.
        declared: usize,
        /// Bytes actually remaining.
        remaining: usize,
    },

    /// Payload is shorter than the fixed fields of its message type.
    #[error("payload too short: {actual} bytes, need at least {expected}")]
    PayloadTooShort {
        /// Minimum size for this message type.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// FRAME payload declared more planes than the format allows.
    #[error("plane count {0} exceeds the 4-plane limit")]
    TooManyPlanes(u8),
}
