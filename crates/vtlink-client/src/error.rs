//! Session-level error type.
//!
//! This is the error surface the embedding framework sees. Structural codec
//! errors from `vtlink-proto` are folded in at the boundary: lengths that do
//! not fit their wire fields are caller mistakes, while peer-declared lengths
//! that do not match the bytes on the wire are protocol violations.

use thiserror::Error;
use vtlink_proto::ProtocolError;

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors surfaced to the embedding framework.
///
/// Nothing here is retried internally except `EINTR` on the socket and
/// unknown message types, which are dropped; everything else propagates and
/// the session never reconnects on its own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The caller supplied something malformed: a bad `host:port`, an
    /// oversize string, an unsupported pixel format, an undersized plane.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The peer violated the protocol: bad framing, unexpected message type
    /// for the phase, declared lengths that overrun the payload.
    #[error("protocol violation: {0}")]
    InvalidData(String),

    /// The server refused the HELLO credentials.
    #[error("server refused session: status {0}")]
    PermissionDenied(u8),

    /// A requested feature exists in the option space but not in this
    /// client.
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    /// Socket or resolver failure, a mid-message timeout, or a fatal ERROR
    /// message from the peer.
    #[error("i/o failure: {0}")]
    Io(String),

    /// The peer finished the stream (DONE), closed the connection, or the
    /// session was already drained.
    #[error("end of stream")]
    EndOfStream,

    /// No output was available within the receive timeout; retry later.
    #[error("no output available yet")]
    WouldBlock,

    /// A bounded resource filled up (packet queue overflow).
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The compression library failed outright.
    #[error("compression failure: {0}")]
    ExternalLibrary(String),
}

impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidMagic(_)
            | ProtocolError::UnsupportedVersion(_)
            | ProtocolError::LengthOverrun { .. }
            | ProtocolError::TooManyPlanes(_) => Self::InvalidData(err.to_string()),
            ProtocolError::BufferTooSmall { .. }
            | ProtocolError::ShortRead { .. }
            | ProtocolError::StringTooLong(_)
            | ProtocolError::CountOverflow { .. }
            | ProtocolError::PayloadTooShort { .. } => Self::InvalidArgument(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_faults_map_to_invalid_data() {
        let err: SessionError = ProtocolError::InvalidMagic(0).into();
        assert!(matches!(err, SessionError::InvalidData(_)));

        let err: SessionError =
            ProtocolError::LengthOverrun { declared: 10, remaining: 2 }.into();
        assert!(matches!(err, SessionError::InvalidData(_)));
    }

    #[test]
    fn caller_faults_map_to_invalid_argument() {
        let err: SessionError = ProtocolError::StringTooLong(70_000).into();
        assert!(matches!(err, SessionError::InvalidArgument(_)));

        let err: SessionError = ProtocolError::ShortRead { requested: 4, remaining: 1 }.into();
        assert!(matches!(err, SessionError::InvalidArgument(_)));
    }
}
