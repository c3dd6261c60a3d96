//! Message types and whole-message assembly.

use crate::{
    errors::{ProtocolError, Result},
    header::MsgHeader,
};

/// Closed enumeration of protocol message types.
///
/// Values outside this enum may still arrive on the wire; sessions drop them
/// after consuming the payload so the stream stays framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MsgType {
    /// Client greeting carrying credentials and identity.
    Hello = 1,
    /// Server response to HELLO.
    HelloAck = 2,
    /// Session configuration from the client.
    Configure = 3,
    /// Server response to CONFIGURE.
    ConfigureAck = 4,
    /// One raw video frame.
    Frame = 5,
    /// One encoded packet.
    Packet = 6,
    /// End of input; the peer should drain.
    Flush = 7,
    /// No further output will follow.
    Done = 8,
    /// Fatal error report.
    Error = 9,
    /// Liveness probe.
    Ping = 10,
    /// Answer to PING.
    Pong = 11,
}

impl MsgType {
    /// Wire value of this type.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Decode a wire value. `None` for anything outside the enum.
    #[must_use]
    pub const fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(Self::Hello),
            2 => Some(Self::HelloAck),
            3 => Some(Self::Configure),
            4 => Some(Self::ConfigureAck),
            5 => Some(Self::Frame),
            6 => Some(Self::Packet),
            7 => Some(Self::Flush),
            8 => Some(Self::Done),
            9 => Some(Self::Error),
            10 => Some(Self::Ping),
            11 => Some(Self::Pong),
            _ => None,
        }
    }

    /// Short name for logging.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hello => "HELLO",
            Self::HelloAck => "HELLO_ACK",
            Self::Configure => "CONFIGURE",
            Self::ConfigureAck => "CONFIGURE_ACK",
            Self::Frame => "FRAME",
            Self::Packet => "PACKET",
            Self::Flush => "FLUSH",
            Self::Done => "DONE",
            Self::Error => "ERROR",
            Self::Ping => "PING",
            Self::Pong => "PONG",
        }
    }
}

/// Name a raw wire value for logging; `"UNKNOWN"` for anything outside the
/// enum.
#[must_use]
pub const fn type_name(raw: u16) -> &'static str {
    match MsgType::from_u16(raw) {
        Some(t) => t.name(),
        None => "UNKNOWN",
    }
}

/// Build a complete framed message: header followed by a copy of `payload`,
/// in one contiguous allocation.
///
/// # Errors
///
/// `ProtocolError::CountOverflow` if the payload does not fit the header's
/// u32 length field.
pub fn build_message(msg_type: MsgType, payload: &[u8]) -> Result<Vec<u8>> {
    let length = u32::try_from(payload.len())
        .map_err(|_| ProtocolError::CountOverflow { field: "payload length", count: payload.len() })?;
    let header = MsgHeader::new(msg_type, length);

    let mut buf = Vec::with_capacity(MsgHeader::SIZE + payload.len());
    buf.extend_from_slice(&header.to_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_wire_values() {
        assert_eq!(type_name(MsgType::Frame.to_u16()), "FRAME");
        assert_eq!(type_name(MsgType::Hello.to_u16()), "HELLO");
        assert_eq!(type_name(0), "UNKNOWN");
        assert_eq!(type_name(999), "UNKNOWN");
    }

    #[test]
    fn wire_values_round_trip() {
        for raw in 1..=11 {
            let t = MsgType::from_u16(raw).unwrap();
            assert_eq!(t.to_u16(), raw);
        }
        assert_eq!(MsgType::from_u16(0), None);
        assert_eq!(MsgType::from_u16(12), None);
    }

    #[test]
    fn build_message_frames_payload() {
        let msg = build_message(MsgType::Ping, &[1, 2, 3]).unwrap();
        assert_eq!(msg.len(), MsgHeader::SIZE + 3);

        let header = MsgHeader::parse(&msg).unwrap();
        assert_eq!(header.msg_type(), MsgType::Ping.to_u16());
        assert_eq!(header.length(), 3);
        assert_eq!(&msg[MsgHeader::SIZE..], &[1, 2, 3]);
    }

    #[test]
    fn build_message_empty_payload() {
        let msg = build_message(MsgType::Flush, &[]).unwrap();
        assert_eq!(msg.len(), MsgHeader::SIZE);
        assert_eq!(MsgHeader::parse(&msg).unwrap().length(), 0);
    }
}
