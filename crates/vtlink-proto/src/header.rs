//! Fixed 12-byte message header.
//!
//! Every message on the wire starts with the same header, serialized as raw
//! big-endian binary. Fields are stored as byte arrays so the struct can be
//! cast directly from untrusted network bytes without alignment hazards.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    errors::{ProtocolError, Result},
    message::MsgType,
};

/// Message header: `{magic: u32, version: u16, type: u16, length: u32}`,
/// big-endian.
///
/// `length` names the payload bytes that immediately follow the header and is
/// authoritative for framing. Parsing rejects anything whose magic or version
/// does not match exactly.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct MsgHeader {
    magic: [u8; 4],
    version: [u8; 2],
    msg_type: [u8; 2],
    length: [u8; 4],
}

impl MsgHeader {
    /// Size of the serialized header.
    pub const SIZE: usize = 12;

    /// Protocol magic, `"VTR1"` in ASCII.
    pub const MAGIC: u32 = 0x5654_5231;

    /// Current protocol version.
    pub const VERSION: u16 = 1;

    /// Create a header for an outgoing message.
    #[must_use]
    pub fn new(msg_type: MsgType, length: u32) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION.to_be_bytes(),
            msg_type: msg_type.to_u16().to_be_bytes(),
            length: length.to_be_bytes(),
        }
    }

    /// Parse a header from network bytes.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::BufferTooSmall` if `src` holds fewer than 12 bytes
    /// - `ProtocolError::InvalidMagic` if the magic does not match
    /// - `ProtocolError::UnsupportedVersion` if the version does not match
    pub fn parse(src: &[u8]) -> Result<Self> {
        let header = Self::ref_from_prefix(src)
            .map_err(|_| ProtocolError::BufferTooSmall { expected: Self::SIZE, actual: src.len() })?
            .0;

        if header.magic() != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic(header.magic()));
        }
        if header.version() != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version()));
        }

        Ok(*header)
    }

    /// Write the header into `dst`, returning the bytes written (always 12).
    ///
    /// # Errors
    ///
    /// `ProtocolError::BufferTooSmall` if `dst` holds fewer than 12 bytes;
    /// `dst` is untouched in that case.
    pub fn write_to(&self, dst: &mut [u8]) -> Result<usize> {
        if dst.len() < Self::SIZE {
            return Err(ProtocolError::BufferTooSmall { expected: Self::SIZE, actual: dst.len() });
        }
        dst[..Self::SIZE].copy_from_slice(self.as_bytes());
        Ok(Self::SIZE)
    }

    /// Serialize to a fixed array.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Protocol magic as read from the wire.
    #[must_use]
    pub fn magic(&self) -> u32 {
        u32::from_be_bytes(self.magic)
    }

    /// Protocol version as read from the wire.
    #[must_use]
    pub fn version(&self) -> u16 {
        u16::from_be_bytes(self.version)
    }

    /// Raw message type. May fall outside [`MsgType`]; unknown types are
    /// dropped by sessions rather than treated as fatal.
    #[must_use]
    pub fn msg_type(&self) -> u16 {
        u16::from_be_bytes(self.msg_type)
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn length(&self) -> u32 {
        u32::from_be_bytes(self.length)
    }
}

impl std::fmt::Debug for MsgHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MsgHeader")
            .field("magic", &format_args!("{:#010x}", self.magic()))
            .field("version", &self.version())
            .field("msg_type", &crate::message::type_name(self.msg_type()))
            .field("length", &self.length())
            .finish()
    }
}
