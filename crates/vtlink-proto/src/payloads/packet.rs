//! PACKET payload codec.
//!
//! Layout: `u64 pts, u64 dts, u64 duration, u32 flags, u32 data_len,
//! data_len bytes`.

use crate::{
    buf::{RBuf, WBuf},
    errors::{ProtocolError, Result},
};

/// Fixed fields before the data: pts + dts + duration + flags + data_len.
const FIXED_LEN: usize = 8 + 8 + 8 + 4 + 4;

/// Build a PACKET payload.
///
/// # Errors
///
/// `ProtocolError::CountOverflow` if `data` does not fit the u32 length
/// field.
pub fn packet(
    b: &mut WBuf,
    pts: i64,
    dts: i64,
    duration: i64,
    flags: u32,
    data: &[u8],
) -> Result<()> {
    let data_len = u32::try_from(data.len())
        .map_err(|_| ProtocolError::CountOverflow { field: "packet length", count: data.len() })?;
    b.reset();
    b.put_u64(pts as u64);
    b.put_u64(dts as u64);
    b.put_u64(duration as u64);
    b.put_u32(flags);
    b.put_u32(data_len);
    b.put_bytes(data);
    Ok(())
}

/// Parsed PACKET payload. Valid only while the backing payload buffer lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketView<'a> {
    /// Presentation timestamp.
    pub pts: i64,
    /// Decode timestamp.
    pub dts: i64,
    /// Packet duration in time-base units.
    pub duration: i64,
    /// Flag bits; see [`super::FLAG_KEYFRAME`].
    pub flags: u32,
    /// Encoded bitstream bytes.
    pub data: &'a [u8],
}

impl<'a> PacketView<'a> {
    /// Parse a PACKET payload.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooShort` below the 32-byte fixed minimum
    /// - `ProtocolError::LengthOverrun` when `data_len` runs past the end
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        if payload.len() < FIXED_LEN {
            return Err(ProtocolError::PayloadTooShort {
                expected: FIXED_LEN,
                actual: payload.len(),
            });
        }
        let mut r = RBuf::new(payload);
        let pts = r.read_u64()? as i64;
        let dts = r.read_u64()? as i64;
        let duration = r.read_u64()? as i64;
        let flags = r.read_u32()?;
        let data_len = r.read_u32()? as usize;
        if data_len > r.remaining() {
            return Err(ProtocolError::LengthOverrun { declared: data_len, remaining: r.remaining() });
        }
        let data = r.read_bytes(data_len)?;
        Ok(Self { pts, dts, duration, flags, data })
    }

    /// True if the keyframe flag bit is set.
    #[must_use]
    pub fn is_keyframe(&self) -> bool {
        self.flags & super::FLAG_KEYFRAME != 0
    }
}
