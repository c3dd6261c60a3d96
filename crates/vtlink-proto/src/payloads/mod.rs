//! Typed payload builders and parsers.
//!
//! Each message type has a canonical byte layout built from the primitives in
//! [`crate::buf`]. Builders reset the caller-supplied [`WBuf`] and emit the
//! complete payload; parsers consume a payload slice and produce a borrowed
//! view that lives no longer than the slice.
//!
//! Both directions of every payload are covered. The client only ever builds
//! HELLO/CONFIGURE/FRAME/PACKET and parses the rest, but the server-direction
//! builders are what mock servers and fuzz targets are made of.

pub mod frame;
pub mod packet;

use crate::{
    buf::{RBuf, WBuf},
    errors::{ProtocolError, Result},
};

/// Bit 0 of FRAME and PACKET `flags`: the payload is a keyframe.
pub const FLAG_KEYFRAME: u32 = 1;

/// Build a HELLO payload: four length-prefixed strings.
pub fn hello(
    b: &mut WBuf,
    token: &str,
    requested_codec: &str,
    client_name: &str,
    client_build_id: &str,
) -> Result<()> {
    b.reset();
    b.put_str(token)?;
    b.put_str(requested_codec)?;
    b.put_str(client_name)?;
    b.put_str(client_build_id)?;
    Ok(())
}

/// Parsed HELLO payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloView<'a> {
    /// Opaque authentication credential; empty means none.
    pub token: &'a [u8],
    /// Codec the client wants, e.g. `"h264"`.
    pub requested_codec: &'a [u8],
    /// Client software name.
    pub client_name: &'a [u8],
    /// Client build identifier.
    pub client_build_id: &'a [u8],
}

impl<'a> HelloView<'a> {
    /// Parse a HELLO payload.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let mut r = RBuf::new(payload);
        Ok(Self {
            token: r.read_str()?,
            requested_codec: r.read_str()?,
            client_name: r.read_str()?,
            client_build_id: r.read_str()?,
        })
    }
}

/// Arguments for building a HELLO_ACK payload.
#[derive(Debug, Clone, Default)]
pub struct HelloAckParams<'a> {
    /// 0 accepts the session; anything else refuses it.
    pub status: u8,
    /// Server software name.
    pub server_name: &'a str,
    /// Server version string.
    pub server_version: &'a str,
    /// Capability strings.
    pub caps: &'a [&'a str],
    /// Sessions the server will accept in total.
    pub max_sessions: u16,
    /// Sessions currently active.
    pub active: u16,
}

/// Build a HELLO_ACK payload.
pub fn hello_ack(b: &mut WBuf, p: &HelloAckParams<'_>) -> Result<()> {
    let cap_count = u8::try_from(p.caps.len())
        .map_err(|_| ProtocolError::CountOverflow { field: "capability", count: p.caps.len() })?;
    b.reset();
    b.put_u8(p.status);
    b.put_str(p.server_name)?;
    b.put_str(p.server_version)?;
    b.put_u8(cap_count);
    for cap in p.caps {
        b.put_str(cap)?;
    }
    b.put_u16(p.max_sessions);
    b.put_u16(p.active);
    Ok(())
}

/// Parsed HELLO_ACK payload.
///
/// Only `status` is mandatory. Servers may truncate after it, so the trailing
/// fields are read best-effort and default to empty/zero when absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloAckView<'a> {
    /// 0 means accepted.
    pub status: u8,
    /// Server software name; empty if not reported.
    pub server_name: &'a [u8],
    /// Server version; empty if not reported.
    pub server_version: &'a [u8],
    /// Capability strings.
    pub caps: Vec<&'a [u8]>,
    /// Session capacity; 0 if not reported.
    pub max_sessions: u16,
    /// Sessions currently active; 0 if not reported.
    pub active: u16,
}

impl<'a> HelloAckView<'a> {
    /// Parse a HELLO_ACK payload.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let mut r = RBuf::new(payload);
        let mut view = Self {
            status: r.read_u8()?,
            server_name: &[],
            server_version: &[],
            caps: Vec::new(),
            max_sessions: 0,
            active: 0,
        };

        let Ok(name) = r.read_str() else { return Ok(view) };
        view.server_name = name;
        let Ok(version) = r.read_str() else { return Ok(view) };
        view.server_version = version;
        let Ok(cap_count) = r.read_u8() else { return Ok(view) };
        for _ in 0..cap_count {
            let Ok(cap) = r.read_str() else { return Ok(view) };
            view.caps.push(cap);
        }
        if let Ok(v) = r.read_u16() {
            view.max_sessions = v;
        }
        if let Ok(v) = r.read_u16() {
            view.active = v;
        }
        Ok(view)
    }
}

/// Arguments for building a CONFIGURE payload.
#[derive(Debug, Clone)]
pub struct ConfigureParams<'a> {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Wire pixel format code (1 = NV12, 2 = P010LE).
    pub pix_fmt: u8,
    /// Time base as numerator/denominator.
    pub time_base: (u32, u32),
    /// Frame rate as numerator/denominator.
    pub frame_rate: (u32, u32),
    /// Key/value option pairs, serialized in order.
    pub options: &'a [(String, String)],
    /// Codec configuration blob; empty for encoders.
    pub extradata: &'a [u8],
}

/// Build a CONFIGURE payload.
pub fn configure(b: &mut WBuf, p: &ConfigureParams<'_>) -> Result<()> {
    let opt_count = u16::try_from(p.options.len())
        .map_err(|_| ProtocolError::CountOverflow { field: "option", count: p.options.len() })?;
    let extradata_len = u32::try_from(p.extradata.len()).map_err(|_| {
        ProtocolError::CountOverflow { field: "extradata length", count: p.extradata.len() }
    })?;

    b.reset();
    b.put_u32(p.width);
    b.put_u32(p.height);
    b.put_u8(p.pix_fmt);
    b.put_u32(p.time_base.0);
    b.put_u32(p.time_base.1);
    b.put_u32(p.frame_rate.0);
    b.put_u32(p.frame_rate.1);
    b.put_u16(opt_count);
    for (key, value) in p.options {
        b.put_str(key)?;
        b.put_str(value)?;
    }
    b.put_u32(extradata_len);
    b.put_bytes(p.extradata);
    Ok(())
}

/// Parsed CONFIGURE payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureView<'a> {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Wire pixel format code.
    pub pix_fmt: u8,
    /// Time base as numerator/denominator.
    pub time_base: (u32, u32),
    /// Frame rate as numerator/denominator.
    pub frame_rate: (u32, u32),
    /// Key/value option pairs in wire order.
    pub options: Vec<(&'a [u8], &'a [u8])>,
    /// Codec configuration blob; may be empty.
    pub extradata: &'a [u8],
}

impl<'a> ConfigureView<'a> {
    /// Parse a CONFIGURE payload.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let mut r = RBuf::new(payload);
        let width = r.read_u32()?;
        let height = r.read_u32()?;
        let pix_fmt = r.read_u8()?;
        let time_base = (r.read_u32()?, r.read_u32()?);
        let frame_rate = (r.read_u32()?, r.read_u32()?);
        let opt_count = r.read_u16()?;
        let mut options = Vec::with_capacity(usize::from(opt_count));
        for _ in 0..opt_count {
            let key = r.read_str()?;
            let value = r.read_str()?;
            options.push((key, value));
        }
        let extradata_len = r.read_u32()? as usize;
        if extradata_len > r.remaining() {
            return Err(ProtocolError::LengthOverrun {
                declared: extradata_len,
                remaining: r.remaining(),
            });
        }
        let extradata = r.read_bytes(extradata_len)?;
        Ok(Self { width, height, pix_fmt, time_base, frame_rate, options, extradata })
    }
}

/// Arguments for building a CONFIGURE_ACK payload.
#[derive(Debug, Clone, Default)]
pub struct ConfigureAckParams<'a> {
    /// 0 accepts the configuration.
    pub status: u8,
    /// Codec configuration in native container form (avcC/hvcC).
    pub extra: &'a [u8],
    /// Pixel format the server will actually produce; 0 leaves the client's
    /// choice in place.
    pub reported_pix_fmt: u8,
    /// Warning strings to surface on the client.
    pub warnings: &'a [&'a str],
}

/// Build a CONFIGURE_ACK payload.
pub fn configure_ack(b: &mut WBuf, p: &ConfigureAckParams<'_>) -> Result<()> {
    let extra_len = u16::try_from(p.extra.len())
        .map_err(|_| ProtocolError::CountOverflow { field: "extradata length", count: p.extra.len() })?;
    let warn_count = u8::try_from(p.warnings.len())
        .map_err(|_| ProtocolError::CountOverflow { field: "warning", count: p.warnings.len() })?;
    b.reset();
    b.put_u8(p.status);
    b.put_u16(extra_len);
    b.put_bytes(p.extra);
    b.put_u8(p.reported_pix_fmt);
    b.put_u8(warn_count);
    for warning in p.warnings {
        b.put_str(warning)?;
    }
    Ok(())
}

/// Parsed CONFIGURE_ACK payload.
///
/// `status` is mandatory and the extradata length is validated strictly; the
/// remaining fields are read best-effort like [`HelloAckView`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureAckView<'a> {
    /// 0 means the configuration was accepted.
    pub status: u8,
    /// Codec configuration blob; empty if absent.
    pub extra: &'a [u8],
    /// Server-reported pixel format code; 0 if absent.
    pub reported_pix_fmt: u8,
    /// Warning strings.
    pub warnings: Vec<&'a [u8]>,
}

impl<'a> ConfigureAckView<'a> {
    /// Parse a CONFIGURE_ACK payload.
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        let mut r = RBuf::new(payload);
        let mut view = Self {
            status: r.read_u8()?,
            extra: &[],
            reported_pix_fmt: 0,
            warnings: Vec::new(),
        };

        let Ok(extra_len) = r.read_u16() else { return Ok(view) };
        let extra_len = usize::from(extra_len);
        if extra_len > 0 {
            if extra_len > r.remaining() {
                return Err(ProtocolError::LengthOverrun {
                    declared: extra_len,
                    remaining: r.remaining(),
                });
            }
            view.extra = r.read_bytes(extra_len)?;
        }
        if let Ok(pix) = r.read_u8() {
            view.reported_pix_fmt = pix;
        }
        let Ok(warn_count) = r.read_u8() else { return Ok(view) };
        for _ in 0..warn_count {
            let Ok(warning) = r.read_str() else { return Ok(view) };
            view.warnings.push(warning);
        }
        Ok(view)
    }
}

/// Build an ERROR payload: u32 code plus a message string.
pub fn error(b: &mut WBuf, code: u32, message: &str) -> Result<()> {
    b.reset();
    b.put_u32(code);
    b.put_str(message)?;
    Ok(())
}

/// Parsed ERROR payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorView<'a> {
    /// Server-defined error code; 0 if the payload was too short to carry
    /// one.
    pub code: u32,
    /// Error text; empty if absent.
    pub message: &'a [u8],
}

impl<'a> ErrorView<'a> {
    /// Parse an ERROR payload. Infallible: a truncated payload degrades to
    /// code 0 with an empty message, since this only feeds logging.
    #[must_use]
    pub fn parse(payload: &'a [u8]) -> Self {
        let mut r = RBuf::new(payload);
        let code = r.read_u32().unwrap_or_default();
        let message = r.read_str().unwrap_or_default();
        Self { code, message }
    }
}
