//! Client sessions for the VTR1 remote-codec protocol.
//!
//! This crate drives a remote accelerator over one blocking TCP connection
//! per session: a two-phase handshake (HELLO, CONFIGURE), then a pipelined
//! full-duplex streaming loop bounded by the configured in-flight window.
//! [`Encoder`] pushes raw NV12/P010LE frames and pulls encoded packets;
//! [`Decoder`] pushes packets and pulls frames.
//!
//! Sessions are single-threaded and self-contained: one socket, one reusable
//! payload buffer, two compression scratch buffers, and (for encoders) one
//! bounded packet queue. Nothing is shared between sessions, so independent
//! sessions can run on independent threads.
//!
//! The wire format itself lives in [`vtlink_proto`].

#![forbid(unsafe_code)]

mod compress;
mod config;
mod decoder;
mod encoder;
mod error;
mod extradata;
mod session;
mod transport;

pub use config::{
    Codec, CodecOptions, DecoderConfig, EncoderConfig, INFLIGHT_DEFAULT, INFLIGHT_MAX,
    INFLIGHT_MIN, PixelFormat, TIMEOUT_MS_DEFAULT, TIMEOUT_MS_MAX, TIMEOUT_MS_MIN,
    WireCompression,
};
pub use decoder::{Decoder, PacketRef, VideoFrame, VideoPlane};
pub use encoder::{EncodedPacket, Encoder, PlaneRef, RawFrame};
pub use error::{Result, SessionError};
pub use session::ServerInfo;
pub use vtlink_proto::payloads::frame::SideData;
