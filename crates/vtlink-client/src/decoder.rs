//! Decoder session: encoded packets out, raw frames back.
//!
//! Mirrors the encoder with the directions swapped. The notable difference
//! is the non-blocking pull: when the receive timeout expires before a new
//! message starts, the decoder reports "no frame yet" instead of failing, and
//! the framework simply retries.

use std::time::Instant;

use vtlink_proto::{
    MsgHeader, MsgType, WBuf,
    payloads::{self, FLAG_KEYFRAME, frame::FrameView},
};

use crate::{
    compress,
    config::{DecoderConfig, PixelFormat},
    error::{Result, SessionError},
    session::{self, HandshakeParams, ServerInfo},
    transport::{self, Connection},
};

/// An encoded packet offered to the decoder. Borrowed; serialized straight
/// into the session's payload buffer.
#[derive(Debug, Clone, Copy)]
pub struct PacketRef<'a> {
    /// Encoded bitstream bytes.
    pub data: &'a [u8],
    /// Presentation timestamp; `None` becomes 0 on the wire.
    pub pts: Option<i64>,
    /// Decode timestamp; `None` follows the pts.
    pub dts: Option<i64>,
    /// Packet duration; negative values are clamped to 0.
    pub duration: i64,
    /// The packet starts a new GOP.
    pub keyframe: bool,
}

/// One owned plane of decoded video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoPlane {
    /// Plane bytes, `stride * rows` of them.
    pub data: Vec<u8>,
    /// Bytes per row.
    pub stride: usize,
}

/// A decoded frame, owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// Presentation timestamp.
    pub pts: i64,
    /// Frame duration in time-base units.
    pub duration: i64,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format of the planes.
    pub format: PixelFormat,
    /// Luma and interleaved-chroma planes.
    pub planes: [VideoPlane; 2],
}

/// A connected decoder session.
pub struct Decoder {
    conn: Connection,
    config: DecoderConfig,
    server: ServerInfo,
    pixel_format: PixelFormat,
    payload_buf: WBuf,
    scratch: [Vec<u8>; 2],
    flushing: bool,
    done: bool,
    packets_sent: u64,
    frames_recv: u64,
    started: Instant,
}

impl Decoder {
    /// Connect to the server and run the handshake.
    ///
    /// The session's pixel format starts as configured and is overridden by
    /// the server's CONFIGURE_ACK report when that names a format we know.
    pub fn connect(config: DecoderConfig) -> Result<Self> {
        config.validate()?;
        let mut conn = transport::connect(&config.host, config.timeout())?;
        let (server, reply) = session::handshake(
            &mut conn,
            &HandshakeParams {
                token: &config.token,
                codec: config.codec,
                width: config.width,
                height: config.height,
                pixel_format: config.pixel_format,
                time_base: config.time_base,
                frame_rate: config.frame_rate,
                options: config.wire_options(),
                extradata: &config.extradata,
            },
        )?;

        let mut pixel_format = config.pixel_format;
        if let Some(reported) = PixelFormat::from_wire(reply.reported_pix_fmt) {
            pixel_format = reported;
        }

        tracing::debug!(
            host = %config.host,
            codec = config.codec.wire_name(),
            ?pixel_format,
            "decoder session established"
        );

        Ok(Self {
            conn,
            config,
            server,
            pixel_format,
            payload_buf: WBuf::new(),
            scratch: [Vec::new(), Vec::new()],
            flushing: false,
            done: false,
            packets_sent: 0,
            frames_recv: 0,
            started: Instant::now(),
        })
    }

    /// Identity the server reported in HELLO_ACK.
    #[must_use]
    pub fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    /// Output pixel format, after any CONFIGURE_ACK override.
    #[must_use]
    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Send one packet, or start draining when `packet` is `None` or empty.
    ///
    /// The first drain call sends FLUSH; further ones are no-ops.
    pub fn send_packet(&mut self, packet: Option<&PacketRef<'_>>) -> Result<()> {
        if self.done {
            return Err(SessionError::EndOfStream);
        }
        match packet {
            Some(p) if !p.data.is_empty() => {
                let pts = p.pts.unwrap_or(0);
                let dts = p.dts.unwrap_or(pts);
                let duration = p.duration.max(0);
                let flags = if p.keyframe { FLAG_KEYFRAME } else { 0 };
                payloads::packet::packet(&mut self.payload_buf, pts, dts, duration, flags, p.data)?;
                self.conn.send(MsgType::Packet, self.payload_buf.as_slice())?;
                self.packets_sent += 1;
            },
            _ => {
                if !self.flushing {
                    self.flushing = true;
                    self.conn.send(MsgType::Flush, &[])?;
                }
            },
        }
        Ok(())
    }

    /// Receive the next frame, draining the message loop until one arrives,
    /// the stream ends, or the receive timeout expires with no message
    /// started (`WouldBlock`).
    pub fn receive_frame(&mut self) -> Result<VideoFrame> {
        if self.done {
            return Err(SessionError::EndOfStream);
        }
        loop {
            let (header, payload) = self.conn.recv()?;
            match MsgType::from_u16(header.msg_type()) {
                Some(MsgType::Frame) => {
                    let view = FrameView::parse(&payload)?;
                    let frame = self.assemble_frame(&view)?;
                    self.frames_recv += 1;
                    return Ok(frame);
                },
                Some(MsgType::Done) => {
                    self.done = true;
                    return Err(SessionError::EndOfStream);
                },
                Some(MsgType::Ping) => session::reply_pong(&mut self.conn)?,
                Some(MsgType::Error) => return Err(session::server_error(&payload)),
                _ => self.drop_unknown(&header),
            }
        }
    }

    /// One step of the combined decode loop.
    ///
    /// Sends the packet (or FLUSH once when draining), then pulls. `Ok(None)`
    /// means nothing was ready within the timeout; the caller retries.
    pub fn decode(&mut self, packet: Option<&PacketRef<'_>>) -> Result<Option<VideoFrame>> {
        if self.done {
            return Err(SessionError::EndOfStream);
        }
        self.send_packet(packet)?;
        match self.receive_frame() {
            Ok(frame) => Ok(Some(frame)),
            Err(SessionError::WouldBlock) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Copy a parsed frame into owned planes, decompressing first when the
    /// session negotiated LZ4.
    ///
    /// Rows are copied at `min(src_stride, dst_stride)` bytes each, so a
    /// server that pads its strides interoperates with our tightly-packed
    /// output.
    fn assemble_frame(&mut self, view: &FrameView<'_>) -> Result<VideoFrame> {
        if view.planes.len() < 2 {
            return Err(SessionError::InvalidData(format!(
                "frame carries {} planes, need 2",
                view.planes.len()
            )));
        }

        let lz4 = self.config.compression == crate::config::WireCompression::Lz4;
        let bytes_per_sample = self.pixel_format.bytes_per_sample();
        let dst_stride = self.config.width as usize * bytes_per_sample;
        let dst_heights = [self.config.height as usize, self.config.height as usize / 2];

        let mut planes: [VideoPlane; 2] = [
            VideoPlane { data: vec![0; dst_stride * dst_heights[0]], stride: dst_stride },
            VideoPlane { data: vec![0; dst_stride * dst_heights[1]], stride: dst_stride },
        ];

        for i in 0..2 {
            let src_plane = &view.planes[i];
            let src_stride = src_plane.stride as usize;

            let src: &[u8] = if lz4 {
                let expected = src_stride
                    .checked_mul(src_plane.height as usize)
                    .filter(|n| *n > 0)
                    .ok_or_else(|| {
                        SessionError::InvalidData(format!(
                            "plane {i} declares degenerate geometry {}x{}",
                            src_plane.stride, src_plane.height
                        ))
                    })?;
                compress::decompress_plane(src_plane.data, expected, &mut self.scratch[i])?;
                &self.scratch[i]
            } else {
                src_plane.data
            };

            let rows = (src_plane.height as usize).min(dst_heights[i]);
            let row_bytes = src_stride.min(dst_stride);
            let required = rows
                .saturating_sub(1)
                .checked_mul(src_stride)
                .and_then(|n| n.checked_add(row_bytes))
                .ok_or_else(|| {
                    SessionError::InvalidData(format!(
                        "plane {i} declares degenerate geometry {}x{}",
                        src_plane.stride, src_plane.height
                    ))
                })?;
            if rows > 0 && src.len() < required {
                return Err(SessionError::InvalidData(format!(
                    "plane {i} holds {} bytes, stride layout needs {required}",
                    src.len()
                )));
            }
            for y in 0..rows {
                planes[i].data[y * dst_stride..y * dst_stride + row_bytes]
                    .copy_from_slice(&src[y * src_stride..y * src_stride + row_bytes]);
            }
        }

        Ok(VideoFrame {
            pts: view.pts,
            duration: view.duration,
            width: self.config.width,
            height: self.config.height,
            format: self.pixel_format,
            planes,
        })
    }

    fn drop_unknown(&self, header: &MsgHeader) {
        tracing::debug!(
            msg_type = header.msg_type(),
            length = header.length(),
            "dropping unexpected message"
        );
    }
}

impl Drop for Decoder {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = |bytes: u64| {
            if elapsed > 0.0 { bytes as f64 * 8.0 / (elapsed * 1_000_000.0) } else { 0.0 }
        };
        tracing::info!(
            packets = self.packets_sent,
            frames = self.frames_recv,
            bytes_out = self.conn.bytes_sent,
            bytes_in = self.conn.bytes_recv,
            elapsed_s = elapsed,
            out_mbps = rate(self.conn.bytes_sent),
            in_mbps = rate(self.conn.bytes_recv),
            "decoder session closed"
        );
    }
}
