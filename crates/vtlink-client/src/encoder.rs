//! Encoder session: raw frames out, encoded packets back.
//!
//! The framework pushes frames one at a time and pulls packets. Sends and
//! receives share one socket and one thread; pipelining is bounded by
//! `max_inflight`, and once that bound is hit the session drains a packet
//! before accepting another frame.

use std::{collections::VecDeque, time::Instant};

use vtlink_proto::{
    MsgHeader, MsgType, WBuf,
    payloads::{
        FLAG_KEYFRAME,
        frame::{FramePlane, SideData},
        packet::PacketView,
    },
};

use crate::{
    compress,
    config::{Codec, EncoderConfig, PixelFormat, WireCompression},
    error::{Result, SessionError},
    extradata,
    session::{self, HandshakeParams, ServerInfo},
    transport::{self, Connection},
};

/// One plane of caller-owned raw frame data.
#[derive(Debug, Clone, Copy)]
pub struct PlaneRef<'a> {
    /// Plane bytes; must cover `stride * plane_height`.
    pub data: &'a [u8],
    /// Bytes per row.
    pub stride: u32,
}

/// A raw frame offered to the encoder. Borrowed; nothing is copied until the
/// payload is built.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    /// Presentation timestamp.
    pub pts: i64,
    /// Frame duration in time-base units.
    pub duration: i64,
    /// Ask the server for a keyframe.
    pub keyframe: bool,
    /// Pixel format of the plane data.
    pub pixel_format: PixelFormat,
    /// Luma and interleaved-chroma planes.
    pub planes: [PlaneRef<'a>; 2],
    /// Optional side-data blobs to attach.
    pub side_data: &'a [SideData<'a>],
}

/// An encoded packet returned by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    /// Presentation timestamp.
    pub pts: i64,
    /// Decode timestamp.
    pub dts: i64,
    /// Packet duration in time-base units.
    pub duration: i64,
    /// The packet starts a new GOP.
    pub keyframe: bool,
    /// Encoded bitstream bytes.
    pub data: Vec<u8>,
}

/// Fixed-capacity FIFO of decoded packets awaiting the framework.
#[derive(Debug)]
struct PacketQueue {
    slots: VecDeque<EncodedPacket>,
    capacity: usize,
}

impl PacketQueue {
    fn new(capacity: usize) -> Self {
        Self { slots: VecDeque::with_capacity(capacity), capacity }
    }

    fn push(&mut self, packet: EncodedPacket) -> Result<()> {
        if self.slots.len() == self.capacity {
            return Err(SessionError::ResourceExhausted(format!(
                "packet queue full ({} entries)",
                self.capacity
            )));
        }
        self.slots.push_back(packet);
        Ok(())
    }

    fn pop(&mut self) -> Option<EncodedPacket> {
        self.slots.pop_front()
    }
}

/// A connected encoder session.
#[derive(Debug)]
pub struct Encoder {
    conn: Connection,
    config: EncoderConfig,
    server: ServerInfo,
    extradata: Option<Vec<u8>>,
    payload_buf: WBuf,
    scratch: [Vec<u8>; 2],
    queue: PacketQueue,
    inflight: usize,
    peak_inflight: usize,
    flushing: bool,
    done: bool,
    frames_sent: u64,
    packets_recv: u64,
    started: Instant,
}

impl Encoder {
    /// Connect to the server and run the handshake.
    pub fn connect(config: EncoderConfig) -> Result<Self> {
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
                extradata: &[],
            },
        )?;

        let extradata = if reply.extra.is_empty() {
            None
        } else {
            Some(extradata::to_annex_b(config.codec, &reply.extra)?)
        };

        tracing::debug!(
            host = %config.host,
            codec = config.codec.wire_name(),
            max_inflight = config.max_inflight,
            "encoder session established"
        );

        let queue = PacketQueue::new(config.max_inflight.max(4));
        Ok(Self {
            conn,
            config,
            server,
            extradata,
            payload_buf: WBuf::new(),
            scratch: [Vec::new(), Vec::new()],
            queue,
            inflight: 0,
            peak_inflight: 0,
            flushing: false,
            done: false,
            frames_sent: 0,
            packets_recv: 0,
            started: Instant::now(),
        })
    }

    /// Identity the server reported in HELLO_ACK.
    #[must_use]
    pub fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    /// Codec configuration from CONFIGURE_ACK, reformatted to Annex-B.
    #[must_use]
    pub fn extradata(&self) -> Option<&[u8]> {
        self.extradata.as_deref()
    }

    /// Frames sent for which no packet has come back yet.
    #[must_use]
    pub fn inflight(&self) -> usize {
        self.inflight
    }

    /// Send one frame, or start draining when `frame` is `None`.
    ///
    /// The first `None` sends FLUSH; further `None` calls are no-ops so a
    /// framework that polls during drain does not spam the peer.
    pub fn send_frame(&mut self, frame: Option<&RawFrame<'_>>) -> Result<()> {
        if self.done {
            return Err(SessionError::EndOfStream);
        }
        let Some(frame) = frame else {
            if !self.flushing {
                self.flushing = true;
                self.conn.send(MsgType::Flush, &[])?;
            }
            return Ok(());
        };

        if self.config.codec == Codec::H264 && frame.pixel_format != PixelFormat::Nv12 {
            return Err(SessionError::InvalidArgument(
                "h264 sessions support NV12 only".to_string(),
            ));
        }

        let heights = [self.config.height, self.config.height / 2];
        let mut sizes = [0usize; 2];
        for i in 0..2 {
            sizes[i] = (frame.planes[i].stride as usize)
                .checked_mul(heights[i] as usize)
                .ok_or_else(|| {
                    SessionError::InvalidArgument(format!(
                        "plane {i} stride {} overflows the frame layout",
                        frame.planes[i].stride
                    ))
                })?;
            if frame.planes[i].data.len() < sizes[i] {
                return Err(SessionError::InvalidArgument(format!(
                    "plane {i} holds {} bytes, stride layout needs {}",
                    frame.planes[i].data.len(),
                    sizes[i]
                )));
            }
        }

        let flags = if frame.keyframe { FLAG_KEYFRAME } else { 0 };
        let compression = self.config.compression;
        let Self { conn, payload_buf, scratch, .. } = self;

        let mut planes = [
            FramePlane {
                stride: frame.planes[0].stride,
                height: heights[0],
                data: &frame.planes[0].data[..sizes[0]],
            },
            FramePlane {
                stride: frame.planes[1].stride,
                height: heights[1],
                data: &frame.planes[1].data[..sizes[1]],
            },
        ];
        let compressed;
        if compression == WireCompression::Lz4 {
            let [s0, s1] = scratch;
            let n0 = compress::compress_plane(planes[0].data, s0)?;
            let n1 = compress::compress_plane(planes[1].data, s1)?;
            compressed = [&s0[..n0], &s1[..n1]];
            planes[0].data = compressed[0];
            planes[1].data = compressed[1];
        }

        vtlink_proto::payloads::frame::frame(
            payload_buf,
            frame.pts,
            frame.duration,
            flags,
            &planes,
            frame.side_data,
        )?;
        conn.send(MsgType::Frame, payload_buf.as_slice())?;

        self.frames_sent += 1;
        self.inflight += 1;
        if self.inflight > self.peak_inflight {
            self.peak_inflight = self.inflight;
        }
        Ok(())
    }

    /// Receive the next packet, draining the message loop until one arrives
    /// or the stream ends.
    ///
    /// A receive timeout here is `Io`: once a frame has been committed to the
    /// wire the server owes output, and silence past the timeout means the
    /// session is wedged.
    pub fn receive_packet(&mut self) -> Result<EncodedPacket> {
        if self.done {
            return Err(SessionError::EndOfStream);
        }
        if let Some(packet) = self.pop_queued() {
            return Ok(packet);
        }

        loop {
            let (header, payload) = session::recv_blocking(&mut self.conn)?;
            match MsgType::from_u16(header.msg_type()) {
                Some(MsgType::Packet) => {
                    self.enqueue_packet(&payload)?;
                    if let Some(packet) = self.pop_queued() {
                        return Ok(packet);
                    }
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

    /// One step of the combined encode loop.
    ///
    /// Accepts a frame when the pipeline has room, falls back to draining a
    /// packet first when it does not, sends FLUSH once when the framework
    /// starts passing `None`, and then always tries to pull a packet.
    pub fn encode(&mut self, frame: Option<&RawFrame<'_>>) -> Result<Option<EncodedPacket>> {
        if self.done {
            return Err(SessionError::EndOfStream);
        }
        if let Some(packet) = self.pop_queued() {
            return Ok(Some(packet));
        }
        if let Some(frame) = frame {
            if self.inflight >= self.config.max_inflight {
                // Backpressure: the frame is not accepted this call.
                return self.receive_packet().map(Some);
            }
            self.send_frame(Some(frame))?;
        } else {
            self.send_frame(None)?;
        }
        self.receive_packet().map(Some)
    }

    fn enqueue_packet(&mut self, payload: &[u8]) -> Result<()> {
        let view = PacketView::parse(payload)?;
        self.queue.push(EncodedPacket {
            pts: view.pts,
            dts: view.dts,
            duration: view.duration,
            keyframe: view.is_keyframe(),
            data: view.data.to_vec(),
        })?;
        self.packets_recv += 1;
        Ok(())
    }

    fn pop_queued(&mut self) -> Option<EncodedPacket> {
        let packet = self.queue.pop()?;
        self.inflight = self.inflight.saturating_sub(1);
        Some(packet)
    }

    fn drop_unknown(&self, header: &MsgHeader) {
        tracing::debug!(
            msg_type = header.msg_type(),
            length = header.length(),
            "dropping unexpected message"
        );
    }
}

impl Drop for Encoder {
    fn drop(&mut self) {
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = |bytes: u64| {
            if elapsed > 0.0 { bytes as f64 * 8.0 / (elapsed * 1_000_000.0) } else { 0.0 }
        };
        tracing::info!(
            frames = self.frames_sent,
            packets = self.packets_recv,
            bytes_out = self.conn.bytes_sent,
            bytes_in = self.conn.bytes_recv,
            peak_inflight = self.peak_inflight,
            elapsed_s = elapsed,
            out_mbps = rate(self.conn.bytes_sent),
            in_mbps = rate(self.conn.bytes_recv),
            "encoder session closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(pts: i64) -> EncodedPacket {
        EncodedPacket { pts, dts: pts, duration: 1, keyframe: false, data: vec![0] }
    }

    #[test]
    fn queue_is_fifo() {
        let mut q = PacketQueue::new(4);
        q.push(packet(1)).unwrap();
        q.push(packet(2)).unwrap();
        assert_eq!(q.pop().unwrap().pts, 1);
        assert_eq!(q.pop().unwrap().pts, 2);
        assert!(q.pop().is_none());
    }

    #[test]
    fn queue_overflow_is_resource_exhausted() {
        let mut q = PacketQueue::new(2);
        q.push(packet(1)).unwrap();
        q.push(packet(2)).unwrap();
        assert!(matches!(
            q.push(packet(3)),
            Err(SessionError::ResourceExhausted(_))
        ));
        // The queue still serves what it holds.
        assert_eq!(q.pop().unwrap().pts, 1);
    }
}
