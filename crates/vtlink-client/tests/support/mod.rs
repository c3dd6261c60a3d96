//! Scripted in-process server for session tests.
//!
//! Each test spawns a listener on a loopback port and a thread that plays a
//! fixed script against whatever the client sends. Messages the script reads
//! are mirrored to the test thread over a channel so tests can assert on
//! exactly what hit the wire, and in what order.

#![allow(dead_code)]

use std::{
    io::{ErrorKind, Read, Write},
    net::{TcpListener, TcpStream},
    sync::mpsc::{self, Receiver, Sender},
    thread::{self, JoinHandle},
    time::Duration,
};

use vtlink_proto::{
    MsgHeader, MsgType, WBuf, build_message,
    payloads::{self, ConfigureAckParams, HelloAckParams, frame::FramePlane},
};

/// Something the scripted server observed.
#[derive(Debug)]
pub enum Event {
    /// A message arrived: raw type and payload.
    Received(u16, Vec<u8>),
    /// The socket stayed quiet through a read-timeout window.
    Quiet,
}

impl Event {
    pub fn is_type(&self, t: MsgType) -> bool {
        matches!(self, Event::Received(raw, _) if *raw == t.to_u16())
    }
}

/// Handle to the scripted server.
pub struct MockServer {
    /// `HOST:PORT` literal to hand to the client config.
    pub addr: String,
    handle: JoinHandle<()>,
    events: Receiver<Event>,
}

impl MockServer {
    /// Bind a loopback listener and run `script` against the first
    /// connection.
    pub fn spawn<F>(script: F) -> Self
    where
        F: FnOnce(&mut Peer) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut peer = Peer { stream, events: tx, buf: WBuf::new() };
            script(&mut peer);
        });
        Self { addr, handle, events: rx }
    }

    /// Wait for the script to finish; propagates script-side panics.
    pub fn join(self) {
        self.handle.join().unwrap();
    }

    /// Everything observed so far.
    pub fn drain_events(&self) -> Vec<Event> {
        self.events.try_iter().collect()
    }

    /// Block for the next observation.
    pub fn next_event(&self) -> Event {
        self.events.recv_timeout(Duration::from_secs(5)).unwrap()
    }
}

/// The server side of one connection, as seen by a script.
pub struct Peer {
    stream: TcpStream,
    events: Sender<Event>,
    buf: WBuf,
}

impl Peer {
    /// Read one framed message and mirror it to the test thread.
    pub fn read_msg(&mut self) -> (u16, Vec<u8>) {
        let mut header_buf = [0u8; MsgHeader::SIZE];
        self.stream.read_exact(&mut header_buf).unwrap();
        let header = MsgHeader::parse(&header_buf).unwrap();
        let mut payload = vec![0u8; header.length() as usize];
        self.stream.read_exact(&mut payload).unwrap();
        let _ = self.events.send(Event::Received(header.msg_type(), payload.clone()));
        (header.msg_type(), payload)
    }

    /// Read one message and insist on its type.
    pub fn expect(&mut self, want: MsgType) -> Vec<u8> {
        let (raw, payload) = self.read_msg();
        assert_eq!(raw, want.to_u16(), "expected {}", want.name());
        payload
    }

    /// Verify nothing arrives within `window`, then go back to blocking
    /// reads. Emits [`Event::Quiet`] on success.
    pub fn expect_quiet(&mut self, window: Duration) {
        self.stream.set_read_timeout(Some(window)).unwrap();
        let mut one = [0u8; 1];
        match self.stream.read(&mut one) {
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {},
            other => panic!("expected quiet socket, got {other:?}"),
        }
        self.stream.set_read_timeout(None).unwrap();
        let _ = self.events.send(Event::Quiet);
    }

    /// Send a framed message.
    pub fn send(&mut self, msg_type: MsgType, payload: &[u8]) {
        let msg = build_message(msg_type, payload).unwrap();
        self.stream.write_all(&msg).unwrap();
    }

    /// Send a raw (possibly unknown) message type with an arbitrary payload.
    pub fn send_raw(&mut self, raw_type: u16, payload: &[u8]) {
        let mut msg = build_message(MsgType::Ping, payload).unwrap();
        msg[6..8].copy_from_slice(&raw_type.to_be_bytes());
        self.stream.write_all(&msg).unwrap();
    }

    pub fn send_hello_ack(&mut self, params: &HelloAckParams<'_>) {
        payloads::hello_ack(&mut self.buf, params).unwrap();
        let msg = build_message(MsgType::HelloAck, self.buf.as_slice()).unwrap();
        self.stream.write_all(&msg).unwrap();
    }

    pub fn send_configure_ack(&mut self, params: &ConfigureAckParams<'_>) {
        payloads::configure_ack(&mut self.buf, params).unwrap();
        let msg = build_message(MsgType::ConfigureAck, self.buf.as_slice()).unwrap();
        self.stream.write_all(&msg).unwrap();
    }

    pub fn send_packet(&mut self, pts: i64, dts: i64, duration: i64, flags: u32, data: &[u8]) {
        payloads::packet::packet(&mut self.buf, pts, dts, duration, flags, data).unwrap();
        let msg = build_message(MsgType::Packet, self.buf.as_slice()).unwrap();
        self.stream.write_all(&msg).unwrap();
    }

    pub fn send_frame(
        &mut self,
        pts: i64,
        duration: i64,
        flags: u32,
        planes: &[FramePlane<'_>],
    ) {
        payloads::frame::frame(&mut self.buf, pts, duration, flags, planes, &[]).unwrap();
        let msg = build_message(MsgType::Frame, self.buf.as_slice()).unwrap();
        self.stream.write_all(&msg).unwrap();
    }

    pub fn send_error(&mut self, code: u32, message: &str) {
        payloads::error(&mut self.buf, code, message).unwrap();
        let msg = build_message(MsgType::Error, self.buf.as_slice()).unwrap();
        self.stream.write_all(&msg).unwrap();
    }

    /// Run the accept side of the handshake with the given acks. Returns the
    /// HELLO and CONFIGURE payloads for inspection.
    pub fn handshake_with(
        &mut self,
        hello_ack: &HelloAckParams<'_>,
        configure_ack: &ConfigureAckParams<'_>,
    ) -> (Vec<u8>, Vec<u8>) {
        let hello = self.expect(MsgType::Hello);
        self.send_hello_ack(hello_ack);
        let configure = self.expect(MsgType::Configure);
        self.send_configure_ack(configure_ack);
        (hello, configure)
    }

    /// Run the accept side of the handshake with permissive defaults.
    pub fn handshake(&mut self) -> (Vec<u8>, Vec<u8>) {
        self.handshake_with(
            &HelloAckParams {
                status: 0,
                server_name: "mock-accel",
                server_version: "1.0",
                caps: &["h264", "hevc"],
                max_sessions: 4,
                active: 1,
            },
            &ConfigureAckParams::default(),
        )
    }
}
