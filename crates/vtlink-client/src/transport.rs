//! Blocking TCP transport.
//!
//! One connection per session. The socket carries framed messages: a 12-byte
//! header, then exactly `length` payload bytes. Sends and receives are
//! bounded by the per-call timeout configured at connect time; `EINTR` is
//! retried transparently and everything else surfaces.

use std::{
    io::{ErrorKind, Read, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    time::Duration,
};

use vtlink_proto::{MsgHeader, MsgType};

use crate::error::{Result, SessionError};

/// Longest port literal accepted in `HOST:PORT`.
const PORT_MAX_LEN: usize = 15;

/// Split a `HOST:PORT` literal on its last colon.
///
/// The host must be nonempty and the port at most 15 characters; anything
/// else is `InvalidArgument`. Whether the port actually parses is left to
/// resolution, which reports `Io` like any other resolver failure.
pub(crate) fn split_hostport(hostport: &str) -> Result<(&str, &str)> {
    let Some(colon) = hostport.rfind(':') else {
        return Err(SessionError::InvalidArgument(format!("missing port in {hostport:?}")));
    };
    let (host, port) = (&hostport[..colon], &hostport[colon + 1..]);
    if host.is_empty() {
        return Err(SessionError::InvalidArgument(format!("empty host in {hostport:?}")));
    }
    if port.len() > PORT_MAX_LEN {
        return Err(SessionError::InvalidArgument(format!("oversize port in {hostport:?}")));
    }
    Ok((host, port))
}

/// A connected session transport with byte accounting.
#[derive(Debug)]
pub(crate) struct Connection {
    stream: TcpStream,
    /// Bytes written to the peer, headers included.
    pub bytes_sent: u64,
    /// Bytes read from the peer, headers included.
    pub bytes_recv: u64,
}

/// Connect to `hostport`, trying each resolved IPv4 address in order.
///
/// Send and receive timeouts are set to `timeout` on the winning socket.
pub(crate) fn connect(hostport: &str, timeout: Duration) -> Result<Connection> {
    let (host, port) = split_hostport(hostport)?;
    let port: u16 = port
        .parse()
        .map_err(|_| SessionError::Io(format!("unresolvable port {port:?} in {hostport:?}")))?;

    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| SessionError::Io(format!("resolving {host}: {e}")))?;

    let mut last_err = None;
    for addr in addrs.filter(SocketAddr::is_ipv4) {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream
                    .set_read_timeout(Some(timeout))
                    .and_then(|()| stream.set_write_timeout(Some(timeout)))
                    .map_err(|e| SessionError::Io(format!("setting timeouts: {e}")))?;
                return Ok(Connection { stream, bytes_sent: 0, bytes_recv: 0 });
            },
            Err(e) => last_err = Some(e),
        }
    }
    Err(match last_err {
        Some(e) => SessionError::Io(format!("connecting to {hostport}: {e}")),
        None => SessionError::Io(format!("no IPv4 addresses for {hostport}")),
    })
}

impl Connection {
    /// Send one framed message: header, then the payload.
    pub fn send(&mut self, msg_type: MsgType, payload: &[u8]) -> Result<()> {
        let length = u32::try_from(payload.len()).map_err(|_| {
            SessionError::InvalidArgument(format!("payload of {} bytes too large", payload.len()))
        })?;
        let header = MsgHeader::new(msg_type, length);
        write_full(&mut self.stream, &header.to_bytes())?;
        if !payload.is_empty() {
            write_full(&mut self.stream, payload)?;
        }
        self.bytes_sent += (MsgHeader::SIZE + payload.len()) as u64;
        Ok(())
    }

    /// Receive one framed message.
    ///
    /// Returns `WouldBlock` only when the receive timeout expires before the
    /// first header byte arrives; a timeout anywhere later leaves the stream
    /// desynced and is reported as `Io`.
    pub fn recv(&mut self) -> Result<(MsgHeader, Vec<u8>)> {
        let mut header_buf = [0u8; MsgHeader::SIZE];
        read_full(&mut self.stream, &mut header_buf)?;
        let header = MsgHeader::parse(&header_buf)?;

        let length = header.length() as usize;
        if length == 0 {
            self.bytes_recv += MsgHeader::SIZE as u64;
            return Ok((header, Vec::new()));
        }
        let mut payload = vec![0u8; length];
        match read_full(&mut self.stream, &mut payload) {
            Err(SessionError::WouldBlock) => {
                return Err(SessionError::Io("receive timed out mid-message".to_string()));
            },
            other => other?,
        }
        self.bytes_recv += (MsgHeader::SIZE + length) as u64;
        Ok((header, payload))
    }
}

/// Write all of `buf`, retrying `EINTR`.
fn write_full(stream: &mut TcpStream, buf: &[u8]) -> Result<()> {
    let mut sent = 0;
    while sent < buf.len() {
        match stream.write(&buf[sent..]) {
            Ok(0) => return Err(SessionError::EndOfStream),
            Ok(n) => sent += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {},
            Err(e) => return Err(SessionError::Io(format!("send: {e}"))),
        }
    }
    Ok(())
}

/// Read exactly `buf.len()` bytes, retrying `EINTR`.
///
/// A timeout with nothing read yet is `WouldBlock`; with a partial read it is
/// `Io`, because the stream can no longer be reframed. A clean close by the
/// peer is `EndOfStream`.
fn read_full(stream: &mut TcpStream, buf: &mut [u8]) -> Result<()> {
    let mut got = 0;
    while got < buf.len() {
        match stream.read(&mut buf[got..]) {
            Ok(0) => return Err(SessionError::EndOfStream),
            Ok(n) => got += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {},
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(if got == 0 {
                    SessionError::WouldBlock
                } else {
                    SessionError::Io(format!("receive timed out mid-message: {e}"))
                });
            },
            Err(e) => return Err(SessionError::Io(format!("recv: {e}"))),
        }
    }
    Ok(())
}
