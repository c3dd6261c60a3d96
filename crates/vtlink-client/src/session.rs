//! Handshake and session plumbing shared by the encoder and decoder.
//!
//! Both session kinds open the same way: connect, HELLO, expect HELLO_ACK,
//! CONFIGURE, expect CONFIGURE_ACK. What differs is the option table and what
//! each side does with the ack's extradata, so the shared code hands back the
//! parsed reply and lets the caller interpret it.

use vtlink_proto::{
    MsgHeader, MsgType, WBuf,
    payloads::{self, ConfigureAckView, ErrorView, HelloAckView},
    type_name,
};

use crate::{
    config::{Codec, PixelFormat},
    error::{Result, SessionError},
    transport::Connection,
};

/// Name this client reports in HELLO.
pub(crate) const CLIENT_NAME: &str = "vtlink";

/// Build identifier this client reports in HELLO.
pub(crate) const CLIENT_BUILD_ID: &str = env!("CARGO_PKG_VERSION");

/// Server identity captured from HELLO_ACK.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    /// Server software name.
    pub name: String,
    /// Server version string.
    pub version: String,
    /// Capability strings the server advertised.
    pub caps: Vec<String>,
    /// Total sessions the server accepts.
    pub max_sessions: u16,
    /// Sessions active when this one connected.
    pub active: u16,
}

impl ServerInfo {
    fn from_ack(ack: &HelloAckView<'_>) -> Self {
        Self {
            name: String::from_utf8_lossy(ack.server_name).into_owned(),
            version: String::from_utf8_lossy(ack.server_version).into_owned(),
            caps: ack.caps.iter().map(|c| String::from_utf8_lossy(c).into_owned()).collect(),
            max_sessions: ack.max_sessions,
            active: ack.active,
        }
    }
}

/// What CONFIGURE_ACK told us.
#[derive(Debug, Clone)]
pub(crate) struct ConfigureReply {
    /// Codec configuration blob, still in the codec's native container form.
    pub extra: Vec<u8>,
    /// Server-reported pixel format code; 0 means "as requested".
    pub reported_pix_fmt: u8,
}

/// Everything the handshake needs to know.
pub(crate) struct HandshakeParams<'a> {
    /// HELLO token; empty means none.
    pub token: &'a str,
    /// Codec to request.
    pub codec: Codec,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Session pixel format.
    pub pixel_format: PixelFormat,
    /// Time base as numerator/denominator.
    pub time_base: (u32, u32),
    /// Frame rate as numerator/denominator.
    pub frame_rate: (u32, u32),
    /// CONFIGURE option table, `mode` first.
    pub options: Vec<(String, String)>,
    /// CONFIGURE extradata blob; empty for encoders.
    pub extradata: &'a [u8],
}

/// Run the two-phase handshake on a fresh connection.
pub(crate) fn handshake(
    conn: &mut Connection,
    params: &HandshakeParams<'_>,
) -> Result<(ServerInfo, ConfigureReply)> {
    let mut buf = WBuf::new();

    payloads::hello(&mut buf, params.token, params.codec.wire_name(), CLIENT_NAME, CLIENT_BUILD_ID)?;
    conn.send(MsgType::Hello, buf.as_slice())?;

    let (header, payload) = recv_blocking(conn)?;
    expect_type(&header, MsgType::HelloAck)?;
    let ack = HelloAckView::parse(&payload)?;
    if ack.status != 0 {
        return Err(SessionError::PermissionDenied(ack.status));
    }
    let server = ServerInfo::from_ack(&ack);
    tracing::debug!(
        server = %server.name,
        version = %server.version,
        sessions = server.active,
        max_sessions = server.max_sessions,
        "server accepted hello"
    );

    payloads::configure(
        &mut buf,
        &payloads::ConfigureParams {
            width: params.width,
            height: params.height,
            pix_fmt: params.pixel_format.wire_code(),
            time_base: params.time_base,
            frame_rate: params.frame_rate,
            options: &params.options,
            extradata: params.extradata,
        },
    )?;
    conn.send(MsgType::Configure, buf.as_slice())?;

    let (header, payload) = recv_blocking(conn)?;
    expect_type(&header, MsgType::ConfigureAck)?;
    let ack = ConfigureAckView::parse(&payload)?;
    if ack.status != 0 {
        return Err(SessionError::InvalidData(format!(
            "server rejected configuration: status {}",
            ack.status
        )));
    }
    for warning in &ack.warnings {
        tracing::warn!("server warning: {}", String::from_utf8_lossy(warning));
    }

    let reply =
        ConfigureReply { extra: ack.extra.to_vec(), reported_pix_fmt: ack.reported_pix_fmt };
    Ok((server, reply))
}

/// Receive one message, treating a first-byte timeout as a hard failure.
/// Used wherever the protocol owes us an answer.
pub(crate) fn recv_blocking(conn: &mut Connection) -> Result<(MsgHeader, Vec<u8>)> {
    match conn.recv() {
        Err(SessionError::WouldBlock) => {
            Err(SessionError::Io("timed out waiting for server message".to_string()))
        },
        other => other,
    }
}

fn expect_type(header: &MsgHeader, want: MsgType) -> Result<()> {
    if header.msg_type() == want.to_u16() {
        Ok(())
    } else {
        Err(SessionError::InvalidData(format!(
            "expected {}, got {}",
            want.name(),
            type_name(header.msg_type())
        )))
    }
}

/// Log a peer ERROR payload and turn it into the session error the caller
/// returns.
pub(crate) fn server_error(payload: &[u8]) -> SessionError {
    let view = ErrorView::parse(payload);
    let message = String::from_utf8_lossy(view.message);
    tracing::error!(code = view.code, %message, "server reported error");
    SessionError::Io(format!("server error {}: {message}", view.code))
}

/// Answer a PING with an empty PONG.
pub(crate) fn reply_pong(conn: &mut Connection) -> Result<()> {
    conn.send(MsgType::Pong, &[])
}
