//! Handshake probe for VTR1 accelerator servers.
//!
//! Opens a session, runs the full handshake, reports what the server said,
//! and disconnects. Useful for checking reachability, credentials, and
//! capacity before pointing a transcode job at a box.
//!
//! # Usage
//!
//! ```bash
//! vtlink-probe --host encoder.lan:7000
//! vtlink-probe --host encoder.lan:7000 --codec hevc --mode decode --token s3cret
//! ```

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use vtlink_client::{
    Codec, Decoder, DecoderConfig, Encoder, EncoderConfig, PixelFormat, ServerInfo,
};

/// VTR1 server handshake probe
#[derive(Parser, Debug)]
#[command(name = "vtlink-probe")]
#[command(about = "Handshake with a VTR1 accelerator server and report its identity")]
#[command(version)]
struct Args {
    /// Server to probe, as HOST:PORT
    #[arg(short = 'H', long)]
    host: String,

    /// Authentication token
    #[arg(long, default_value = "")]
    token: String,

    /// Codec to request (h264, hevc)
    #[arg(long, default_value = "h264")]
    codec: String,

    /// Session mode to probe (encode, decode)
    #[arg(long, default_value = "encode")]
    mode: String,

    /// Socket timeout in milliseconds
    #[arg(long, default_value = "5000")]
    timeout_ms: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let codec = match args.codec.as_str() {
        "h264" => Codec::H264,
        "hevc" => Codec::Hevc,
        other => return Err(format!("unknown codec {other:?} (expected h264 or hevc)").into()),
    };

    tracing::info!(host = %args.host, codec = %args.codec, mode = %args.mode, "probing");

    // Geometry is a placeholder; the probe only cares whether the handshake
    // completes and what the server reports about itself.
    let info = match args.mode.as_str() {
        "encode" => {
            let mut config =
                EncoderConfig::new(&args.host, codec, 1920, 1080, PixelFormat::Nv12);
            config.token = args.token;
            config.timeout_ms = args.timeout_ms;
            let encoder = Encoder::connect(config)?;
            encoder.server_info().clone()
        },
        "decode" => {
            let mut config =
                DecoderConfig::new(&args.host, codec, 1920, 1080, PixelFormat::Nv12);
            config.token = args.token;
            config.timeout_ms = args.timeout_ms;
            let decoder = Decoder::connect(config)?;
            decoder.server_info().clone()
        },
        other => return Err(format!("unknown mode {other:?} (expected encode or decode)").into()),
    };

    report(&info);
    Ok(())
}

fn report(info: &ServerInfo) {
    tracing::info!(
        server = %info.name,
        version = %info.version,
        active_sessions = info.active,
        max_sessions = info.max_sessions,
        "handshake complete"
    );
    for cap in &info.caps {
        tracing::info!(capability = %cap, "server capability");
    }
}
