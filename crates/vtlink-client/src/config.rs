//! Session configuration: codecs, pixel formats, and the option table.
//!
//! Options travel to the server as key/value strings inside CONFIGURE. A knob
//! is serialized only when the caller set it to something non-default, so the
//! server can tell "unset" from "explicitly zero".

use std::time::Duration;

use crate::error::{Result, SessionError};

/// Codecs the bridge can request from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// H.264 / AVC.
    H264,
    /// H.265 / HEVC.
    Hevc,
}

impl Codec {
    /// Codec name as sent in HELLO.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::Hevc => "hevc",
        }
    }
}

/// Pixel formats the wire protocol enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit 4:2:0, interleaved chroma.
    Nv12,
    /// 10-bit little-endian 4:2:0, interleaved chroma.
    P010le,
}

impl PixelFormat {
    /// Wire code used in CONFIGURE and CONFIGURE_ACK.
    #[must_use]
    pub(crate) const fn wire_code(self) -> u8 {
        match self {
            Self::Nv12 => 1,
            Self::P010le => 2,
        }
    }

    /// Decode a wire code; `None` for anything unknown.
    #[must_use]
    pub(crate) const fn from_wire(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Nv12),
            2 => Some(Self::P010le),
            _ => None,
        }
    }

    /// Bytes per sample in each plane row.
    #[must_use]
    pub(crate) const fn bytes_per_sample(self) -> usize {
        match self {
            Self::Nv12 => 1,
            Self::P010le => 2,
        }
    }
}

/// Wire payload compression modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireCompression {
    /// Planes travel raw.
    #[default]
    None,
    /// Each plane is an independent LZ4 block.
    Lz4,
    /// Advertised in the option space but refused by this client.
    Zstd,
}

impl WireCompression {
    /// Value sent in the `wire_compression` option.
    #[must_use]
    pub(crate) const fn wire_value(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Lz4 => 1,
            Self::Zstd => 2,
        }
    }
}

/// Socket timeout bounds in milliseconds.
pub const TIMEOUT_MS_MIN: u32 = 100;
/// Upper socket timeout bound in milliseconds.
pub const TIMEOUT_MS_MAX: u32 = 60_000;
/// Default socket timeout in milliseconds.
pub const TIMEOUT_MS_DEFAULT: u32 = 5_000;

/// Lower bound on pipelined in-flight frames.
pub const INFLIGHT_MIN: usize = 1;
/// Upper bound on pipelined in-flight frames.
pub const INFLIGHT_MAX: usize = 128;
/// Default pipelining depth.
pub const INFLIGHT_DEFAULT: usize = 16;

/// Encoder tuning knobs mirrored into the CONFIGURE option table.
///
/// Every field defaults to "unset" and is omitted from the wire in that
/// state. Numeric values are serialized in decimal; booleans as `"1"`.
#[derive(Debug, Clone, Default)]
pub struct CodecOptions {
    /// Target bitrate in bits per second (`bitrate`).
    pub bitrate: Option<i64>,
    /// Peak bitrate in bits per second (`maxrate`).
    pub max_bitrate: Option<i64>,
    /// Keyframe interval in frames (`gop`).
    pub gop_size: Option<i32>,
    /// Consecutive B-frame limit (`max_b_frames`).
    pub max_b_frames: Option<i32>,
    /// Raw codec flag bits (`flags`).
    pub codec_flags: Option<i32>,
    /// Constant-quality target (`global_quality`).
    pub global_quality: Option<i32>,
    /// Minimum quantizer (`qmin`).
    pub qmin: Option<i32>,
    /// Maximum quantizer (`qmax`).
    pub qmax: Option<i32>,
    /// Codec profile id (`profile`).
    pub profile: Option<i32>,
    /// Codec level id (`level`).
    pub level: Option<i32>,
    /// Entropy coder selection (`entropy`).
    pub entropy: Option<i32>,
    /// Allow the server to fall back to software (`allow_sw`).
    pub allow_sw: bool,
    /// Require a software implementation (`require_sw`).
    pub require_sw: bool,
    /// Real-time encoding hint (`realtime`).
    pub realtime: Option<bool>,
    /// Frames precede this session's (`frames_before`).
    pub frames_before: bool,
    /// Frames follow this session's (`frames_after`).
    pub frames_after: bool,
    /// Prioritize speed over quality (`prio_speed`).
    pub prio_speed: Option<bool>,
    /// Power-efficient encoding (`power_efficient`).
    pub power_efficient: Option<i32>,
    /// Spatial adaptive quantization (`spatial_aq`).
    pub spatial_aq: Option<i32>,
    /// Reference frame cap (`max_ref_frames`).
    pub max_ref_frames: Option<i32>,
    /// Slice size cap in bytes (`max_slice_bytes`).
    pub max_slice_bytes: Option<i32>,
    /// Constant-bitrate mode (`constant_bit_rate`).
    pub constant_bit_rate: bool,
    /// Alpha channel quality, 0.0..=1.0 (`alpha_quality`).
    pub alpha_quality: Option<f64>,
    /// Color range id (`color_range`).
    pub color_range: Option<i32>,
    /// Colorspace id (`colorspace`).
    pub colorspace: Option<i32>,
    /// Color primaries id (`color_primaries`).
    pub color_primaries: Option<i32>,
    /// Transfer characteristics id (`color_trc`).
    pub color_trc: Option<i32>,
    /// Sample aspect ratio, serialized as `sar_num`/`sar_den`.
    pub sample_aspect_ratio: Option<(i32, i32)>,
    /// Pass through A53 closed captions (`a53_cc`).
    pub a53_cc: Option<bool>,
}

impl CodecOptions {
    pub(crate) fn append_wire_options(&self, opts: &mut Vec<(String, String)>) {
        push_int(opts, "bitrate", self.bitrate);
        push_int(opts, "maxrate", self.max_bitrate);
        push_int(opts, "gop", self.gop_size);
        push_int(opts, "max_b_frames", self.max_b_frames);
        push_int(opts, "flags", self.codec_flags);
        push_int(opts, "global_quality", self.global_quality);
        push_int(opts, "qmin", self.qmin);
        push_int(opts, "qmax", self.qmax);
        push_int(opts, "profile", self.profile);
        push_int(opts, "level", self.level);
        push_int(opts, "entropy", self.entropy);
        push_flag(opts, "allow_sw", self.allow_sw);
        push_flag(opts, "require_sw", self.require_sw);
        push_bool(opts, "realtime", self.realtime);
        push_flag(opts, "frames_before", self.frames_before);
        push_flag(opts, "frames_after", self.frames_after);
        push_bool(opts, "prio_speed", self.prio_speed);
        push_int(opts, "power_efficient", self.power_efficient);
        push_int(opts, "spatial_aq", self.spatial_aq);
        push_int(opts, "max_ref_frames", self.max_ref_frames);
        push_int(opts, "max_slice_bytes", self.max_slice_bytes);
        push_flag(opts, "constant_bit_rate", self.constant_bit_rate);
        if let Some(q) = self.alpha_quality {
            opts.push(("alpha_quality".to_string(), format!("{q:.6}")));
        }
        push_int(opts, "color_range", self.color_range);
        push_int(opts, "colorspace", self.colorspace);
        push_int(opts, "color_primaries", self.color_primaries);
        push_int(opts, "color_trc", self.color_trc);
        if let Some((num, den)) = self.sample_aspect_ratio {
            opts.push(("sar_num".to_string(), num.to_string()));
            opts.push(("sar_den".to_string(), den.to_string()));
        }
        push_bool(opts, "a53_cc", self.a53_cc);
    }
}

fn push_int<T: std::fmt::Display>(opts: &mut Vec<(String, String)>, key: &str, v: Option<T>) {
    if let Some(v) = v {
        opts.push((key.to_string(), v.to_string()));
    }
}

fn push_flag(opts: &mut Vec<(String, String)>, key: &str, set: bool) {
    if set {
        opts.push((key.to_string(), "1".to_string()));
    }
}

fn push_bool(opts: &mut Vec<(String, String)>, key: &str, v: Option<bool>) {
    if let Some(v) = v {
        opts.push((key.to_string(), i32::from(v).to_string()));
    }
}

/// Configuration for an encoder session.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Server address as `HOST:PORT`.
    pub host: String,
    /// Authentication token; empty means none.
    pub token: String,
    /// Per-call socket timeout in milliseconds.
    pub timeout_ms: u32,
    /// Frames allowed in flight before sends block on receives.
    pub max_inflight: usize,
    /// Wire payload compression.
    pub compression: WireCompression,
    /// Codec to request.
    pub codec: Codec,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Input pixel format.
    pub pixel_format: PixelFormat,
    /// Time base as numerator/denominator.
    pub time_base: (u32, u32),
    /// Frame rate as numerator/denominator.
    pub frame_rate: (u32, u32),
    /// Encoder tuning knobs.
    pub options: CodecOptions,
}

impl EncoderConfig {
    /// Configuration with defaults for everything but the essentials.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        codec: Codec,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
    ) -> Self {
        Self {
            host: host.into(),
            token: String::new(),
            timeout_ms: TIMEOUT_MS_DEFAULT,
            max_inflight: INFLIGHT_DEFAULT,
            compression: WireCompression::default(),
            codec,
            width,
            height,
            pixel_format,
            time_base: (1, 30),
            frame_rate: (30, 1),
            options: CodecOptions::default(),
        }
    }

    /// Socket timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.timeout_ms))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(SessionError::InvalidArgument("host is required".to_string()));
        }
        validate_timeout(self.timeout_ms)?;
        if !(INFLIGHT_MIN..=INFLIGHT_MAX).contains(&self.max_inflight) {
            return Err(SessionError::InvalidArgument(format!(
                "max_inflight {} outside {INFLIGHT_MIN}..={INFLIGHT_MAX}",
                self.max_inflight
            )));
        }
        validate_compression(self.compression)?;
        if self.codec == Codec::H264 && self.pixel_format != PixelFormat::Nv12 {
            return Err(SessionError::InvalidArgument(
                "h264 sessions support NV12 only".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn wire_options(&self) -> Vec<(String, String)> {
        let mut opts = vec![("mode".to_string(), "encode".to_string())];
        if self.compression != WireCompression::None {
            opts.push((
                "wire_compression".to_string(),
                self.compression.wire_value().to_string(),
            ));
        }
        self.options.append_wire_options(&mut opts);
        opts
    }
}

/// Configuration for a decoder session.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Server address as `HOST:PORT`.
    pub host: String,
    /// Authentication token; empty means none.
    pub token: String,
    /// Per-call socket timeout in milliseconds.
    pub timeout_ms: u32,
    /// Wire payload compression.
    pub compression: WireCompression,
    /// Codec of the incoming bitstream.
    pub codec: Codec,
    /// Coded width in pixels.
    pub width: u32,
    /// Coded height in pixels.
    pub height: u32,
    /// Output pixel format requested; the server may override it in
    /// CONFIGURE_ACK.
    pub pixel_format: PixelFormat,
    /// Time base as numerator/denominator.
    pub time_base: (u32, u32),
    /// Frame rate as numerator/denominator.
    pub frame_rate: (u32, u32),
    /// Codec configuration blob (avcC/hvcC or Annex-B) sent in CONFIGURE.
    pub extradata: Vec<u8>,
    /// Color range id (`color_range`).
    pub color_range: Option<i32>,
    /// Colorspace id (`colorspace`).
    pub colorspace: Option<i32>,
    /// Color primaries id (`color_primaries`).
    pub color_primaries: Option<i32>,
    /// Transfer characteristics id (`color_trc`).
    pub color_trc: Option<i32>,
}

impl DecoderConfig {
    /// Configuration with defaults for everything but the essentials.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        codec: Codec,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
    ) -> Self {
        Self {
            host: host.into(),
            token: String::new(),
            timeout_ms: TIMEOUT_MS_DEFAULT,
            compression: WireCompression::default(),
            codec,
            width,
            height,
            pixel_format,
            time_base: (1, 30),
            frame_rate: (30, 1),
            extradata: Vec::new(),
            color_range: None,
            colorspace: None,
            color_primaries: None,
            color_trc: None,
        }
    }

    /// Socket timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.timeout_ms))
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(SessionError::InvalidArgument("host is required".to_string()));
        }
        validate_timeout(self.timeout_ms)?;
        validate_compression(self.compression)
    }

    pub(crate) fn wire_options(&self) -> Vec<(String, String)> {
        let mut opts = vec![("mode".to_string(), "decode".to_string())];
        if self.compression != WireCompression::None {
            opts.push((
                "wire_compression".to_string(),
                self.compression.wire_value().to_string(),
            ));
        }
        push_int(&mut opts, "color_range", self.color_range);
        push_int(&mut opts, "colorspace", self.colorspace);
        push_int(&mut opts, "color_primaries", self.color_primaries);
        push_int(&mut opts, "color_trc", self.color_trc);
        opts
    }
}

fn validate_timeout(timeout_ms: u32) -> Result<()> {
    if !(TIMEOUT_MS_MIN..=TIMEOUT_MS_MAX).contains(&timeout_ms) {
        return Err(SessionError::InvalidArgument(format!(
            "timeout_ms {timeout_ms} outside {TIMEOUT_MS_MIN}..={TIMEOUT_MS_MAX}"
        )));
    }
    Ok(())
}

fn validate_compression(compression: WireCompression) -> Result<()> {
    if compression == WireCompression::Zstd {
        return Err(SessionError::NotImplemented("zstd wire compression"));
    }
    Ok(())
}
