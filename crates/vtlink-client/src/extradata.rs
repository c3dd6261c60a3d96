//! Codec configuration reformatting.
//!
//! Servers return their codec configuration in the container-native form
//! (avcC for H.264, hvcC for HEVC). The embedding framework wants Annex-B:
//! each parameter-set NALU prefixed with a `00 00 00 01` start code. Every
//! length field is re-checked against the blob's declared size; an overrun is
//! a protocol violation, not a crash.

use vtlink_proto::{ProtocolError, RBuf};

use crate::{
    config::Codec,
    error::{Result, SessionError},
};

/// Annex-B start code.
const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// Shortest hvcC record worth parsing: the 22-byte fixed part plus the array
/// count.
const MIN_HVCC_LEN: usize = 23;

/// Convert a CONFIGURE_ACK extradata blob to Annex-B for the given codec.
///
/// H.264 blobs that do not look like avcC (no leading version byte 1) are
/// passed through unchanged; they are presumed to already be Annex-B.
pub(crate) fn to_annex_b(codec: Codec, extra: &[u8]) -> Result<Vec<u8>> {
    match codec {
        Codec::Hevc => hvcc_to_annex_b(extra),
        Codec::H264 => {
            if extra.first() == Some(&1) && extra.len() > 6 {
                avcc_to_annex_b(extra)
            } else {
                Ok(extra.to_vec())
            }
        },
    }
}

fn overrun(e: ProtocolError) -> SessionError {
    SessionError::InvalidData(format!("extradata overrun: {e}"))
}

/// Convert an avcC record: skip the 5 fixed bytes, then emit every SPS and
/// PPS with a start code.
pub(crate) fn avcc_to_annex_b(avcc: &[u8]) -> Result<Vec<u8>> {
    if avcc.len() <= 6 || avcc[0] != 1 {
        return Err(SessionError::InvalidData("not an avcC record".to_string()));
    }
    let mut r = RBuf::new(avcc);
    r.read_bytes(5).map_err(overrun)?;

    let mut out = Vec::new();
    let sps_count = usize::from(r.read_u8().map_err(overrun)? & 0x1f);
    for _ in 0..sps_count {
        let sps = r.read_str().map_err(overrun)?;
        out.extend_from_slice(&START_CODE);
        out.extend_from_slice(sps);
    }
    let pps_count = usize::from(r.read_u8().map_err(overrun)?);
    for _ in 0..pps_count {
        let pps = r.read_str().map_err(overrun)?;
        out.extend_from_slice(&START_CODE);
        out.extend_from_slice(pps);
    }
    Ok(out)
}

/// Convert an hvcC record: skip the fixed header, then walk each parameter
/// array and emit its NALUs with start codes. Blobs that already begin with
/// a start code are copied through unchanged.
pub(crate) fn hvcc_to_annex_b(hvcc: &[u8]) -> Result<Vec<u8>> {
    if hvcc.len() < MIN_HVCC_LEN {
        return Err(SessionError::InvalidData(format!(
            "hvcC record of {} bytes is too short",
            hvcc.len()
        )));
    }
    if hvcc.starts_with(&[0, 0, 1]) || hvcc.starts_with(&START_CODE) {
        return Ok(hvcc.to_vec());
    }

    let mut r = RBuf::new(hvcc);
    // configurationVersion through avgFrameRate.
    r.read_bytes(21).map_err(overrun)?;
    // lengthSizeMinusOne lives in the low bits; irrelevant for Annex-B.
    r.read_u8().map_err(overrun)?;
    let num_arrays = r.read_u8().map_err(overrun)?;

    let mut out = Vec::new();
    for _ in 0..num_arrays {
        // array completeness + reserved + NAL unit type.
        r.read_u8().map_err(overrun)?;
        let num_nalus = r.read_u16().map_err(overrun)?;
        for _ in 0..num_nalus {
            let nalu = r.read_str().map_err(overrun)?;
            if nalu.is_empty() {
                return Err(SessionError::InvalidData("empty NALU in hvcC record".to_string()));
            }
            out.extend_from_slice(&START_CODE);
            out.extend_from_slice(nalu);
        }
    }
    Ok(out)
}
