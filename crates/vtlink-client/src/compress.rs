//! Optional per-plane LZ4 wire compression.
//!
//! Each plane is one independent LZ4 block with no framing or checksums of
//! its own; the FRAME payload's `data_len` carries the compressed size and
//! `stride * height` the uncompressed size. Scratch buffers belong to the
//! session so steady-state streaming does not allocate.

use crate::error::{Result, SessionError};

/// Compress one plane into `scratch`, growing it to the LZ4 bound as needed.
/// Returns the compressed size; `&scratch[..n]` is the wire rendition.
pub(crate) fn compress_plane(src: &[u8], scratch: &mut Vec<u8>) -> Result<usize> {
    let bound = lz4_flex::block::get_maximum_output_size(src.len());
    if scratch.len() < bound {
        scratch.resize(bound, 0);
    }
    lz4_flex::block::compress_into(src, scratch.as_mut_slice())
        .map_err(|e| SessionError::ExternalLibrary(format!("lz4 compress: {e}")))
}

/// Decompress one plane into `scratch`, which is sized to exactly `expected`
/// bytes (the plane's `stride * height`).
///
/// # Errors
///
/// `ExternalLibrary` if LZ4 rejects the block, `InvalidData` if it decodes
/// to any size other than `expected`.
pub(crate) fn decompress_plane(src: &[u8], expected: usize, scratch: &mut Vec<u8>) -> Result<()> {
    scratch.resize(expected, 0);
    let decoded = lz4_flex::block::decompress_into(src, scratch.as_mut_slice())
        .map_err(|e| SessionError::ExternalLibrary(format!("lz4 decompress: {e}")))?;
    if decoded != expected {
        return Err(SessionError::InvalidData(format!(
            "lz4 plane decoded to {decoded} bytes, expected {expected}"
        )));
    }
    Ok(())
}
