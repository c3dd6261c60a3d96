//! FRAME payload codec.
//!
//! Layout: `u64 pts, u64 duration, u32 flags, u8 plane_count`, then per plane
//! `u32 stride, u32 height, u32 data_len, data_len bytes`, then an optional
//! side-data block `u8 count, count x {u32 type, u32 size, size bytes}`.

use crate::{
    buf::{RBuf, WBuf},
    errors::{ProtocolError, Result},
};

/// Most planes a frame may carry on the wire.
pub const MAX_PLANES: usize = 4;

/// Side-data entries a parsed view retains; entries past this are consumed
/// but dropped.
pub const MAX_SIDE_DATA: usize = 8;

/// Fixed fields before the first plane: pts + duration + flags + count.
const FIXED_LEN: usize = 8 + 8 + 4 + 1;

/// One plane to serialize: logical stride and row count plus the bytes to
/// send (which may be a compressed rendition of `stride * height` bytes).
#[derive(Debug, Clone, Copy)]
pub struct FramePlane<'a> {
    /// Bytes per row of the uncompressed plane.
    pub stride: u32,
    /// Number of rows.
    pub height: u32,
    /// Plane bytes as they should appear on the wire.
    pub data: &'a [u8],
}

/// One typed side-data blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideData<'a> {
    /// Application-defined type tag.
    pub kind: u32,
    /// Blob contents.
    pub data: &'a [u8],
}

/// Build a FRAME payload.
///
/// # Errors
///
/// `ProtocolError::TooManyPlanes` for more than [`MAX_PLANES`] planes,
/// `ProtocolError::CountOverflow` if a plane or side-data blob does not fit
/// its u32 length field or the side-data count exceeds a u8.
pub fn frame(
    b: &mut WBuf,
    pts: i64,
    duration: i64,
    flags: u32,
    planes: &[FramePlane<'_>],
    side_data: &[SideData<'_>],
) -> Result<()> {
    if planes.len() > MAX_PLANES {
        return Err(ProtocolError::TooManyPlanes(planes.len() as u8));
    }
    let side_count = u8::try_from(side_data.len())
        .map_err(|_| ProtocolError::CountOverflow { field: "side-data", count: side_data.len() })?;

    b.reset();
    b.put_u64(pts as u64);
    b.put_u64(duration as u64);
    b.put_u32(flags);
    b.put_u8(planes.len() as u8);
    for plane in planes {
        let data_len = u32::try_from(plane.data.len()).map_err(|_| {
            ProtocolError::CountOverflow { field: "plane length", count: plane.data.len() }
        })?;
        b.put_u32(plane.stride);
        b.put_u32(plane.height);
        b.put_u32(data_len);
        b.put_bytes(plane.data);
    }
    if side_count > 0 {
        b.put_u8(side_count);
        for sd in side_data {
            let size = u32::try_from(sd.data.len()).map_err(|_| {
                ProtocolError::CountOverflow { field: "side-data length", count: sd.data.len() }
            })?;
            b.put_u32(sd.kind);
            b.put_u32(size);
            b.put_bytes(sd.data);
        }
    }
    Ok(())
}

/// Parsed plane: geometry plus a borrowed slice of the wire bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneView<'a> {
    /// Bytes per row of the uncompressed plane.
    pub stride: u32,
    /// Number of rows.
    pub height: u32,
    /// Plane bytes as sent; compressed if the session negotiated that.
    pub data: &'a [u8],
}

/// Parsed FRAME payload. Valid only while the backing payload buffer lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameView<'a> {
    /// Presentation timestamp.
    pub pts: i64,
    /// Frame duration in time-base units.
    pub duration: i64,
    /// Flag bits; see [`super::FLAG_KEYFRAME`].
    pub flags: u32,
    /// Planes in wire order, at most [`MAX_PLANES`].
    pub planes: Vec<PlaneView<'a>>,
    /// Side-data entries, at most [`MAX_SIDE_DATA`].
    pub side_data: Vec<SideData<'a>>,
}

impl<'a> FrameView<'a> {
    /// Parse a FRAME payload.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooShort` below the fixed-field minimum
    /// - `ProtocolError::TooManyPlanes` when the count byte exceeds 4
    /// - `ProtocolError::LengthOverrun` when any declared length runs past
    ///   the end of the payload
    pub fn parse(payload: &'a [u8]) -> Result<Self> {
        if payload.len() < FIXED_LEN {
            return Err(ProtocolError::PayloadTooShort {
                expected: FIXED_LEN,
                actual: payload.len(),
            });
        }
        let mut r = RBuf::new(payload);
        let pts = r.read_u64()? as i64;
        let duration = r.read_u64()? as i64;
        let flags = r.read_u32()?;
        let plane_count = r.read_u8()?;
        if usize::from(plane_count) > MAX_PLANES {
            return Err(ProtocolError::TooManyPlanes(plane_count));
        }

        let mut planes = Vec::with_capacity(usize::from(plane_count));
        for _ in 0..plane_count {
            let stride = r.read_u32()?;
            let height = r.read_u32()?;
            let data_len = r.read_u32()? as usize;
            if data_len > r.remaining() {
                return Err(ProtocolError::LengthOverrun {
                    declared: data_len,
                    remaining: r.remaining(),
                });
            }
            let data = r.read_bytes(data_len)?;
            planes.push(PlaneView { stride, height, data });
        }

        let mut side_data = Vec::new();
        if r.remaining() > 0 {
            let side_count = r.read_u8()?;
            for _ in 0..side_count {
                let kind = r.read_u32()?;
                let size = r.read_u32()? as usize;
                if size > r.remaining() {
                    return Err(ProtocolError::LengthOverrun {
                        declared: size,
                        remaining: r.remaining(),
                    });
                }
                let data = r.read_bytes(size)?;
                if side_data.len() < MAX_SIDE_DATA {
                    side_data.push(SideData { kind, data });
                }
            }
        }

        Ok(Self { pts, duration, flags, planes, side_data })
    }

    /// True if the keyframe flag bit is set.
    #[must_use]
    pub fn is_keyframe(&self) -> bool {
        self.flags & super::FLAG_KEYFRAME != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_plane_round_trip() {
        let mut b = WBuf::new();
        frame(
            &mut b,
            10,
            2,
            1,
            &[
                FramePlane { stride: 2, height: 2, data: &[1, 2, 3, 4] },
                FramePlane { stride: 2, height: 1, data: &[5, 6] },
            ],
            &[],
        )
        .unwrap();

        let view = FrameView::parse(b.as_slice()).unwrap();
        assert_eq!(view.pts, 10);
        assert_eq!(view.duration, 2);
        assert_eq!(view.flags, 1);
        assert!(view.is_keyframe());
        assert_eq!(view.planes.len(), 2);
        assert_eq!(view.planes[0], PlaneView { stride: 2, height: 2, data: &[1, 2, 3, 4] });
        assert_eq!(view.planes[1], PlaneView { stride: 2, height: 1, data: &[5, 6] });
        assert!(view.side_data.is_empty());

        // The parser must consume the payload exactly.
        let mut r = RBuf::new(b.as_slice());
        r.read_bytes(b.len()).unwrap();
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn negative_pts_survives() {
        let mut b = WBuf::new();
        frame(&mut b, -1, 0, 0, &[], &[]).unwrap();
        let view = FrameView::parse(b.as_slice()).unwrap();
        assert_eq!(view.pts, -1);
    }

    #[test]
    fn side_data_round_trip() {
        let mut b = WBuf::new();
        frame(
            &mut b,
            0,
            0,
            0,
            &[FramePlane { stride: 1, height: 1, data: &[9] }],
            &[SideData { kind: 3, data: &[0xca, 0xfe] }],
        )
        .unwrap();

        let view = FrameView::parse(b.as_slice()).unwrap();
        assert_eq!(view.side_data, vec![SideData { kind: 3, data: &[0xca, 0xfe] }]);
    }

    #[test]
    fn overflow_side_data_consumed_but_dropped() {
        let entries: Vec<Vec<u8>> = (0..12u8).map(|i| vec![i]).collect();
        let side: Vec<SideData<'_>> =
            entries.iter().map(|d| SideData { kind: 1, data: d }).collect();
        let mut b = WBuf::new();
        frame(&mut b, 0, 0, 0, &[], &side).unwrap();

        let view = FrameView::parse(b.as_slice()).unwrap();
        assert_eq!(view.side_data.len(), MAX_SIDE_DATA);
        assert_eq!(view.side_data[0].data, &[0]);
    }

    #[test]
    fn builder_refuses_five_planes() {
        let plane = FramePlane { stride: 1, height: 1, data: &[0] };
        let mut b = WBuf::new();
        assert_eq!(
            frame(&mut b, 0, 0, 0, &[plane; 5], &[]),
            Err(ProtocolError::TooManyPlanes(5))
        );
    }

    #[test]
    fn parser_refuses_five_planes() {
        let mut b = WBuf::new();
        b.put_u64(0);
        b.put_u64(0);
        b.put_u32(0);
        b.put_u8(5);
        assert_eq!(FrameView::parse(b.as_slice()), Err(ProtocolError::TooManyPlanes(5)));
    }

    #[test]
    fn plane_overrun_rejected() {
        let mut b = WBuf::new();
        b.put_u64(0);
        b.put_u64(0);
        b.put_u32(0);
        b.put_u8(1);
        b.put_u32(4); // stride
        b.put_u32(1); // height
        b.put_u32(100); // data_len far beyond the remaining bytes
        b.put_bytes(&[1, 2]);
        assert_eq!(
            FrameView::parse(b.as_slice()),
            Err(ProtocolError::LengthOverrun { declared: 100, remaining: 2 })
        );
    }

    #[test]
    fn short_payload_rejected() {
        assert_eq!(
            FrameView::parse(&[0; 20]),
            Err(ProtocolError::PayloadTooShort { expected: 21, actual: 20 })
        );
    }
}
