//! Fuzz target for the payload parsers
//!
//! Every parser takes untrusted bytes; none may panic, over-read, or loop
//! forever. Declared lengths that exceed the remaining payload must come
//! back as errors, never as slices.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vtlink_proto::payloads::{
    ConfigureAckView, ConfigureView, ErrorView, HelloAckView, HelloView, frame::FrameView,
    packet::PacketView,
};

fuzz_target!(|data: &[u8]| {
    let _ = HelloView::parse(data);
    let _ = HelloAckView::parse(data);
    let _ = ConfigureView::parse(data);
    let _ = ConfigureAckView::parse(data);
    let _ = ErrorView::parse(data);

    if let Ok(frame) = FrameView::parse(data) {
        assert!(frame.planes.len() <= 4);
        assert!(frame.side_data.len() <= 8);
        for plane in &frame.planes {
            assert!(plane.data.len() <= data.len());
        }
    }

    if let Ok(packet) = PacketView::parse(data) {
        assert!(packet.data.len() + 32 <= data.len());
    }
});
