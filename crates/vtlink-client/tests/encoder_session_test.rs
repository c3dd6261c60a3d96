//! Encoder streaming loop against a scripted server.

mod support;

use std::time::Duration;

use support::{Event, MockServer};
use vtlink_client::{
    Codec, EncodedPacket, Encoder, EncoderConfig, PixelFormat, PlaneRef, RawFrame, SessionError,
    WireCompression,
};
use vtlink_proto::{MsgType, payloads::frame::FrameView};

const WIDTH: u32 = 4;
const HEIGHT: u32 = 4;

fn config(addr: &str) -> EncoderConfig {
    EncoderConfig::new(addr, Codec::H264, WIDTH, HEIGHT, PixelFormat::Nv12)
}

fn luma() -> Vec<u8> {
    (0..WIDTH * HEIGHT).map(|i| i as u8).collect()
}

fn chroma() -> Vec<u8> {
    (0..WIDTH * HEIGHT / 2).map(|i| 100 + i as u8).collect()
}

fn frame<'a>(luma: &'a [u8], chroma: &'a [u8], pts: i64, keyframe: bool) -> RawFrame<'a> {
    RawFrame {
        pts,
        duration: 1,
        keyframe,
        pixel_format: PixelFormat::Nv12,
        planes: [
            PlaneRef { data: luma, stride: WIDTH },
            PlaneRef { data: chroma, stride: WIDTH },
        ],
        side_data: &[],
    }
}

#[test]
fn frame_and_packet_round_trip_with_keyframe_bits() {
    let server = MockServer::spawn(|peer| {
        peer.handshake();

        let payload = peer.expect(MsgType::Frame);
        let view = FrameView::parse(&payload).unwrap();
        assert_eq!(view.pts, 7);
        assert_eq!(view.duration, 1);
        assert_eq!(view.flags & 1, 1, "keyframe bit must be set on the wire");
        assert_eq!(view.planes.len(), 2);
        assert_eq!(view.planes[0].stride, WIDTH);
        assert_eq!(view.planes[0].height, HEIGHT);
        assert_eq!(view.planes[0].data.len() as u32, WIDTH * HEIGHT);
        assert_eq!(view.planes[1].height, HEIGHT / 2);

        peer.send_packet(7, 6, 1, 1, &[0x00, 0x00, 0x01, 0x65]);
    });

    let mut encoder = Encoder::connect(config(&server.addr)).unwrap();
    let (y, uv) = (luma(), chroma());
    let packet = encoder.encode(Some(&frame(&y, &uv, 7, true))).unwrap().unwrap();
    assert_eq!(
        packet,
        EncodedPacket {
            pts: 7,
            dts: 6,
            duration: 1,
            keyframe: true,
            data: vec![0x00, 0x00, 0x01, 0x65],
        }
    );
    assert_eq!(encoder.inflight(), 0);

    drop(encoder);
    server.join();
}

#[test]
fn repeated_drain_calls_send_one_flush() {
    let server = MockServer::spawn(|peer| {
        peer.handshake();
        peer.expect(MsgType::Flush);
        // Nothing else may arrive while the client keeps passing None.
        peer.expect_quiet(Duration::from_millis(300));
        peer.send(MsgType::Done, &[]);
    });

    let mut encoder = Encoder::connect(config(&server.addr)).unwrap();
    for _ in 0..3 {
        encoder.send_frame(None).unwrap();
    }

    // Wait for the quiet window to prove no second FLUSH hit the wire. The
    // event stream is HELLO, CONFIGURE, FLUSH, then the quiet marker.
    let events = [
        server.next_event(),
        server.next_event(),
        server.next_event(),
        server.next_event(),
    ];
    let flushes = events.iter().filter(|e| e.is_type(MsgType::Flush)).count();
    assert_eq!(flushes, 1);
    assert!(matches!(events.last(), Some(Event::Quiet)));

    assert_eq!(encoder.receive_packet().unwrap_err(), SessionError::EndOfStream);
    // The session stays drained.
    assert_eq!(encoder.receive_packet().unwrap_err(), SessionError::EndOfStream);
    let (y, uv) = (luma(), chroma());
    assert_eq!(
        encoder.send_frame(Some(&frame(&y, &uv, 0, false))).unwrap_err(),
        SessionError::EndOfStream
    );

    drop(encoder);
    server.join();
}

#[test]
fn backpressure_drains_before_accepting_more_frames() {
    const INFLIGHT: usize = 4;
    let server = MockServer::spawn(|peer| {
        peer.handshake();
        for _ in 0..INFLIGHT {
            peer.expect(MsgType::Frame);
        }
        peer.send_packet(0, 0, 1, 0, &[0xaa]);
        // The fifth frame must not arrive while the client is over its
        // window; it shows up only after the next encode call.
        peer.expect_quiet(Duration::from_millis(300));
        peer.expect(MsgType::Frame);
        peer.send_packet(1, 1, 1, 0, &[0xbb]);
    });

    let mut cfg = config(&server.addr);
    cfg.max_inflight = INFLIGHT;
    let mut encoder = Encoder::connect(cfg).unwrap();

    let (y, uv) = (luma(), chroma());
    for pts in 0..INFLIGHT as i64 {
        encoder.send_frame(Some(&frame(&y, &uv, pts, false))).unwrap();
    }
    assert_eq!(encoder.inflight(), INFLIGHT);

    // Window full: this call must drain a packet and hold the frame.
    let packet = encoder.encode(Some(&frame(&y, &uv, 99, false))).unwrap().unwrap();
    assert_eq!(packet.data, vec![0xaa]);
    assert_eq!(encoder.inflight(), INFLIGHT - 1);

    // The quiet window on the server proves no frame was smuggled out.
    let mut events = server.drain_events();
    while !matches!(events.last(), Some(Event::Quiet)) {
        events.push(server.next_event());
    }
    let frames_seen =
        events.iter().filter(|e| e.is_type(MsgType::Frame)).count();
    assert_eq!(frames_seen, INFLIGHT);

    // Now the window has room again and the frame goes through.
    let packet = encoder.encode(Some(&frame(&y, &uv, 99, false))).unwrap().unwrap();
    assert_eq!(packet.data, vec![0xbb]);

    drop(encoder);
    server.join();
}

#[test]
fn server_error_surfaces_as_io() {
    let server = MockServer::spawn(|peer| {
        peer.handshake();
        peer.expect(MsgType::Frame);
        peer.send_error(13, "encoder pipeline wedged");
    });

    let mut encoder = Encoder::connect(config(&server.addr)).unwrap();
    let (y, uv) = (luma(), chroma());
    let err = encoder.encode(Some(&frame(&y, &uv, 0, false))).unwrap_err();
    assert!(matches!(err, SessionError::Io(ref msg) if msg.contains("13")));

    drop(encoder);
    server.join();
}

#[test]
fn pings_are_answered_and_unknown_types_dropped() {
    let server = MockServer::spawn(|peer| {
        peer.handshake();
        peer.expect(MsgType::Frame);
        peer.send(MsgType::Ping, &[]);
        peer.send_raw(77, &[1, 2, 3]);
        peer.expect(MsgType::Pong);
        peer.send_packet(0, 0, 1, 0, &[0xcc]);
    });

    let mut encoder = Encoder::connect(config(&server.addr)).unwrap();
    let (y, uv) = (luma(), chroma());
    let packet = encoder.encode(Some(&frame(&y, &uv, 0, false))).unwrap().unwrap();
    assert_eq!(packet.data, vec![0xcc]);

    drop(encoder);
    server.join();
}

#[test]
fn lz4_frames_decompress_to_the_original_planes() {
    let server = MockServer::spawn(|peer| {
        peer.handshake();
        let payload = peer.expect(MsgType::Frame);
        let view = FrameView::parse(&payload).unwrap();

        // Strides and heights describe the uncompressed layout.
        assert_eq!(view.planes[0].stride, WIDTH);
        assert_eq!(view.planes[0].height, HEIGHT);

        let y: Vec<u8> = (0..WIDTH * HEIGHT).map(|i| i as u8).collect();
        let uv: Vec<u8> = (0..WIDTH * HEIGHT / 2).map(|i| 100 + i as u8).collect();
        let decoded_y =
            lz4_flex::block::decompress(view.planes[0].data, y.len()).unwrap();
        assert_eq!(decoded_y, y);
        let decoded_uv =
            lz4_flex::block::decompress(view.planes[1].data, uv.len()).unwrap();
        assert_eq!(decoded_uv, uv);

        peer.send_packet(0, 0, 1, 0, &[0xdd]);
    });

    let mut cfg = config(&server.addr);
    cfg.compression = WireCompression::Lz4;
    let mut encoder = Encoder::connect(cfg).unwrap();
    let (y, uv) = (luma(), chroma());
    let packet = encoder.encode(Some(&frame(&y, &uv, 0, false))).unwrap().unwrap();
    assert_eq!(packet.data, vec![0xdd]);

    drop(encoder);
    server.join();
}

#[test]
fn undersized_planes_are_rejected_before_sending() {
    let server = MockServer::spawn(|peer| {
        peer.handshake();
        peer.expect_quiet(Duration::from_millis(200));
    });

    let mut encoder = Encoder::connect(config(&server.addr)).unwrap();
    let y = vec![0u8; 4]; // far short of stride * height
    let uv = chroma();
    let err = encoder.send_frame(Some(&frame(&y, &uv, 0, false))).unwrap_err();
    assert!(matches!(err, SessionError::InvalidArgument(_)));

    // Hold the socket open until the server has proven nothing arrived.
    let mut quiet_seen = false;
    for _ in 0..3 {
        quiet_seen |= matches!(server.next_event(), Event::Quiet);
    }
    assert!(quiet_seen);

    drop(encoder);
    server.join();
}
