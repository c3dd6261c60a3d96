//! Fuzz target for MsgHeader::parse
//!
//! Arbitrary bytes must never panic the header parser: short buffers, bad
//! magic, and bad versions all return an error, and anything that parses
//! must re-serialize to the same 12 bytes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vtlink_proto::MsgHeader;

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = MsgHeader::parse(data) {
        assert_eq!(&header.to_bytes()[..], &data[..MsgHeader::SIZE]);
    }
});
