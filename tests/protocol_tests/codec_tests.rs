//! Codec Tests
//!
//! Packet encoding/decoding against known wire bytes.

use std::io::Cursor;

use bytes::Bytes;
use mcpipe::protocol::{
    encode_frame, encode_request, read_frame, read_request, write_frame, Frame, Opcode,
    RequestHeader, ResponseHeader, Status, WireRequest, HEADER_SIZE,
};
use mcpipe::CacheError;

fn get_request(key: &'static [u8], opaque: u32) -> WireRequest {
    WireRequest {
        opcode: Opcode::Get,
        opaque,
        key: Bytes::from_static(key),
        extras: Bytes::new(),
        value: Bytes::new(),
        cas: 0,
    }
}

// =============================================================================
// Request Encoding Tests
// =============================================================================

#[test]
fn test_get_request_bytes() {
    let mut out = Vec::new();
    encode_request(&get_request(b"Hello", 0), &mut out).unwrap();

    let expected: [u8; 29] = [
        0x80, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, b'H', b'e', b'l', b'l',
        b'o',
    ];
    assert_eq!(out, expected);
}

#[test]
fn test_opaque_and_cas_big_endian() {
    let mut request = get_request(b"k", 0x0102_0304);
    request.cas = 0x0A0B_0C0D_0E0F_1011;

    let mut out = Vec::new();
    encode_request(&request, &mut out).unwrap();

    assert_eq!(&out[12..16], &[0x01, 0x02, 0x03, 0x04]);
    assert_eq!(&out[16..24], &[0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10, 0x11]);
}

#[test]
fn test_batch_concatenates_packets() {
    let mut out = Vec::new();
    encode_request(&get_request(b"a", 0), &mut out).unwrap();
    encode_request(&get_request(b"bb", 1), &mut out).unwrap();
    assert_eq!(out.len(), 2 * HEADER_SIZE + 3);

    let mut cursor = Cursor::new(out);
    assert_eq!(read_request(&mut cursor).unwrap().opaque, 0);
    let second = read_request(&mut cursor).unwrap();
    assert_eq!(second.opaque, 1);
    assert_eq!(&second.key[..], b"bb");
}

#[test]
fn test_request_header_rejects_response_magic() {
    let mut bytes = [0u8; HEADER_SIZE];
    bytes[0] = 0x81;
    assert!(matches!(RequestHeader::parse(&bytes), Err(CacheError::Protocol(_))));
}

// =============================================================================
// Response Decoding Tests
// =============================================================================

#[test]
fn test_get_hit_response_bytes() {
    let bytes: Vec<u8> = vec![
        0x81, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x09, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xDE, 0xAD, 0xBE, 0xEF,
        b'W', b'o', b'r', b'l', b'd',
    ];
    let frame = read_frame(&mut Cursor::new(bytes)).unwrap();

    assert_eq!(frame.header.opcode, Opcode::Get);
    assert_eq!(frame.header.status, Status::Ok);
    assert_eq!(frame.header.cas, 1);
    assert_eq!(&frame.extras[..], &[0xDE, 0xAD, 0xBE, 0xEF]);
    assert!(frame.key.is_empty());
    assert_eq!(&frame.value[..], b"World");
}

#[test]
fn test_miss_response_status() {
    let mut header = ResponseHeader::new(Opcode::Get, Status::KeyNotFound);
    header.opaque = 3;
    let frame = Frame {
        header,
        key: Bytes::new(),
        extras: Bytes::new(),
        value: Bytes::from_static(b"Not found"),
    };

    let mut out = Vec::new();
    write_frame(&mut out, &frame).unwrap();
    assert_eq!(&out[6..8], &[0x00, 0x01]);

    let decoded = read_frame(&mut Cursor::new(out)).unwrap();
    assert_eq!(decoded.header.status, Status::KeyNotFound);
    assert_eq!(decoded.header.opaque, 3);
}

#[test]
fn test_unknown_status_is_protocol_error() {
    let mut bytes = vec![0u8; HEADER_SIZE];
    bytes[0] = 0x81;
    bytes[6] = 0x7F;
    bytes[7] = 0x7F;
    assert!(matches!(read_frame(&mut Cursor::new(bytes)), Err(CacheError::Protocol(_))));
}

#[test]
fn test_inconsistent_lengths_rejected() {
    let mut bytes = vec![0u8; HEADER_SIZE];
    bytes[0] = 0x81;
    bytes[4] = 8; // extras longer than the whole body
    bytes[11] = 4;
    bytes.extend_from_slice(&[0; 4]);
    assert!(matches!(read_frame(&mut Cursor::new(bytes)), Err(CacheError::Protocol(_))));
}

#[test]
fn test_transcode_status_not_encodable() {
    let frame = Frame {
        header: ResponseHeader::new(Opcode::Get, Status::TranscodeError),
        key: Bytes::new(),
        extras: Bytes::new(),
        value: Bytes::new(),
    };
    assert!(encode_frame(&frame, &mut Vec::new()).is_err());
}

#[test]
fn test_empty_stream_is_io_error() {
    let result = read_frame(&mut Cursor::new(Vec::<u8>::new()));
    assert!(matches!(result, Err(CacheError::Io(_))));
}
