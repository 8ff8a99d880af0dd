//! Protocol codec
//!
//! Encoding and decoding of complete packets (header + body).
//!
//! ## Packet Format
//! ```text
//! ┌──────────────┬──────────┬──────────┬──────────────────────┐
//! │ Header (24)  │  Extras  │   Key    │        Value         │
//! └──────────────┴──────────┴──────────┴──────────────────────┘
//! ```

use std::io::{Read, Write};

use bytes::Bytes;

use crate::error::{CacheError, Result};
use super::header::{body_value_length, RequestHeader, ResponseHeader, HEADER_SIZE};
use super::Opcode;

/// Maximum body size accepted from the wire (32 MB)
pub const MAX_BODY_SIZE: u32 = 32 * 1024 * 1024;

/// A request as it goes on the wire, after the quiet transform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    pub opcode: Opcode,
    /// Index of the request within its batch
    pub opaque: u32,
    pub key: Bytes,
    pub extras: Bytes,
    pub value: Bytes,
    pub cas: u64,
}

/// A decoded response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: ResponseHeader,
    pub key: Bytes,
    pub extras: Bytes,
    pub value: Bytes,
}

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Append an encoded request packet to `out`
pub fn encode_request(request: &WireRequest, out: &mut Vec<u8>) -> Result<()> {
    let key_length = u16::try_from(request.key.len())
        .map_err(|_| CacheError::Protocol(format!("Key too long: {} bytes", request.key.len())))?;
    let extras_length = u8::try_from(request.extras.len()).map_err(|_| {
        CacheError::Protocol(format!("Extras too long: {} bytes", request.extras.len()))
    })?;
    let body = request.extras.len() + request.key.len() + request.value.len();
    let total_body_length = u32::try_from(body)
        .ok()
        .filter(|len| *len <= MAX_BODY_SIZE)
        .ok_or_else(|| CacheError::Protocol(format!("Body too large: {} bytes", body)))?;

    let header = RequestHeader {
        opcode: request.opcode,
        key_length,
        extras_length,
        vbucket_id: 0,
        total_body_length,
        opaque: request.opaque,
        cas: request.cas,
    };

    out.reserve(HEADER_SIZE + body);
    header.encode(out);
    out.extend_from_slice(&request.extras);
    out.extend_from_slice(&request.key);
    out.extend_from_slice(&request.value);
    Ok(())
}

/// Read one complete request packet from a stream
///
/// Used by servers and test doubles; the client never reads requests.
pub fn read_request<R: Read>(reader: &mut R) -> Result<WireRequest> {
    let mut head = [0u8; HEADER_SIZE];
    reader.read_exact(&mut head)?;
    let header = RequestHeader::parse(&head)?;

    let value_length = body_value_length(
        header.total_body_length,
        header.extras_length,
        header.key_length,
    )?;
    let (extras, key, value) = read_body(
        reader,
        header.total_body_length,
        header.extras_length as usize,
        header.key_length as usize,
        value_length,
    )?;

    Ok(WireRequest {
        opcode: header.opcode,
        opaque: header.opaque,
        key,
        extras,
        value,
        cas: header.cas,
    })
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Append an encoded response packet to `out`
///
/// Length fields in `frame.header` are recomputed from the body sections.
pub fn encode_frame(frame: &Frame, out: &mut Vec<u8>) -> Result<()> {
    let mut header = frame.header;
    header.key_length = u16::try_from(frame.key.len())
        .map_err(|_| CacheError::Protocol("Key too long".to_string()))?;
    header.extras_length = u8::try_from(frame.extras.len())
        .map_err(|_| CacheError::Protocol("Extras too long".to_string()))?;
    let body = frame.extras.len() + frame.key.len() + frame.value.len();
    header.total_body_length = u32::try_from(body)
        .ok()
        .filter(|len| *len <= MAX_BODY_SIZE)
        .ok_or_else(|| CacheError::Protocol(format!("Body too large: {} bytes", body)))?;

    header.encode(out)?;
    out.extend_from_slice(&frame.extras);
    out.extend_from_slice(&frame.key);
    out.extend_from_slice(&frame.value);
    Ok(())
}

/// Read one complete response packet from a stream
///
/// Blocks until the whole packet is received or an error occurs
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Frame> {
    let mut head = [0u8; HEADER_SIZE];
    reader.read_exact(&mut head)?;
    let header = ResponseHeader::parse(&head)?;

    let value_length = header.value_length()?;
    let (extras, key, value) = read_body(
        reader,
        header.total_body_length,
        header.extras_length as usize,
        header.key_length as usize,
        value_length,
    )?;

    Ok(Frame {
        header,
        key,
        extras,
        value,
    })
}

/// Write one response packet to a stream
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<()> {
    let mut out = Vec::with_capacity(HEADER_SIZE + frame.value.len());
    encode_frame(frame, &mut out)?;
    writer.write_all(&out)?;
    writer.flush()?;
    Ok(())
}

fn read_body<R: Read>(
    reader: &mut R,
    total: u32,
    extras_length: usize,
    key_length: usize,
    value_length: usize,
) -> Result<(Bytes, Bytes, Bytes)> {
    if total > MAX_BODY_SIZE {
        return Err(CacheError::Protocol(format!(
            "Body too large: {} bytes (max {})",
            total, MAX_BODY_SIZE
        )));
    }

    let mut body = vec![0u8; total as usize];
    if !body.is_empty() {
        reader.read_exact(&mut body)?;
    }

    let mut body = Bytes::from(body);
    let extras = body.split_to(extras_length);
    let key = body.split_to(key_length);
    debug_assert_eq!(body.len(), value_length);
    Ok((extras, key, body))
}
