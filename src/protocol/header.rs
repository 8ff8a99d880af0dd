//! Fixed 24-byte packet headers
//!
//! ```text
//! Byte/     0       |       1       |       2       |       3       |
//!   +---------------+---------------+---------------+---------------+
//!  0| Magic         | Opcode        | Key length                    |
//!   +---------------+---------------+---------------+---------------+
//!  4| Extras length | Data type     | vbucket id / status           |
//!   +---------------+---------------+---------------+---------------+
//!  8| Total body length                                             |
//!   +---------------+---------------+---------------+---------------+
//! 12| Opaque                                                        |
//!   +---------------+---------------+---------------+---------------+
//! 16| CAS                                                           |
//!   |                                                               |
//!   +---------------+---------------+---------------+---------------+
//! ```

use crate::error::{CacheError, Result};
use super::{Opcode, Status};

/// Magic byte for request packets
pub const REQUEST_MAGIC: u8 = 0x80;

/// Magic byte for response packets
pub const RESPONSE_MAGIC: u8 = 0x81;

/// Header size for both directions
pub const HEADER_SIZE: usize = 24;

/// Request header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub opcode: Opcode,
    pub key_length: u16,
    pub extras_length: u8,
    pub vbucket_id: u16,
    /// extras + key + value
    pub total_body_length: u32,
    pub opaque: u32,
    pub cas: u64,
}

impl RequestHeader {
    /// Append the encoded header to `out`
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(REQUEST_MAGIC);
        out.push(self.opcode.as_u8());
        out.extend_from_slice(&self.key_length.to_be_bytes());
        out.push(self.extras_length);
        out.push(0); // data type, reserved
        out.extend_from_slice(&self.vbucket_id.to_be_bytes());
        out.extend_from_slice(&self.total_body_length.to_be_bytes());
        out.extend_from_slice(&self.opaque.to_be_bytes());
        out.extend_from_slice(&self.cas.to_be_bytes());
    }

    /// Parse a request header
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let raw = RawHeader::split(bytes, REQUEST_MAGIC)?;
        Ok(Self {
            opcode: raw.opcode()?,
            key_length: raw.key_length,
            extras_length: raw.extras_length,
            vbucket_id: raw.vbucket_or_status,
            total_body_length: raw.total_body_length,
            opaque: raw.opaque,
            cas: raw.cas,
        })
    }
}

/// Response header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub opcode: Opcode,
    pub key_length: u16,
    pub extras_length: u8,
    pub data_type: u8,
    pub status: Status,
    pub total_body_length: u32,
    pub opaque: u32,
    pub cas: u64,
}

impl ResponseHeader {
    /// Create a header with every length field zero
    pub fn new(opcode: Opcode, status: Status) -> Self {
        Self {
            opcode,
            key_length: 0,
            extras_length: 0,
            data_type: 0,
            status,
            total_body_length: 0,
            opaque: 0,
            cas: 0,
        }
    }

    /// Append the encoded header to `out`
    ///
    /// Fails for `Status::TranscodeError`, which has no wire code.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        let status = self.status.code().ok_or_else(|| {
            CacheError::Protocol(format!("status {} cannot be encoded", self.status))
        })?;
        out.push(RESPONSE_MAGIC);
        out.push(self.opcode.as_u8());
        out.extend_from_slice(&self.key_length.to_be_bytes());
        out.push(self.extras_length);
        out.push(self.data_type);
        out.extend_from_slice(&status.to_be_bytes());
        out.extend_from_slice(&self.total_body_length.to_be_bytes());
        out.extend_from_slice(&self.opaque.to_be_bytes());
        out.extend_from_slice(&self.cas.to_be_bytes());
        Ok(())
    }

    /// Parse a response header
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let raw = RawHeader::split(bytes, RESPONSE_MAGIC)?;
        let status = Status::from_u16(raw.vbucket_or_status).ok_or_else(|| {
            CacheError::Protocol(format!(
                "Unknown response status: 0x{:04x}",
                raw.vbucket_or_status
            ))
        })?;
        Ok(Self {
            opcode: raw.opcode()?,
            key_length: raw.key_length,
            extras_length: raw.extras_length,
            data_type: raw.data_type,
            status,
            total_body_length: raw.total_body_length,
            opaque: raw.opaque,
            cas: raw.cas,
        })
    }

    /// Length of the value section
    pub fn value_length(&self) -> Result<usize> {
        body_value_length(self.total_body_length, self.extras_length, self.key_length)
    }
}

/// Value length derived from the body length, rejecting inconsistent headers
pub(crate) fn body_value_length(total: u32, extras: u8, key: u16) -> Result<usize> {
    (total as usize)
        .checked_sub(extras as usize + key as usize)
        .ok_or_else(|| {
            CacheError::Protocol(format!(
                "Body length {} shorter than extras {} + key {}",
                total, extras, key
            ))
        })
}

/// Fields shared by both header layouts
struct RawHeader {
    opcode: u8,
    key_length: u16,
    extras_length: u8,
    data_type: u8,
    vbucket_or_status: u16,
    total_body_length: u32,
    opaque: u32,
    cas: u64,
}

impl RawHeader {
    fn split(bytes: &[u8], magic: u8) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(CacheError::Protocol(format!(
                "Incomplete header: expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }
        if bytes[0] != magic {
            return Err(CacheError::Protocol(format!(
                "Bad magic byte: 0x{:02x} (expected 0x{:02x})",
                bytes[0], magic
            )));
        }

        let mut cas = [0u8; 8];
        cas.copy_from_slice(&bytes[16..24]);

        Ok(Self {
            opcode: bytes[1],
            key_length: u16::from_be_bytes([bytes[2], bytes[3]]),
            extras_length: bytes[4],
            data_type: bytes[5],
            vbucket_or_status: u16::from_be_bytes([bytes[6], bytes[7]]),
            total_body_length: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            opaque: u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
            cas: u64::from_be_bytes(cas),
        })
    }

    fn opcode(&self) -> Result<Opcode> {
        Opcode::from_u8(self.opcode)
            .ok_or_else(|| CacheError::Protocol(format!("Unknown opcode: 0x{:02x}", self.opcode)))
    }
}
