//! Raw transcoder
//!
//! Bytes in, bytes out. Anything that is not `Value::Bytes` is refused.

use bytes::Bytes;

use crate::error::{CacheError, Result};
use super::{Transcoder, Value, FLAG_RAW};

#[derive(Debug, Clone, Copy, Default)]
pub struct RawTranscoder;

impl Transcoder for RawTranscoder {
    fn encode(&self, value: &Value) -> Result<(Bytes, u32)> {
        match value {
            Value::Bytes(bytes) => Ok((bytes.clone(), FLAG_RAW)),
            other => Err(CacheError::Transcode(format!(
                "raw transcoder only stores bytes, got {:?}",
                other
            ))),
        }
    }

    fn decode(&self, bytes: Bytes, flags: u32) -> Result<Value> {
        match flags {
            FLAG_RAW => Ok(Value::Bytes(bytes)),
            other => Err(CacheError::UnknownFlag(other)),
        }
    }
}
