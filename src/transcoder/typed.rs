//! Typed transcoder
//!
//! Tags every value with a flag describing how its bytes were produced.
//!
//! | Flag | Value             | Encoding                 |
//! |------|-------------------|--------------------------|
//! | 0    | `Bytes`           | as-is                    |
//! | 1    | `Text`            | UTF-8                    |
//! | 2    | `Integer`         | ASCII decimal            |
//! | 3    | `List` / `Map`    | bincode                  |
//!
//! Integers use ASCII decimal because that is what the server's incr/decr
//! read and write, so a counter created by `set` can be incremented and a
//! counter created by `increment` can be fetched with `get`.

use bytes::Bytes;

use crate::error::{CacheError, Result};
use super::{Transcoder, Value, FLAG_INTEGER, FLAG_RAW, FLAG_STRUCTURED, FLAG_TEXT};

/// Default transcoder for heterogeneous values
#[derive(Debug, Clone, Copy, Default)]
pub struct TypedTranscoder;

impl Transcoder for TypedTranscoder {
    fn encode(&self, value: &Value) -> Result<(Bytes, u32)> {
        match value {
            Value::Bytes(bytes) => Ok((bytes.clone(), FLAG_RAW)),
            Value::Text(text) => Ok((Bytes::copy_from_slice(text.as_bytes()), FLAG_TEXT)),
            Value::Integer(n) => Ok((Bytes::from(n.to_string()), FLAG_INTEGER)),
            Value::List(_) | Value::Map(_) => {
                let encoded = bincode::serialize(value)
                    .map_err(|e| CacheError::Transcode(format!("bincode encode: {}", e)))?;
                Ok((Bytes::from(encoded), FLAG_STRUCTURED))
            }
        }
    }

    fn decode(&self, bytes: Bytes, flags: u32) -> Result<Value> {
        match flags {
            FLAG_RAW => Ok(Value::Bytes(bytes)),
            FLAG_TEXT => String::from_utf8(bytes.to_vec())
                .map(Value::Text)
                .map_err(|e| CacheError::Transcode(format!("invalid UTF-8: {}", e))),
            FLAG_INTEGER => parse_decimal(&bytes).map(Value::Integer),
            FLAG_STRUCTURED => {
                let value: Value = bincode::deserialize(&bytes)
                    .map_err(|e| CacheError::Transcode(format!("bincode decode: {}", e)))?;
                match value {
                    Value::List(_) | Value::Map(_) => Ok(value),
                    other => Err(CacheError::Transcode(format!(
                        "structured flag on scalar payload: {:?}",
                        other
                    ))),
                }
            }
            other => Err(CacheError::UnknownFlag(other)),
        }
    }
}

/// Parse an ASCII decimal u64. The server may pad incr/decr results with
/// trailing spaces, so those are ignored.
fn parse_decimal(bytes: &[u8]) -> Result<u64> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| CacheError::Transcode(format!("integer is not ASCII: {}", e)))?;
    text.trim_end()
        .parse::<u64>()
        .map_err(|e| CacheError::Transcode(format!("invalid integer {:?}: {}", text, e)))
}
