//! Transcoder Module
//!
//! Maps application values to flagged bytes on write, and back on read.
//!
//! The 32-bit flags travel with the item in the store extras and come back
//! in the GET response extras, so heterogeneous values survive a trip
//! through an untyped byte store.
//!
//! ## Laws
//! - `encode` is deterministic for structurally equal values
//! - `decode(encode(v)) == v` for every flag the encoder produces
//! - unknown flags fail with `CacheError::UnknownFlag`, never panic

mod value;
mod typed;
mod raw;

use bytes::Bytes;

use crate::error::Result;

pub use value::Value;
pub use typed::TypedTranscoder;
pub use raw::RawTranscoder;

/// Raw bytes
pub const FLAG_RAW: u32 = 0;
/// UTF-8 text
pub const FLAG_TEXT: u32 = 1;
/// ASCII decimal unsigned integer
pub const FLAG_INTEGER: u32 = 2;
/// bincode-serialized list or map
pub const FLAG_STRUCTURED: u32 = 3;

/// Value <-> (bytes, flags) conversion
pub trait Transcoder: Send + Sync {
    /// Encode a value, returning its bytes and type flag
    fn encode(&self, value: &Value) -> Result<(Bytes, u32)>;

    /// Decode bytes stored under `flags`
    fn decode(&self, bytes: Bytes, flags: u32) -> Result<Value>;
}
