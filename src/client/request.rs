//! Request definitions
//!
//! Logical operations before the quiet transform, with their extras laid
//! out the way the protocol expects (all integers big-endian).
//!
//! | Operation            | Extras                                   |
//! |----------------------|------------------------------------------|
//! | set / add / replace  | flags (4) + expires (4)                  |
//! | incr / decr          | delta (8) + initial (8) + expires (4)    |
//! | flush                | expires (4)                              |
//! | everything else      | none                                     |

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CacheError, Result};
use crate::protocol::{Opcode, WireRequest};
use crate::transcoder::{Transcoder, Value};

/// Options for set/add/replace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOptions {
    /// Expiry in seconds (or a unix timestamp past 30 days); 0 never expires
    pub expires: u32,
    /// Only store if the item's CAS matches; 0 disables the check
    pub cas: u64,
}

impl StoreOptions {
    pub fn expires(mut self, seconds: u32) -> Self {
        self.expires = seconds;
        self
    }

    pub fn cas(mut self, cas: u64) -> Self {
        self.cas = cas;
        self
    }
}

/// Options for increment/decrement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterOptions {
    /// Value stored when the key is missing
    pub initial_value: u64,
    /// Expiry of a newly created counter
    pub expires: u32,
}

impl CounterOptions {
    pub fn initial_value(mut self, value: u64) -> Self {
        self.initial_value = value;
        self
    }

    pub fn expires(mut self, seconds: u32) -> Self {
        self.expires = seconds;
        self
    }
}

/// Options for flush
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOptions {
    /// Delay before the flush takes effect; 0 is immediate
    pub expires: u32,
}

impl FlushOptions {
    pub fn expires(mut self, seconds: u32) -> Self {
        self.expires = seconds;
        self
    }
}

/// One logical operation
///
/// Immutable once built; `value` already holds the transcoded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub opcode: Opcode,
    pub key: Bytes,
    pub value: Bytes,
    pub extras: Bytes,
    pub cas: u64,
}

impl Request {
    fn keyed(opcode: Opcode, key: &[u8]) -> Self {
        Self {
            opcode,
            key: Bytes::copy_from_slice(key),
            value: Bytes::new(),
            extras: Bytes::new(),
            cas: 0,
        }
    }

    fn bare(opcode: Opcode) -> Self {
        Self::keyed(opcode, &[])
    }

    pub fn get(key: impl AsRef<[u8]>) -> Self {
        Self::keyed(Opcode::Get, key.as_ref())
    }

    /// set/add/replace; fails only if the transcoder rejects the value
    pub fn store(
        opcode: Opcode,
        key: impl AsRef<[u8]>,
        value: &Value,
        options: StoreOptions,
        transcoder: &dyn Transcoder,
    ) -> Result<Self> {
        check_opcode(opcode, opcode.is_store(), "store")?;
        let (encoded, flags) = transcoder.encode(value)?;

        let mut extras = BytesMut::with_capacity(8);
        extras.put_u32(flags);
        extras.put_u32(options.expires);

        Ok(Self {
            opcode,
            key: Bytes::copy_from_slice(key.as_ref()),
            value: encoded,
            extras: extras.freeze(),
            cas: options.cas,
        })
    }

    /// append/prepend
    ///
    /// The value is transcoded but its flag is dropped: the server keeps the
    /// flags of the existing item and rejects extras on these opcodes.
    pub fn concat(
        opcode: Opcode,
        key: impl AsRef<[u8]>,
        value: &Value,
        transcoder: &dyn Transcoder,
    ) -> Result<Self> {
        let is_concat = matches!(opcode.to_loud(), Opcode::Append | Opcode::Prepend);
        check_opcode(opcode, is_concat, "append/prepend")?;
        let (encoded, _flags) = transcoder.encode(value)?;
        let mut request = Self::keyed(opcode, key.as_ref());
        request.value = encoded;
        Ok(request)
    }

    pub fn delete(key: impl AsRef<[u8]>) -> Self {
        Self::keyed(Opcode::Delete, key.as_ref())
    }

    /// increment/decrement by `amount`
    pub fn counter(
        opcode: Opcode,
        key: impl AsRef<[u8]>,
        amount: u64,
        options: CounterOptions,
    ) -> Result<Self> {
        check_opcode(opcode, opcode.is_counter(), "counter")?;
        let mut extras = BytesMut::with_capacity(20);
        extras.put_u64(amount);
        extras.put_u64(options.initial_value);
        extras.put_u32(options.expires);

        let mut request = Self::keyed(opcode, key.as_ref());
        request.extras = extras.freeze();
        Ok(request)
    }

    pub fn flush(options: FlushOptions) -> Self {
        let mut request = Self::bare(Opcode::Flush);
        request.extras = Bytes::copy_from_slice(&options.expires.to_be_bytes());
        request
    }

    pub fn version() -> Self {
        Self::bare(Opcode::Version)
    }

    pub fn noop() -> Self {
        Self::bare(Opcode::Noop)
    }

    /// Wire form under `opcode` (the request's own or its quiet variant)
    pub(crate) fn to_wire(&self, opcode: Opcode, opaque: u32) -> WireRequest {
        WireRequest {
            opcode,
            opaque,
            key: self.key.clone(),
            extras: self.extras.clone(),
            value: self.value.clone(),
            cas: self.cas,
        }
    }
}

fn check_opcode(opcode: Opcode, valid: bool, kind: &str) -> Result<()> {
    if valid {
        Ok(())
    } else {
        Err(CacheError::Protocol(format!("{:?} is not a {} opcode", opcode, kind)))
    }
}
