//! Response definitions
//!
//! One `Response` per logical request, whatever the server actually sent.

use bytes::Bytes;

use crate::protocol::{Frame, Status};
use crate::transcoder::{Transcoder, Value};

/// Outcome of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub key: Bytes,
    /// Decoded value for gets, raw bytes otherwise
    pub value: Value,
    pub extras: Bytes,
    pub status: Status,
    pub cas: u64,
    /// Type flag of a decoded value
    pub data_type: Option<u32>,
}

impl Response {
    /// Wrap a frame. Falls back to the request key, since plain GET
    /// responses do not echo it.
    pub(crate) fn from_frame(frame: Frame, request_key: &Bytes) -> Self {
        let key = if frame.key.is_empty() {
            request_key.clone()
        } else {
            frame.key
        };
        Self {
            key,
            value: Value::Bytes(frame.value),
            extras: frame.extras,
            status: frame.header.status,
            cas: frame.header.cas,
            data_type: None,
        }
    }

    /// Stand-in for a quiet request the server did not answer
    pub(crate) fn silent(status: Status, key: &Bytes) -> Self {
        Self {
            key: key.clone(),
            value: Value::empty(),
            extras: Bytes::new(),
            status,
            cas: 0,
            data_type: None,
        }
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    /// Type flag carried in the extras of a GET response
    pub fn flags(&self) -> Option<u32> {
        let raw: [u8; 4] = self.extras.get(..4)?.try_into().ok()?;
        Some(u32::from_be_bytes(raw))
    }

    /// Decode a GET value in place
    ///
    /// Decode failures do not abort anything: they turn this response alone
    /// into a `TranscodeError` carrying a diagnostic text.
    pub(crate) fn decode_value(&mut self, transcoder: &dyn Transcoder) {
        if self.extras.is_empty() {
            return;
        }
        let Some(flags) = self.flags() else {
            self.fail_transcode(format!("malformed flags: {} extras bytes", self.extras.len()));
            return;
        };

        let raw = match &self.value {
            Value::Bytes(bytes) => bytes.clone(),
            _ => return,
        };
        match transcoder.decode(raw, flags) {
            Ok(value) => {
                self.value = value;
                self.data_type = Some(flags);
            }
            Err(e) => {
                tracing::debug!(key = ?self.key, flags, "value decode failed: {}", e);
                self.fail_transcode(e.to_string());
            }
        }
    }

    /// Reinterpret an 8-byte incr/decr result as a big-endian u64
    pub(crate) fn into_counter(mut self) -> Self {
        if !self.is_ok() {
            return self;
        }
        if let Value::Bytes(bytes) = &self.value {
            if let Ok(raw) = <[u8; 8]>::try_from(&bytes[..]) {
                self.value = Value::Integer(u64::from_be_bytes(raw));
            }
        }
        self
    }

    fn fail_transcode(&mut self, reason: String) {
        self.status = Status::TranscodeError;
        self.value = Value::Text(reason);
        self.data_type = None;
    }
}
