//! Protocol Module
//!
//! Wire definitions for the memcached binary protocol.
//!
//! ## Packet Format
//! ```text
//! ┌──────────────┬──────────┬──────────┬──────────────────────┐
//! │ Header (24)  │  Extras  │   Key    │        Value         │
//! └──────────────┴──────────┴──────────┴──────────────────────┘
//! ```
//!
//! ### Pipelining
//! Quiet opcodes (GETQ, SETQ, ...) make the server skip the response a
//! caller does not need: misses for GETQ, successes for the mutations.
//! Errors are always answered. A batch sends every request but the last in
//! its quiet form, so the loud final request closes the exchange.
//!
//! ### Opaque
//! The client stores the request's index within its batch in the opaque
//! field, which the server echoes back. Gaps in the echoed sequence are the
//! suppressed quiet responses.

mod opcode;
mod status;
mod header;
mod codec;

pub use opcode::Opcode;
pub use status::Status;
pub use header::{RequestHeader, ResponseHeader, HEADER_SIZE, REQUEST_MAGIC, RESPONSE_MAGIC};
pub use codec::{
    encode_frame, encode_request, read_frame, read_request, write_frame, Frame, WireRequest,
    MAX_BODY_SIZE,
};
