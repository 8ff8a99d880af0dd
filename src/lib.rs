//! # mcpipe
//!
//! A pipelined client for the memcached binary protocol with:
//! - Batches sent as one message, all but the last request in quiet form
//! - Lazy, ordered response streams (one response per request)
//! - A bounded connection pool with reader and writer threads per connection
//! - Pluggable value transcoding driven by the item flags
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Client                              │
//! │      get / set / mget / mset / incr / ... / multi_request    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Vec<Request>
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Dispatcher                             │
//! │          (quiet transform, opaque = batch index)             │
//! └──────────┬──────────────────────────────────▲───────────────┘
//!            │ checkout                         │ ResponseStream
//!            ▼                                  │
//!   ┌─────────────────┐   Batch      ┌──────────┴──────┐
//!   │  Pool<Conn>     │─────────────▶│ Writer / reader │
//!   │ (Mutex/Condvar) │◀─────────────│  (one per half) │
//!   └─────────────────┘   frames     └────────┬────────┘
//!                                             │ TCP
//!                                             ▼
//!                                     ┌─────────────┐
//!                                     │  memcached  │
//!                                     └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use mcpipe::{Client, StoreOptions};
//!
//! let client = Client::connect("127.0.0.1:11211")?;
//! client.set("greeting", "hello", StoreOptions::default())?;
//!
//! for response in client.mget(["greeting", "missing"])? {
//!     let response = response?;
//!     println!("{:?} -> {} {:?}", response.key, response.status, response.value);
//! }
//! # Ok::<(), mcpipe::CacheError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod transcoder;
pub mod network;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CacheError, Result};
pub use config::{Config, Credentials};
pub use client::{
    Client, CounterOptions, FlushOptions, Request, Response, ResponseStream, StoreOptions,
};
pub use transcoder::{RawTranscoder, Transcoder, TypedTranscoder, Value};
pub use protocol::{Opcode, Status};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of mcpipe
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
