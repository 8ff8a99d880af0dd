//! Client Module
//!
//! The public operation set, built on the pipelined dispatcher.
//!
//! Single-key operations are one-element batches whose stream is drained
//! internally. `mget`, `mset` and `multi_request` hand the lazy stream to
//! the caller.

mod request;
mod response;
mod stream;
mod dispatch;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::network::{Connection, Pool, PoolStats};
use crate::protocol::Opcode;
use crate::transcoder::{Transcoder, TypedTranscoder, Value};

pub use request::{CounterOptions, FlushOptions, Request, StoreOptions};
pub use response::Response;
pub use stream::ResponseStream;
pub use dispatch::{pipeline, Dispatcher};

/// Pooled, pipelining client for one server
///
/// Cloning is cheap and shares the pool.
#[derive(Clone)]
pub struct Client {
    dispatcher: Dispatcher,
    transcoder: Arc<dyn Transcoder>,
}

impl Client {
    /// Client for `addr` with default configuration
    pub fn connect(addr: impl Into<String>) -> Result<Self> {
        Self::with_config(Config::builder().addr(addr).build())
    }

    /// Client with the default `TypedTranscoder`
    pub fn with_config(config: Config) -> Result<Self> {
        Self::with_transcoder(config, Arc::new(TypedTranscoder))
    }

    /// Client with a custom transcoder
    ///
    /// Connections are opened lazily, on first checkout.
    pub fn with_transcoder(config: Config, transcoder: Arc<dyn Transcoder>) -> Result<Self> {
        config.validate()?;

        let pool_size = config.pool_size;
        let response_timeout = config.response_timeout;
        let ids = AtomicU64::new(0);
        let pool = Pool::new(pool_size, move || {
            Connection::open(ids.fetch_add(1, Ordering::Relaxed), &config)
        });

        tracing::debug!(pool_size, "client created");
        Ok(Self {
            dispatcher: Dispatcher::new(pool, Arc::clone(&transcoder), response_timeout),
            transcoder,
        })
    }

    // =========================================================================
    // Batches
    // =========================================================================

    /// Dispatch arbitrary requests as one pipelined batch
    pub fn multi_request(&self, requests: Vec<Request>) -> Result<ResponseStream> {
        self.dispatcher.dispatch(requests)
    }

    /// Fetch several keys; one response per key, in order
    pub fn mget<I, K>(&self, keys: I) -> Result<ResponseStream>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let requests = keys.into_iter().map(Request::get).collect();
        self.dispatcher.dispatch(requests)
    }

    /// Store several pairs with the same options
    ///
    /// Fails before anything is sent if any value cannot be encoded.
    pub fn mset<I, K, V>(&self, pairs: I, options: StoreOptions) -> Result<ResponseStream>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<[u8]>,
        V: Into<Value>,
    {
        let requests = pairs
            .into_iter()
            .map(|(key, value)| {
                Request::store(
                    Opcode::Set,
                    key,
                    &value.into(),
                    options,
                    self.transcoder.as_ref(),
                )
            })
            .collect::<Result<Vec<_>>>()?;
        self.dispatcher.dispatch(requests)
    }

    // =========================================================================
    // Single operations
    // =========================================================================

    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Response> {
        self.single(Request::get(key))
    }

    pub fn set(
        &self,
        key: impl AsRef<[u8]>,
        value: impl Into<Value>,
        options: StoreOptions,
    ) -> Result<Response> {
        self.store(Opcode::Set, key, value.into(), options)
    }

    /// Store only if the key is absent
    pub fn add(
        &self,
        key: impl AsRef<[u8]>,
        value: impl Into<Value>,
        options: StoreOptions,
    ) -> Result<Response> {
        self.store(Opcode::Add, key, value.into(), options)
    }

    /// Store only if the key is present
    pub fn replace(
        &self,
        key: impl AsRef<[u8]>,
        value: impl Into<Value>,
        options: StoreOptions,
    ) -> Result<Response> {
        self.store(Opcode::Replace, key, value.into(), options)
    }

    pub fn append(&self, key: impl AsRef<[u8]>, value: impl Into<Value>) -> Result<Response> {
        let request =
            Request::concat(Opcode::Append, key, &value.into(), self.transcoder.as_ref())?;
        self.single(request)
    }

    pub fn prepend(&self, key: impl AsRef<[u8]>, value: impl Into<Value>) -> Result<Response> {
        let request =
            Request::concat(Opcode::Prepend, key, &value.into(), self.transcoder.as_ref())?;
        self.single(request)
    }

    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<Response> {
        self.single(Request::delete(key))
    }

    /// On success the response value is `Value::Integer` with the new count
    pub fn increment(
        &self,
        key: impl AsRef<[u8]>,
        amount: u64,
        options: CounterOptions,
    ) -> Result<Response> {
        self.counter(Opcode::Increment, key, amount, options)
    }

    /// Counters never go below zero on the server
    pub fn decrement(
        &self,
        key: impl AsRef<[u8]>,
        amount: u64,
        options: CounterOptions,
    ) -> Result<Response> {
        self.counter(Opcode::Decrement, key, amount, options)
    }

    pub fn flush(&self, options: FlushOptions) -> Result<Response> {
        self.single(Request::flush(options))
    }

    pub fn version(&self) -> Result<Response> {
        self.single(Request::version())
    }

    pub fn noop(&self) -> Result<Response> {
        self.single(Request::noop())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close idle connections and refuse new operations
    ///
    /// Connections held by live streams close when those streams end.
    pub fn close(&self) {
        self.dispatcher.pool().close();
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.dispatcher.pool().stats()
    }

    fn store(
        &self,
        opcode: Opcode,
        key: impl AsRef<[u8]>,
        value: Value,
        options: StoreOptions,
    ) -> Result<Response> {
        let request = Request::store(opcode, key, &value, options, self.transcoder.as_ref())?;
        self.single(request)
    }

    fn counter(
        &self,
        opcode: Opcode,
        key: impl AsRef<[u8]>,
        amount: u64,
        options: CounterOptions,
    ) -> Result<Response> {
        let request = Request::counter(opcode, key, amount, options)?;
        self.single(request).map(Response::into_counter)
    }

    fn single(&self, request: Request) -> Result<Response> {
        let mut stream = self.dispatcher.dispatch(vec![request])?;
        stream.next().unwrap_or_else(|| {
            Err(CacheError::Protocol("batch ended without a response".to_string()))
        })
    }
}
