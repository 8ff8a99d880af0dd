//! Network Module
//!
//! Connections, their worker threads, and the pool that shares them.
//!
//! ## Architecture
//! - A writer and a reader thread per pooled connection, one per socket half
//! - Batches go to the writer over a channel; frames come back from the reader
//! - The pool hands each connection to one batch at a time

mod connection;
mod worker;
pub mod pool;

pub use connection::Connection;
pub use worker::{Batch, BatchFrame};
pub use pool::{Pool, PoolStats, Pooled};

/// A pooled connection, exclusively owned while checked out
pub type PooledConnection = Pooled<Connection>;
