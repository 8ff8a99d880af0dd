//! Error types for mcpipe
//!
//! Provides a unified error type for all client operations.
//!
//! Protocol-level statuses (key not found, not stored, ...) are NOT errors:
//! they travel back to the caller inside `Response::status`.

use thiserror::Error;

/// Result type alias using CacheError
pub type Result<T> = std::result::Result<T, CacheError>;

/// Unified error type for mcpipe operations
#[derive(Debug, Error)]
pub enum CacheError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Transport Errors
    // -------------------------------------------------------------------------
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Timed out waiting for a response frame")]
    Timeout,

    #[error("Authentication failed: {0}")]
    Auth(String),

    // -------------------------------------------------------------------------
    // Pool Errors
    // -------------------------------------------------------------------------
    #[error("Connection pool is closed")]
    PoolClosed,

    // -------------------------------------------------------------------------
    // Transcoding Errors
    // -------------------------------------------------------------------------
    #[error("Transcode error: {0}")]
    Transcode(String),

    #[error("Unknown type flag: {0}")]
    UnknownFlag(u32),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// Returns true if the error leaves the connection in an unknown state.
    ///
    /// Such connections are discarded by the pool rather than reused.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            CacheError::Io(_)
                | CacheError::Transport(_)
                | CacheError::Protocol(_)
                | CacheError::Timeout
                | CacheError::Auth(_)
        )
    }
}
