//! Configuration for mcpipe
//!
//! Centralized configuration with sensible defaults.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Main configuration for a mcpipe client
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Server address (host:port)
    pub addr: String,

    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// Maximum time a single pull on a response stream waits for a frame.
    /// `None` blocks until the worker delivers a frame or fails.
    pub response_timeout: Option<Duration>,

    // -------------------------------------------------------------------------
    // Pool Configuration
    // -------------------------------------------------------------------------
    /// Number of connections in the pool; each runs two worker threads
    pub pool_size: usize,

    // -------------------------------------------------------------------------
    // Authentication
    // -------------------------------------------------------------------------
    /// SASL PLAIN credentials, sent once per connection after connect
    pub credentials: Option<Credentials>,
}

/// SASL PLAIN credentials
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:11211".to_string(),
            connect_timeout: Duration::from_secs(5),
            response_timeout: None,
            pool_size: 10,
            credentials: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the configuration before any connection is opened
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(CacheError::Config("pool_size must be at least 1".to_string()));
        }
        if self.connect_timeout.is_zero() {
            return Err(CacheError::Config("connect_timeout must be non-zero".to_string()));
        }
        if let Some(timeout) = self.response_timeout {
            if timeout.is_zero() {
                return Err(CacheError::Config(
                    "response_timeout must be non-zero".to_string(),
                ));
            }
        }
        self.socket_addr().map(|_| ())
    }

    /// Resolve `addr` to the first socket address it names
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.addr
            .to_socket_addrs()
            .map_err(|e| CacheError::Config(format!("invalid address {}: {}", self.addr, e)))?
            .next()
            .ok_or_else(|| CacheError::Config(format!("address {} resolved to nothing", self.addr)))
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the server address (host:port)
    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.config.addr = addr.into();
        self
    }

    /// Set the number of pooled connections
    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Set the TCP connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the per-pull response timeout
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout = Some(timeout);
        self
    }

    /// Enable SASL PLAIN authentication
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some(Credentials::new(username, password));
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
