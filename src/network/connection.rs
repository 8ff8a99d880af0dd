//! Server Connection
//!
//! A connected, authenticated socket plus the worker threads that drive it.
//! The rest of the client sees only two operations: `submit` a batch and
//! `recv` the next frame.

use std::io::{BufReader, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use bytes::Bytes;
use crossbeam::channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};

use crate::config::{Config, Credentials};
use crate::error::{CacheError, Result};
use crate::protocol::{encode_request, read_frame, Opcode, Status, WireRequest};
use super::worker::{Batch, BatchFrame, Workers};

/// SASL mechanism used for authentication
const SASL_MECHANISM: &[u8] = b"PLAIN";

/// Frames the reader may get ahead of the consumer
///
/// A reader this far ahead waits, which bounds the memory held by a stream
/// that is consumed slowly or abandoned.
pub const FRAME_BUFFER: usize = 1024;

/// A live connection to one server
pub struct Connection {
    id: u64,

    /// Batches to the writer; `None` only while dropping
    commands: Option<Sender<Batch>>,

    /// Frames (or the terminal error) from the reader; `None` only while dropping
    frames: Option<Receiver<Result<BatchFrame>>>,

    /// Control handle used to unblock the workers on drop
    socket: TcpStream,

    workers: Option<Workers>,

    next_batch: u64,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Connect, authenticate if configured, and start the workers
    pub fn open(id: u64, config: &Config) -> Result<Self> {
        let addr = config.socket_addr()?;
        let stream = TcpStream::connect_timeout(&addr, config.connect_timeout)?;

        // Disable Nagle's algorithm; batches are flushed whole anyway
        stream.set_nodelay(true)?;

        if let Some(credentials) = &config.credentials {
            stream.set_read_timeout(Some(config.connect_timeout))?;
            authenticate(&stream, credentials)?;
            stream.set_read_timeout(None)?;
        }

        let conn = Self::spawn(id, stream)?;
        tracing::debug!(conn_id = id, peer = %conn.peer_addr, "connection established");
        Ok(conn)
    }

    /// Start the workers on an already connected stream
    pub fn spawn(id: u64, stream: TcpStream) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        let read_stream = stream.try_clone()?;
        let write_stream = stream.try_clone()?;
        let (command_tx, command_rx) = unbounded();
        let (frame_tx, frame_rx) = bounded(FRAME_BUFFER);

        let workers = Workers::start(id, read_stream, write_stream, command_rx, frame_tx)?;

        Ok(Self {
            id,
            commands: Some(command_tx),
            frames: Some(frame_rx),
            socket: stream,
            workers: Some(workers),
            next_batch: 0,
            peer_addr,
        })
    }

    /// Hand a batch to the writer without waiting for it to be written
    ///
    /// Returns the batch id that tags its frames. Fails without sending
    /// anything once a worker has failed.
    pub fn submit(&mut self, requests: Vec<WireRequest>) -> Result<u64> {
        if !self.is_alive() {
            return Err(CacheError::Transport(format!(
                "connection to {} has failed",
                self.peer_addr
            )));
        }
        let commands = self
            .commands
            .as_ref()
            .ok_or_else(|| CacheError::Transport("connection is shutting down".to_string()))?;

        let id = self.next_batch;
        commands.send(Batch { id, requests }).map_err(|_| {
            CacheError::Transport(format!("writer for {} has exited", self.peer_addr))
        })?;
        self.next_batch += 1;
        Ok(id)
    }

    /// Wait for the next frame from the reader
    pub fn recv(&self, timeout: Option<Duration>) -> Result<BatchFrame> {
        let frames = self.frames.as_ref().ok_or_else(|| self.worker_gone())?;

        // Outer error: channel trouble. Inner: whatever the worker forwarded.
        match timeout {
            Some(timeout) => frames.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => CacheError::Timeout,
                RecvTimeoutError::Disconnected => self.worker_gone(),
            })?,
            None => frames.recv().map_err(|_| self.worker_gone())?,
        }
    }

    /// Returns false once either worker has failed
    pub fn is_alive(&self) -> bool {
        self.workers.as_ref().is_some_and(Workers::is_alive)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    fn worker_gone(&self) -> CacheError {
        CacheError::Transport(format!("connection to {} closed", self.peer_addr))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Closing the command channel ends an idle writer, closing the frame
        // channel ends a reader waiting on a full buffer, and the shutdown
        // ends whichever is blocked on the socket.
        self.commands.take();
        self.frames.take();
        let _ = self.socket.shutdown(Shutdown::Both);
        if let Some(workers) = self.workers.take() {
            workers.join();
        }
        tracing::debug!(conn_id = self.id, peer = %self.peer_addr, "connection closed");
    }
}

/// SASL PLAIN handshake: `\0username\0password` under mechanism `PLAIN`
fn authenticate(stream: &TcpStream, credentials: &Credentials) -> Result<()> {
    let mut token = Vec::with_capacity(2 + credentials.username.len() + credentials.password.len());
    token.push(0);
    token.extend_from_slice(credentials.username.as_bytes());
    token.push(0);
    token.extend_from_slice(credentials.password.as_bytes());

    let request = WireRequest {
        opcode: Opcode::SaslAuth,
        opaque: 0,
        key: Bytes::from_static(SASL_MECHANISM),
        extras: Bytes::new(),
        value: Bytes::from(token),
        cas: 0,
    };

    let mut out = Vec::new();
    encode_request(&request, &mut out)?;
    let mut writer = stream;
    writer.write_all(&out)?;
    writer.flush()?;

    let frame = read_frame(&mut BufReader::new(stream))?;
    match frame.header.status {
        Status::Ok => {
            tracing::debug!(user = %credentials.username, "SASL authentication succeeded");
            Ok(())
        }
        Status::AuthContinue => Err(CacheError::Auth(
            "server requested an additional SASL step, PLAIN has none".to_string(),
        )),
        status => Err(CacheError::Auth(format!(
            "{} ({})",
            status,
            String::from_utf8_lossy(&frame.value)
        ))),
    }
}
