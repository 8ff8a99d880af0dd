//! Response Stream
//!
//! Lazily turns the frames of one dispatched batch into exactly one
//! `Response` per request, in request order.
//!
//! ## States
//! ```text
//!   Continuing ──(response for the last request)──▶ Halted
//!        │                                            ▲
//!        └──────────────(pull failure)────────────────┘
//! ```
//!
//! ## Gaps
//! The server answers a quiet request only when there is something to say
//! (a hit for GETQ, a failure for the mutations). Frames carry the request
//! index in their opaque, so an index skipped by the next frame was a
//! silent request and is filled in here:
//! - get family: `KeyNotFound`
//! - everything else: `Ok`
//!
//! ## Release
//! The connection is held in a pool guard. It goes back to the pool when
//! the stream halts, fails, or is dropped early, exactly once.

use std::iter::FusedIterator;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::error::{CacheError, Result};
use crate::network::PooledConnection;
use crate::protocol::{Frame, Opcode, Status};
use crate::transcoder::Transcoder;
use super::Response;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Continuing,
    Halted,
}

/// What the stream needs to remember about each request
#[derive(Debug, Clone)]
pub(crate) struct Slot {
    /// Opcode as sent (quiet or loud)
    pub opcode: Opcode,
    pub key: Bytes,
}

/// Ordered, lazily consumed responses for one batch
pub struct ResponseStream {
    conn: Option<PooledConnection>,
    batch: u64,
    slots: Vec<Slot>,
    transcoder: Arc<dyn Transcoder>,
    timeout: Option<Duration>,
    state: State,
    /// Index of the next response to yield
    next: usize,
    /// Frame read ahead of a gap
    pending: Option<Frame>,
}

impl ResponseStream {
    pub(crate) fn new(
        conn: PooledConnection,
        batch: u64,
        slots: Vec<Slot>,
        transcoder: Arc<dyn Transcoder>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            conn: Some(conn),
            batch,
            slots,
            transcoder,
            timeout,
            state: State::Continuing,
            next: 0,
            pending: None,
        }
    }

    /// A stream for an empty batch; never touches a connection
    pub(crate) fn empty(transcoder: Arc<dyn Transcoder>) -> Self {
        Self {
            conn: None,
            batch: 0,
            slots: Vec::new(),
            transcoder,
            timeout: None,
            state: State::Halted,
            next: 0,
            pending: None,
        }
    }

    /// Returns true once every response has been yielded or a pull failed
    pub fn is_halted(&self) -> bool {
        self.state == State::Halted
    }

    /// Responses not yet yielded
    pub fn remaining(&self) -> usize {
        match self.state {
            State::Continuing => self.slots.len() - self.next,
            State::Halted => 0,
        }
    }

    /// Next frame belonging to this batch, skipping leftovers of abandoned
    /// earlier batches on the same connection
    fn pull(&mut self) -> Result<Frame> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| CacheError::Transport("stream has no connection".to_string()))?;

        loop {
            let tagged = conn.recv(self.timeout)?;
            if tagged.batch == self.batch {
                return Ok(tagged.frame);
            }
            tracing::trace!(
                conn_id = conn.id(),
                stale = tagged.batch,
                current = self.batch,
                "skipping frame from abandoned batch"
            );
        }
    }

    fn respond(&mut self, index: usize) -> Result<Response> {
        let frame = match self.pending.take() {
            Some(frame) => frame,
            None => self.pull()?,
        };

        let opaque = frame.header.opaque as usize;
        if opaque < index {
            return Err(CacheError::Protocol(format!(
                "Response for request {} arrived after request {}",
                opaque, index
            )));
        }

        let slot = &self.slots[index];
        if opaque > index {
            // Request `index` stayed silent.
            self.pending = Some(frame);
            let status = if slot.opcode.is_get_family() {
                Status::KeyNotFound
            } else {
                Status::Ok
            };
            return Ok(Response::silent(status, &slot.key));
        }

        let mut response = Response::from_frame(frame, &slot.key);
        if slot.opcode.is_get_family() {
            response.decode_value(self.transcoder.as_ref());
        }
        Ok(response)
    }

    /// Stop and return the connection to the pool
    fn halt(&mut self, broken: bool) {
        self.state = State::Halted;
        self.pending = None;
        if let Some(mut conn) = self.conn.take() {
            if broken {
                conn.mark_broken();
            }
        }
    }
}

impl Iterator for ResponseStream {
    type Item = Result<Response>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == State::Halted {
            return None;
        }

        let index = self.next;
        match self.respond(index) {
            Ok(response) => {
                self.next += 1;
                if self.next == self.slots.len() {
                    self.halt(false);
                }
                Some(Ok(response))
            }
            Err(e) => {
                tracing::debug!(index, "response stream failed: {}", e);
                self.halt(e.is_connection_fatal());
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        // A failure ends the stream early, so only one more item is certain.
        let remaining = self.remaining();
        (remaining.min(1), Some(remaining))
    }
}

impl FusedIterator for ResponseStream {}

impl Drop for ResponseStream {
    fn drop(&mut self) {
        if self.state == State::Continuing {
            tracing::trace!(
                yielded = self.next,
                total = self.slots.len(),
                "response stream dropped early"
            );
        }
        // The pool guard in `conn` checks the connection in.
    }
}
