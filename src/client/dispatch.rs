//! Pipelined Dispatcher
//!
//! Sends a whole batch over one pooled connection in one message and hands
//! back the stream that reads its answers.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::network::{Connection, Pool};
use crate::protocol::WireRequest;
use crate::transcoder::Transcoder;
use super::stream::Slot;
use super::{Request, ResponseStream};

/// Turns request batches into response streams
#[derive(Clone)]
pub struct Dispatcher {
    pool: Pool<Connection>,
    transcoder: Arc<dyn Transcoder>,
    response_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(
        pool: Pool<Connection>,
        transcoder: Arc<dyn Transcoder>,
        response_timeout: Option<Duration>,
    ) -> Self {
        Self {
            pool,
            transcoder,
            response_timeout,
        }
    }

    /// Dispatch `requests` as one pipelined batch
    ///
    /// Blocks while the pool has no free connection. If the batch cannot be
    /// handed to the connection's worker, the connection is released at
    /// once and nothing of the batch reaches the wire.
    pub fn dispatch(&self, requests: Vec<Request>) -> Result<ResponseStream> {
        if requests.is_empty() {
            return Ok(ResponseStream::empty(Arc::clone(&self.transcoder)));
        }

        let mut conn = self.pool.checkout()?;

        let wire = pipeline(&requests);
        let slots = wire
            .iter()
            .map(|w| Slot {
                opcode: w.opcode,
                key: w.key.clone(),
            })
            .collect();

        let count = wire.len();
        let batch = match conn.submit(wire) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(conn_id = conn.id(), "batch submission failed: {}", e);
                conn.mark_broken();
                return Err(e);
            }
        };
        tracing::debug!(conn_id = conn.id(), batch, requests = count, "batch dispatched");

        Ok(ResponseStream::new(
            conn,
            batch,
            slots,
            Arc::clone(&self.transcoder),
            self.response_timeout,
        ))
    }

    pub fn pool(&self) -> &Pool<Connection> {
        &self.pool
    }
}

/// Quiet every request but the last, numbering them by position
pub fn pipeline(requests: &[Request]) -> Vec<WireRequest> {
    let last = requests.len().saturating_sub(1);
    requests
        .iter()
        .enumerate()
        .map(|(index, request)| {
            let opcode = if index < last {
                request.opcode.to_quiet()
            } else {
                request.opcode
            };
            request.to_wire(opcode, index as u32)
        })
        .collect()
}
