//! Connection Workers
//!
//! Two threads per connection, one per socket half. The writer sends each
//! submitted batch in a single flush; the reader consumes the response
//! frames and forwards them to whoever consumes the batch.
//!
//! The reader learns about a batch before its first byte is written, so
//! responses are drained while a large batch is still going out and the
//! socket buffers never fill up on both sides at once.
//!
//! ## Flow
//! ```text
//!   commands ──▶ writer ──(batch id, last opaque)──▶ reader ──▶ frames
//!                  │                                   ▲
//!                  └───────────────▶ socket ───────────┘
//! ```

use std::io::{BufReader, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::error::{CacheError, Result};
use crate::protocol::{encode_request, read_frame, Frame, WireRequest};

/// A batch of wire requests submitted in one message
#[derive(Debug)]
pub struct Batch {
    /// Connection-local sequence number
    pub id: u64,
    pub requests: Vec<WireRequest>,
}

/// A response frame tagged with the batch it answers
#[derive(Debug, Clone)]
pub struct BatchFrame {
    pub batch: u64,
    pub frame: Frame,
}

/// A batch written (or being written) whose responses are still due
#[derive(Debug, Clone, Copy)]
struct InFlight {
    batch: u64,
    /// Opaque of the loud request that ends the batch
    last: u32,
}

/// Handles of one connection's worker threads
///
/// Either thread failing forwards the error once over the frame channel,
/// marks the pair dead and stops. The pair also stops when the command
/// channel closes.
pub struct Workers {
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
    alive: Arc<AtomicBool>,
}

impl Workers {
    pub fn start<R, W>(
        conn_id: u64,
        reader: R,
        writer: W,
        commands: Receiver<Batch>,
        frames: Sender<Result<BatchFrame>>,
    ) -> std::io::Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let alive = Arc::new(AtomicBool::new(true));
        let (flight_tx, flight_rx) = unbounded();

        let reader = {
            let frames = frames.clone();
            let alive = Arc::clone(&alive);
            thread::Builder::new()
                .name(format!("mcpipe-read-{}", conn_id))
                .spawn(move || read_loop(conn_id, reader, flight_rx, frames, &alive))?
        };
        // If this spawn fails the closure drops `flight_tx`, which stops the reader.
        let writer = {
            let alive = Arc::clone(&alive);
            thread::Builder::new()
                .name(format!("mcpipe-write-{}", conn_id))
                .spawn(move || write_loop(conn_id, writer, commands, flight_tx, frames, &alive))?
        };

        Ok(Self {
            writer,
            reader,
            alive,
        })
    }

    /// Returns false once either thread has failed
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn join(self) {
        let _ = self.writer.join();
        let _ = self.reader.join();
    }
}

fn fail(conn_id: u64, alive: &AtomicBool, frames: &Sender<Result<BatchFrame>>, e: CacheError) {
    tracing::warn!(conn_id, "connection failed: {}", e);
    alive.store(false, Ordering::Release);
    let _ = frames.send(Err(e));
}

// =============================================================================
// Writer
// =============================================================================

fn write_loop<W: Write>(
    conn_id: u64,
    mut writer: W,
    commands: Receiver<Batch>,
    in_flight: Sender<InFlight>,
    frames: Sender<Result<BatchFrame>>,
    alive: &AtomicBool,
) {
    let mut out = Vec::with_capacity(4096);
    tracing::debug!(conn_id, "writer started");

    while let Ok(batch) = commands.recv() {
        let Some(last) = batch.requests.last().map(|r| r.opaque) else {
            continue;
        };

        out.clear();
        if let Err(e) = encode_batch(&batch.requests, &mut out) {
            fail(conn_id, alive, &frames, e);
            break;
        }

        tracing::trace!(
            conn_id,
            batch = batch.id,
            requests = batch.requests.len(),
            bytes = out.len(),
            "sending batch"
        );

        // Announce first: the reader must be draining before the write can block.
        if in_flight.send(InFlight { batch: batch.id, last }).is_err() {
            tracing::debug!(conn_id, "reader gone, writer stopping");
            break;
        }
        if let Err(e) = writer.write_all(&out).and_then(|_| writer.flush()) {
            fail(conn_id, alive, &frames, CacheError::Io(e));
            break;
        }
    }

    tracing::debug!(conn_id, "writer stopped");
}

fn encode_batch(requests: &[WireRequest], out: &mut Vec<u8>) -> Result<()> {
    for request in requests {
        encode_request(request, out)?;
    }
    Ok(())
}

// =============================================================================
// Reader
// =============================================================================

enum ReadError {
    Failed(CacheError),
    ConsumerGone,
}

impl From<CacheError> for ReadError {
    fn from(e: CacheError) -> Self {
        ReadError::Failed(e)
    }
}

fn read_loop<R: Read>(
    conn_id: u64,
    reader: R,
    in_flight: Receiver<InFlight>,
    frames: Sender<Result<BatchFrame>>,
    alive: &AtomicBool,
) {
    let mut reader = BufReader::new(reader);
    tracing::debug!(conn_id, "reader started");

    while let Ok(flight) = in_flight.recv() {
        match read_batch(&mut reader, flight, &frames) {
            Ok(()) => {}
            Err(ReadError::ConsumerGone) => {
                tracing::debug!(conn_id, "frame consumer gone, reader stopping");
                break;
            }
            Err(ReadError::Failed(e)) => {
                fail(conn_id, alive, &frames, e);
                break;
            }
        }
    }

    tracing::debug!(conn_id, "reader stopped");
}

/// Forward frames until the one answering the loud last request
fn read_batch<R: Read>(
    reader: &mut R,
    flight: InFlight,
    frames: &Sender<Result<BatchFrame>>,
) -> std::result::Result<(), ReadError> {
    // Quiet requests may stay silent; the loud last one always answers.
    loop {
        let frame = read_frame(reader)?;
        let opaque = frame.header.opaque;
        if opaque > flight.last {
            return Err(CacheError::Protocol(format!(
                "Response opaque {} beyond batch end {}",
                opaque, flight.last
            ))
            .into());
        }

        frames
            .send(Ok(BatchFrame {
                batch: flight.batch,
                frame,
            }))
            .map_err(|_| ReadError::ConsumerGone)?;

        if opaque == flight.last {
            return Ok(());
        }
    }
}
