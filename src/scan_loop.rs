//! # Frame Scan Loop
//!
//! Samples frames from an open stream and runs the decode primitive on each
//! one until a code is found or the loop is cancelled.
//!
//! ## Scheduling
//!
//! The loop runs as one task that yields on a frame-interval tick between
//! samples, so it never busy-polls the source. Samples are strictly
//! sequential: the next tick is awaited only after the previous decode
//! attempt has returned. Decoding runs on the blocking pool with the frame
//! buffer moved in and handed back, so runtime workers never wait on the
//! decoder.
//!
//! ```text
//! tick ──▶ has data? ──no──▶ tick
//!              │yes
//!              ▼
//!        copy frame into FrameBuffer ──▶ decode ──none──▶ tick
//!                                          │found
//!                                          ▼
//!                                 on_decoded(payload), exit
//! ```
//!
//! ## Delivery
//!
//! The `on_decoded` callback lives in a slot shared with the [`LoopHandle`].
//! Delivery takes it out of the slot and runs it while holding the slot lock;
//! `cancel` empties the slot under the same lock. At most one delivery can
//! happen per `start`, and none can begin after `cancel` has returned.
//! The callback must not block or cancel its own loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use scan_decode::DecodePrimitive;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::core::FrameBuffer;
use crate::error::ScannerError;
use crate::payload::DecodedPayload;
use crate::session::StreamHandle;

type DecodeCallback = Box<dyn FnOnce(DecodedPayload) + Send>;
type CallbackSlot = Arc<Mutex<Option<DecodeCallback>>>;

static NEXT_LOOP_ID: AtomicU64 = AtomicU64::new(1);

/// Why a loop stopped scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// A code was decoded and delivered.
    Decoded,
    /// The loop was cancelled before a delivery.
    Cancelled,
    /// The stream was released under the loop.
    StreamClosed,
    /// The loop task panicked.
    Panicked,
}

/// Per-loop counters.
#[derive(Debug, Default)]
struct LoopStats {
    samples: AtomicU64,
    skipped: AtomicU64,
}

/// Starts sampling loops with a shared decoder and frame interval.
#[derive(Clone)]
pub struct FrameScanLoop {
    decoder: Arc<dyn DecodePrimitive>,
    frame_interval: Duration,
}

impl FrameScanLoop {
    pub fn new(decoder: Arc<dyn DecodePrimitive>, frame_interval: Duration) -> Self {
        Self {
            decoder,
            frame_interval: frame_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Starts a loop on `stream`. Must be called inside a tokio runtime.
    ///
    /// `on_decoded` is called at most once, with the first decoded payload.
    pub fn start<F>(&self, stream: StreamHandle, on_decoded: F) -> LoopHandle
    where
        F: FnOnce(DecodedPayload) + Send + 'static,
    {
        let id = NEXT_LOOP_ID.fetch_add(1, Ordering::Relaxed);
        let callback: CallbackSlot = Arc::new(Mutex::new(Some(Box::new(on_decoded))));
        let stats = Arc::new(LoopStats::default());

        let task = tokio::spawn(run_loop(
            id,
            stream,
            Arc::clone(&self.decoder),
            self.frame_interval,
            Arc::clone(&callback),
            Arc::clone(&stats),
        ));

        LoopHandle {
            id,
            callback,
            stats,
            task,
            exit: None,
        }
    }
}

impl std::fmt::Debug for FrameScanLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameScanLoop")
            .field("frame_interval", &self.frame_interval)
            .finish_non_exhaustive()
    }
}

async fn run_loop(
    id: u64,
    stream: StreamHandle,
    decoder: Arc<dyn DecodePrimitive>,
    frame_interval: Duration,
    callback: CallbackSlot,
    stats: Arc<LoopStats>,
) -> LoopExit {
    info!(loop_id = id, stream_id = stream.id(), "Frame scan loop started");
    let mut ticker = tokio::time::interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut buffer = FrameBuffer::with_size(stream.size());

    let exit = loop {
        ticker.tick().await;

        if callback.lock().unwrap_or_else(PoisonError::into_inner).is_none() {
            break LoopExit::Cancelled;
        }

        let sampled = stream
            .with_source("sample frame", |source| {
                if !source.has_frame_data() {
                    return Ok(false);
                }
                source.read_frame(&mut buffer).map(|()| true)
            })
            .await
            .and_then(|read| read);

        match sampled {
            Ok(true) => {}
            Ok(false) => {
                stats.skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            Err(ScannerError::StreamClosed { .. }) => break LoopExit::StreamClosed,
            Err(e) => {
                warn!(loop_id = id, error = %e, "Frame read failed, retrying on next tick");
                continue;
            }
        }

        stats.samples.fetch_add(1, Ordering::Relaxed);
        let frame_decoder = Arc::clone(&decoder);
        let attempt = tokio::task::spawn_blocking(move || {
            let size = buffer.size();
            let code = frame_decoder.decode(buffer.as_slice(), size.w, size.h);
            (buffer, code)
        })
        .await;

        let code = match attempt {
            Ok((returned, code)) => {
                buffer = returned;
                code
            }
            Err(e) => {
                warn!(loop_id = id, error = %e, "Decode attempt failed, retrying on next tick");
                buffer = FrameBuffer::with_size(stream.size());
                continue;
            }
        };
        let Some(code) = code else {
            continue;
        };

        let mut slot = callback.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.take() {
            Some(deliver) => {
                debug!(loop_id = id, payload_len = code.data.len(), "Code decoded");
                deliver(DecodedPayload::live(code));
                break LoopExit::Decoded;
            }
            None => break LoopExit::Cancelled,
        }
    };

    info!(
        loop_id = id,
        samples = stats.samples.load(Ordering::Relaxed),
        skipped = stats.skipped.load(Ordering::Relaxed),
        ?exit,
        "Frame scan loop finished"
    );
    exit
}

/// Handle to a running loop. Cancelling is the only way to stop it early.
///
/// Dropping the handle cancels the loop.
pub struct LoopHandle {
    id: u64,
    callback: CallbackSlot,
    stats: Arc<LoopStats>,
    task: JoinHandle<LoopExit>,
    exit: Option<LoopExit>,
}

impl LoopHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stops the loop. Safe to call repeatedly and after the loop finished.
    ///
    /// No `on_decoded` call starts after this returns.
    pub fn cancel(&self) {
        let cancelled = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        self.task.abort();
        if cancelled {
            debug!(loop_id = self.id, "Frame scan loop cancelled");
        }
    }

    /// Whether the loop task has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Frames handed to the decoder so far.
    pub fn samples(&self) -> u64 {
        self.stats.samples.load(Ordering::Relaxed)
    }

    /// Ticks skipped because the source had no frame data.
    pub fn skipped(&self) -> u64 {
        self.stats.skipped.load(Ordering::Relaxed)
    }

    /// Waits for the loop to stop and reports why.
    pub async fn wait(&mut self) -> LoopExit {
        if let Some(exit) = self.exit {
            return exit;
        }
        let exit = match (&mut self.task).await {
            Ok(exit) => exit,
            Err(e) if e.is_panic() => {
                warn!(loop_id = self.id, "Frame scan loop panicked");
                LoopExit::Panicked
            }
            Err(_) => LoopExit::Cancelled,
        };
        self.exit = Some(exit);
        exit
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopHandle")
            .field("id", &self.id)
            .field("samples", &self.samples())
            .field("finished", &self.is_finished())
            .finish()
    }
}
