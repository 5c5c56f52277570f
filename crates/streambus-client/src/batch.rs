//! Batching engine for the Producer.
//!
//! Pending writes accumulate in a current batch guarded by a mutex. When a
//! trigger fires the full batch is swapped out and handed to a single-owner
//! flusher task over a channel, so the network send never holds the
//! current-batch lock and new writes land in the fresh batch immediately
//! (double buffering).
//!
//! ## Flush triggers
//!
//! Any one of these hands the current batch to the flusher:
//! - **Count**: buffered records reach `record_count_limit`
//! - **Bytes**: accumulated payload bytes reach `byte_size_limit`
//! - **Linger**: the oldest buffered record's age reaches `max_linger`
//!   (checked by a background timer task)
//! - **Manual**: `flush()` is called
//!
//! ## Dispatch
//!
//! The flusher processes batches strictly in hand-off order. For each batch
//! it calls `StreamTransport::append` and resolves every pending write's
//! completion handle positionally with the matching [`RecordId`], or with the
//! batch's error on failure. The oneshot sender is consumed by resolution, so
//! a handle can never be resolved twice; because the flusher owns every write
//! it takes off the channel until it resolves it, no handle is left
//! unresolved once a flush attempt completes. Failed batches are not retried
//! here, since a hidden retry could assign a second `RecordId` to the same
//! write.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use crate::error::{ClientError, Result};
use crate::record::RecordId;
use crate::transport::StreamTransport;

/// Trigger limits for a batch buffer.
#[derive(Debug, Clone)]
pub(crate) struct BatchConfig {
    /// Maximum records per batch.
    pub record_count_limit: usize,
    /// Maximum payload bytes per batch.
    pub byte_size_limit: usize,
    /// Forced-flush age for the oldest buffered record. `None` disables the
    /// linger task (used when batching is off and every write is a singleton
    /// batch).
    pub max_linger: Option<Duration>,
}

/// A buffered write awaiting batch acknowledgment.
///
/// Owned exclusively by the buffer from enqueue until the flusher resolves
/// the completion handle.
struct PendingWrite {
    payload: Bytes,
    completion: oneshot::Sender<Result<RecordId>>,
    enqueued_at: Instant,
}

/// The batch currently being filled.
#[derive(Default)]
struct Batch {
    writes: Vec<PendingWrite>,
    size_bytes: usize,
    /// Enqueue time of the oldest write, for the linger trigger.
    opened_at: Option<Instant>,
}

impl Batch {
    fn push(&mut self, write: PendingWrite) {
        if self.writes.is_empty() {
            self.opened_at = Some(write.enqueued_at);
        }
        self.size_bytes += write.payload.len();
        self.writes.push(write);
    }

    fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    fn age(&self) -> Duration {
        self.opened_at.map(|t| t.elapsed()).unwrap_or_default()
    }
}

/// Work items handed to the flusher task.
enum FlushJob {
    /// A swapped-out batch to send and resolve.
    Batch(Vec<PendingWrite>),
    /// Drain marker: acknowledged once every batch handed off before it has
    /// been sent and resolved. Carries the first error among those batches.
    Drain(oneshot::Sender<Result<()>>),
}

/// Per-stream buffer of pending writes with trigger-based hand-off.
pub(crate) struct BatchBuffer {
    stream: String,
    config: BatchConfig,
    current: Arc<Mutex<Batch>>,
    jobs: mpsc::UnboundedSender<FlushJob>,
    linger_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    /// Set under the current-batch mutex by `close()`. Checked by `enqueue`
    /// under the same mutex, so a write racing close is either included in
    /// the closing drain or rejected; it can never land in a batch that no
    /// trigger will ever hand off.
    closed: AtomicBool,
}

impl BatchBuffer {
    /// Create a buffer and spawn its flusher (and linger timer, if
    /// configured). Must be called within a Tokio runtime.
    pub fn new(stream: String, config: BatchConfig, transport: Arc<dyn StreamTransport>) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let current = Arc::new(Mutex::new(Batch::default()));

        tokio::spawn(run_flusher(stream.clone(), transport, rx));

        let linger_handle = config.max_linger.map(|max_linger| {
            tokio::spawn(run_linger(
                stream.clone(),
                Arc::clone(&current),
                jobs.clone(),
                max_linger,
            ))
        });

        Self {
            stream,
            config,
            current,
            jobs,
            linger_handle: std::sync::Mutex::new(linger_handle),
            closed: AtomicBool::new(false),
        }
    }

    /// Buffer a write and return the receiver its `RecordId` (or failure)
    /// will be delivered on.
    ///
    /// Fires a count/bytes-triggered hand-off while still holding the
    /// current-batch lock, so a concurrent caller's write lands in the next
    /// batch rather than an oversized one.
    ///
    /// # Errors
    ///
    /// `ProducerClosed` once [`close`](Self::close) has run. The check holds
    /// the current-batch lock, so every accepted write is part of some batch
    /// the closing drain covers.
    pub async fn enqueue(&self, payload: Bytes) -> Result<oneshot::Receiver<Result<RecordId>>> {
        let (completion, receiver) = oneshot::channel();
        let write = PendingWrite {
            payload,
            completion,
            enqueued_at: Instant::now(),
        };

        let mut current = self.current.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::ProducerClosed);
        }
        current.push(write);
        trace!(
            stream = %self.stream,
            record_count = current.writes.len(),
            size_bytes = current.size_bytes,
            "buffered write"
        );

        if current.writes.len() >= self.config.record_count_limit
            || current.size_bytes >= self.config.byte_size_limit
        {
            hand_off(&self.stream, &self.jobs, &mut current);
        }

        Ok(receiver)
    }

    /// Hand off any partial current batch, then wait until the flusher has
    /// sent and resolved everything handed off so far.
    ///
    /// With nothing pending this completes without contacting the transport.
    /// Returns the first batch failure observed since the previous flush,
    /// including batches the count, byte, or linger triggers handed off on
    /// their own; the per-write handles carry the same error either way.
    pub async fn flush(&self) -> Result<()> {
        {
            let mut current = self.current.lock().await;
            if !current.is_empty() {
                hand_off(&self.stream, &self.jobs, &mut current);
            }
        }

        let (ack, done) = oneshot::channel();
        if self.jobs.send(FlushJob::Drain(ack)).is_err() {
            // Flusher already gone; nothing can still be in flight.
            return Ok(());
        }
        done.await
            .map_err(|_| ClientError::Transport("flusher task terminated during flush".into()))?
    }

    /// Reject further enqueues, then drain everything already accepted.
    ///
    /// The closed flag is set while holding the current-batch lock, so no
    /// write can slip into the buffer after the final hand-off and be left
    /// with an unresolvable completion handle.
    pub async fn close(&self) -> Result<()> {
        {
            let mut current = self.current.lock().await;
            self.closed.store(true, Ordering::Release);
            if !current.is_empty() {
                hand_off(&self.stream, &self.jobs, &mut current);
            }
        }
        let drained = self.flush().await;
        self.shutdown();
        drained
    }

    /// Stop the linger timer. The flusher exits on its own once the buffer
    /// (and its job sender) is dropped.
    pub fn shutdown(&self) {
        if let Ok(mut handle) = self.linger_handle.lock() {
            if let Some(handle) = handle.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for BatchBuffer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Swap the current batch out and send it to the flusher.
fn hand_off(stream: &str, jobs: &mpsc::UnboundedSender<FlushJob>, current: &mut Batch) {
    let batch = mem::take(current);
    debug!(
        stream = %stream,
        record_count = batch.writes.len(),
        size_bytes = batch.size_bytes,
        age_ms = batch.age().as_millis() as u64,
        "handing batch to flusher"
    );
    // The flusher outlives every hand-off except during teardown, where the
    // producer is already rejecting writes.
    let _ = jobs.send(FlushJob::Batch(batch.writes));
}

/// Single-owner flusher: sends batches in hand-off order and resolves their
/// completion handles. Sequential processing is what keeps a single caller's
/// RecordIds non-decreasing across batches.
async fn run_flusher(
    stream: String,
    transport: Arc<dyn StreamTransport>,
    mut jobs: mpsc::UnboundedReceiver<FlushJob>,
) {
    let mut failure: Option<ClientError> = None;

    while let Some(job) = jobs.recv().await {
        match job {
            FlushJob::Batch(writes) => {
                if writes.is_empty() {
                    continue;
                }
                if let Err(e) = send_batch(&stream, transport.as_ref(), writes).await {
                    failure.get_or_insert(e);
                }
            }
            FlushJob::Drain(ack) => {
                let result = match failure.take() {
                    Some(e) => Err(e),
                    None => Ok(()),
                };
                let _ = ack.send(result);
            }
        }
    }
}

/// Send one batch and resolve every pending write exactly once.
async fn send_batch(
    stream: &str,
    transport: &dyn StreamTransport,
    writes: Vec<PendingWrite>,
) -> Result<()> {
    let record_count = writes.len();
    let payloads: Vec<Bytes> = writes.iter().map(|w| w.payload.clone()).collect();

    match transport.append(stream, payloads).await {
        Ok(ids) if ids.len() == record_count => {
            debug!(
                stream = %stream,
                record_count,
                first_id = %ids[0],
                "batch acknowledged"
            );
            for (write, id) in writes.into_iter().zip(ids) {
                // Abandoned handles just drop the result.
                let _ = write.completion.send(Ok(id));
            }
            Ok(())
        }
        Ok(ids) => {
            // The append contract requires one id per record; anything else
            // makes positional dispatch unsound, so fail the whole batch.
            let err = ClientError::Transport(format!(
                "server returned {} record ids for a batch of {}",
                ids.len(),
                record_count
            ));
            error!(stream = %stream, record_count, error = %err, "batch dispatch mismatch");
            for write in writes {
                let _ = write.completion.send(Err(err.clone()));
            }
            Err(err)
        }
        Err(e) => {
            error!(stream = %stream, record_count, error = %e, "failed to send batch");
            for write in writes {
                let _ = write.completion.send(Err(e.clone()));
            }
            Err(e)
        }
    }
}

/// Timer task for the linger trigger. Ticks at a quarter of `max_linger` so a
/// quiet batch is handed off within ~1.25x the configured linger.
async fn run_linger(
    stream: String,
    current: Arc<Mutex<Batch>>,
    jobs: mpsc::UnboundedSender<FlushJob>,
    max_linger: Duration,
) {
    let tick = (max_linger / 4).max(Duration::from_millis(1));
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let mut batch = current.lock().await;
        if !batch.is_empty() && batch.age() >= max_linger {
            trace!(stream = %stream, age_ms = batch.age().as_millis() as u64, "linger expired");
            hand_off(&stream, &jobs, &mut batch);
        }
    }
}
