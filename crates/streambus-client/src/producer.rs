//! Producer API for publishing records to a stream.
//!
//! The Producer accepts single-record writes, buffers them through the
//! batching engine in [`crate::batch`], and resolves each write's completion
//! handle once the containing batch is acknowledged by the server.
//!
//! ## Batching
//!
//! Batching is opt-in. Without `enable_batch()` every write forms a singleton
//! batch and is sent immediately, with no coalescing or linger delay. With
//! batching enabled, writes coalesce until a count, byte, or linger trigger
//! fires (see the builder options). Both modes go through the same flusher,
//! so ordering and failure semantics are identical.
//!
//! ## Ordering
//!
//! A single caller's sequential writes are appended to batches in order and
//! batches are sent in order, so that caller's `RecordId`s are non-decreasing
//! in submission order. The interleaving of two concurrent callers within a
//! batch is unspecified.
//!
//! ## Example
//!
//! ```ignore
//! use streambus_client::Producer;
//!
//! let producer = Producer::builder()
//!     .transport(transport)
//!     .stream("events")
//!     .enable_batch()
//!     .record_count_limit(100)
//!     .build()?;
//!
//! // Fire-and-track: returns a handle resolved when the batch lands.
//! let handle = producer.write_async(payload).await?;
//! let record_id = handle.wait().await?;
//!
//! // Or block until acknowledged.
//! let record_id = producer.write(other_payload).await?;
//!
//! producer.flush().await?;
//! producer.close().await?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::debug;

use crate::batch::{BatchBuffer, BatchConfig};
use crate::error::{ClientError, Result};
use crate::record::RecordId;
use crate::transport::StreamTransport;

/// Completion handle for an asynchronous write.
///
/// Resolves exactly once: with the record's server-assigned [`RecordId`] when
/// the containing batch is acknowledged, or with the batch's error. The
/// handle may be abandoned (dropped) without affecting other pending writes.
#[derive(Debug)]
pub struct WriteHandle {
    receiver: oneshot::Receiver<Result<RecordId>>,
}

impl WriteHandle {
    /// Wait for the containing batch to be acknowledged.
    pub async fn wait(self) -> Result<RecordId> {
        match self.receiver.await {
            Ok(resolution) => resolution,
            // Sender dropped without resolving: the producer was torn down
            // before this write's batch completed.
            Err(_) => Err(ClientError::ProducerClosed),
        }
    }
}

impl Future for WriteHandle {
    type Output = Result<RecordId>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(resolution)) => Poll::Ready(resolution),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ClientError::ProducerClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Publishes records to a single stream.
///
/// Thread-safe: all methods take `&self`, so a `Producer` can be shared
/// across tasks with `Arc`.
pub struct Producer {
    stream: String,
    buffer: BatchBuffer,
    closed: AtomicBool,
}

impl Producer {
    /// Create a [`ProducerBuilder`].
    pub fn builder() -> ProducerBuilder {
        ProducerBuilder::new()
    }

    /// Stream this producer publishes to.
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Submit a record and return a completion handle without waiting for
    /// acknowledgment.
    ///
    /// # Errors
    ///
    /// `ProducerClosed` after [`close`](Self::close). The buffer re-checks
    /// the closed state while holding its batch lock, so a write racing
    /// `close` is either drained by it or rejected here; a rejected write
    /// never leaves behind a handle nothing will resolve. Batch failures
    /// surface on the returned handle, not here.
    pub async fn write_async(&self, payload: impl Into<Bytes>) -> Result<WriteHandle> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::ProducerClosed);
        }
        let receiver = self.buffer.enqueue(payload.into()).await?;
        Ok(WriteHandle { receiver })
    }

    /// Submit a record and wait for its batch to be acknowledged.
    ///
    /// Implemented as [`write_async`](Self::write_async) plus a wait on the
    /// handle, so both paths share ordering and failure semantics.
    pub async fn write(&self, payload: impl Into<Bytes>) -> Result<RecordId> {
        self.write_async(payload).await?.wait().await
    }

    /// Send every buffered write and wait until all of them are acknowledged.
    ///
    /// A no-op that returns immediately when nothing is buffered. Returns the
    /// first batch failure since the previous flush, including batches the
    /// count, byte, or linger triggers sent on their own; the affected write
    /// handles carry the same error.
    pub async fn flush(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::ProducerClosed);
        }
        self.buffer.flush().await
    }

    /// Drain outstanding writes, then reject all further operations with
    /// `ProducerClosed`.
    ///
    /// Idempotent: a second call returns `Ok(())` without flushing again.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(stream = %self.stream, "closing producer");
        self.buffer.close().await
    }
}

/// Builder for [`Producer`].
///
/// Required: `transport`, `stream`. Defaults: batching off; with
/// `enable_batch()`, 100 records / 1 MiB / 100 ms linger per batch.
pub struct ProducerBuilder {
    transport: Option<Arc<dyn StreamTransport>>,
    stream: Option<String>,
    enable_batch: bool,
    record_count_limit: usize,
    byte_size_limit: usize,
    max_linger: Duration,
}

impl ProducerBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            stream: None,
            enable_batch: false,
            record_count_limit: 100,
            byte_size_limit: 1024 * 1024,
            max_linger: Duration::from_millis(100),
        }
    }

    /// Transport the producer appends through (required).
    pub fn transport(mut self, transport: Arc<dyn StreamTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Target stream name (required).
    pub fn stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    /// Turn on batching. Off by default: every write is sent as a singleton
    /// batch.
    pub fn enable_batch(mut self) -> Self {
        self.enable_batch = true;
        self
    }

    /// Maximum records per batch (default 100).
    pub fn record_count_limit(mut self, limit: usize) -> Self {
        self.record_count_limit = limit;
        self
    }

    /// Maximum payload bytes per batch (default 1 MiB).
    pub fn byte_size_limit(mut self, limit: usize) -> Self {
        self.byte_size_limit = limit;
        self
    }

    /// Maximum time a record may wait in the buffer before a forced flush
    /// (default 100 ms).
    pub fn max_linger(mut self, linger: Duration) -> Self {
        self.max_linger = linger;
        self
    }

    /// Build the producer and spawn its background tasks.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// `Config` if `transport` or `stream` is missing, or if a batch limit is
    /// zero.
    pub fn build(self) -> Result<Producer> {
        let transport = self
            .transport
            .ok_or_else(|| ClientError::Config("transport is required".into()))?;
        let stream = self
            .stream
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ClientError::Config("stream is required".into()))?;

        let config = if self.enable_batch {
            if self.record_count_limit == 0 {
                return Err(ClientError::Config("record_count_limit must be > 0".into()));
            }
            if self.byte_size_limit == 0 {
                return Err(ClientError::Config("byte_size_limit must be > 0".into()));
            }
            BatchConfig {
                record_count_limit: self.record_count_limit,
                byte_size_limit: self.byte_size_limit,
                max_linger: Some(self.max_linger),
            }
        } else {
            // Singleton batches: the count trigger fires on every enqueue, so
            // nothing ever lingers and no timer task is needed.
            BatchConfig {
                record_count_limit: 1,
                byte_size_limit: 1,
                max_linger: None,
            }
        };

        debug!(
            stream = %stream,
            batching = self.enable_batch,
            record_count_limit = config.record_count_limit,
            "building producer"
        );

        Ok(Producer {
            buffer: BatchBuffer::new(stream.clone(), config, transport),
            stream,
            closed: AtomicBool::new(false),
        })
    }
}

impl Default for ProducerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
