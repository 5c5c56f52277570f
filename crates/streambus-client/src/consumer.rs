//! Consumer API: subscription session lifecycle and bounded polling.
//!
//! A `Consumer` holds exactly one subscription session. Sessions move through
//! `Created → Subscribed → Polling ⇄ Idle → Closed`, with `Subscribed →
//! Failed` on session loss. `Created` exists only inside the builder and
//! `Polling` only for the duration of a transport poll; the consumer tracks
//! the three states that outlive a call: subscribed, failed, closed.
//!
//! Session exclusivity is server-arbitrated: building a consumer against a
//! subscription that is already held surfaces
//! [`ClientError::DuplicateSubscription`] from the transport, and the client
//! never second-guesses that rejection. Once a session is lost (lease expiry
//! or takeover), the consumer latches into the failed state and does not
//! rebuild itself; callers construct a new `Consumer`.
//!
//! ## Example
//!
//! ```ignore
//! use streambus_client::Consumer;
//!
//! let consumer = Consumer::builder()
//!     .transport(transport)
//!     .subscription("analytics")
//!     .stream("events")
//!     .build()
//!     .await?;
//!
//! loop {
//!     // Long-poll: empty on timeout, never an error.
//!     for record in consumer.poll().await? {
//!         println!("{} -> {:?}", record.record_id, record.payload);
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{ClientError, Result};
use crate::record::ReceivedRecord;
use crate::transport::{StreamTransport, SubscriptionSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Subscribed,
    Failed,
    Closed,
}

/// Pull-based consumer over a durable subscription.
///
/// One logical consumer should poll a session at a time; concurrent `poll()`
/// calls on the same `Consumer` are not a supported usage.
pub struct Consumer {
    transport: Arc<dyn StreamTransport>,
    session: SubscriptionSession,
    poll_timeout: Duration,
    max_poll_records: usize,
    state: Mutex<SessionState>,
}

impl Consumer {
    /// Create a [`ConsumerBuilder`].
    pub fn builder() -> ConsumerBuilder {
        ConsumerBuilder::new()
    }

    /// Subscription this consumer holds.
    pub fn subscription(&self) -> &str {
        &self.session.subscription
    }

    /// Stream the subscription consumes.
    pub fn stream(&self) -> &str {
        &self.session.stream
    }

    /// Poll for newly available records.
    ///
    /// Long-polls the transport for up to `max_poll_records`, waiting at most
    /// `poll_timeout`. A timeout with nothing available returns an empty vec.
    ///
    /// # Errors
    ///
    /// - `ConsumerClosed` after [`close`](Self::close)
    /// - `SessionLost` once the session is invalidated server-side; the error
    ///   latches and every subsequent poll fails the same way
    /// - `Transport` for other transport failures
    pub async fn poll(&self) -> Result<Vec<ReceivedRecord>> {
        {
            let state = self.state.lock().await;
            match *state {
                SessionState::Closed => return Err(ClientError::ConsumerClosed),
                SessionState::Failed => {
                    return Err(ClientError::SessionLost(
                        self.session.subscription.clone(),
                    ))
                }
                SessionState::Subscribed => {}
            }
        }

        match self
            .transport
            .poll(&self.session, self.max_poll_records, self.poll_timeout)
            .await
        {
            Ok(records) => {
                trace!(
                    subscription = %self.session.subscription,
                    record_count = records.len(),
                    "poll returned"
                );
                Ok(records)
            }
            Err(err @ ClientError::SessionLost(_)) => {
                warn!(subscription = %self.session.subscription, "subscription session lost");
                *self.state.lock().await = SessionState::Failed;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Release the subscription session.
    ///
    /// Idempotent. After the server's grace period a new session may be
    /// opened on the same subscription name; it resumes from the last
    /// delivered position, not from the start.
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if *state == SessionState::Closed {
                return Ok(());
            }
            *state = SessionState::Closed;
        }
        debug!(subscription = %self.session.subscription, "closing consumer session");
        self.transport.close_session(&self.session).await
    }
}

/// Builder for [`Consumer`].
///
/// Required: `transport`, `subscription`, `stream`. Defaults: 3000 ms poll
/// timeout, 500 records per poll.
pub struct ConsumerBuilder {
    transport: Option<Arc<dyn StreamTransport>>,
    subscription: Option<String>,
    stream: Option<String>,
    poll_timeout: Duration,
    max_poll_records: usize,
}

impl ConsumerBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            subscription: None,
            stream: None,
            poll_timeout: Duration::from_millis(3000),
            max_poll_records: 500,
        }
    }

    /// Transport the consumer polls through (required).
    pub fn transport(mut self, transport: Arc<dyn StreamTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Subscription name to attach to (required).
    pub fn subscription(mut self, subscription: impl Into<String>) -> Self {
        self.subscription = Some(subscription.into());
        self
    }

    /// Stream the subscription consumes (required).
    pub fn stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    /// Long-poll bound (default 3000 ms).
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Per-poll record cap (default 500).
    pub fn max_poll_records(mut self, max: usize) -> Self {
        self.max_poll_records = max;
        self
    }

    /// Open the subscription session and build the consumer.
    ///
    /// # Errors
    ///
    /// - `Config` if a required field is missing
    /// - `DuplicateSubscription` if the subscription is already held by an
    ///   active session
    /// - `Transport` if the session cannot be opened
    pub async fn build(self) -> Result<Consumer> {
        let transport = self
            .transport
            .ok_or_else(|| ClientError::Config("transport is required".into()))?;
        let subscription = self
            .subscription
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ClientError::Config("subscription is required".into()))?;
        let stream = self
            .stream
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ClientError::Config("stream is required".into()))?;

        let session = transport.open_session(&subscription, &stream).await?;
        debug!(
            subscription = %session.subscription,
            stream = %session.stream,
            token = session.token,
            "subscription session opened"
        );

        Ok(Consumer {
            transport,
            session,
            poll_timeout: self.poll_timeout,
            max_poll_records: self.max_poll_records,
            state: Mutex::new(SessionState::Subscribed),
        })
    }
}

impl Default for ConsumerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
