//! Transport port: the narrow interface the client consumes from the broker.
//!
//! The client never talks to the network directly; everything goes through
//! [`StreamTransport`], which is typically backed by an RPC stub. Connection
//! setup, TLS, and administrative operations (create/delete stream or
//! subscription) live behind this boundary and are not part of the client.
//!
//! Contract summary:
//!
//! - `append` preserves order and returns exactly one [`RecordId`] per input
//!   record on success.
//! - `poll` is a server-side bounded wait, not a client-side spin; an empty
//!   result on timeout is `Ok`, not an error.
//! - `open_session` fails with [`ClientError::DuplicateSubscription`] when the
//!   subscription name is already held by an active session.
//! - `close_session` releases the lease so a later open on the same name
//!   resumes from the last delivered position.
//!
//! [`ClientError::DuplicateSubscription`]: crate::error::ClientError::DuplicateSubscription

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::record::{ReceivedRecord, RecordId};

/// Handle for an open subscription session.
///
/// Issued by [`StreamTransport::open_session`]. The `token` identifies this
/// particular lease; a transport implementation uses it to detect polls from
/// a session that has since been closed or taken over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSession {
    /// Subscription name this session holds.
    pub subscription: String,
    /// Stream the subscription consumes.
    pub stream: String,
    /// Server-issued lease token for this session.
    pub token: u64,
}

/// Capability to append record batches and poll subscriptions.
///
/// Implemented by the RPC layer in production and by an in-memory broker in
/// tests. All methods take `&self`; implementations must be safe to share
/// across tasks.
#[async_trait]
pub trait StreamTransport: Send + Sync + 'static {
    /// Append an ordered batch of records to a stream.
    ///
    /// On success the returned ids are in the same order as the input and
    /// there is exactly one id per record.
    async fn append(&self, stream: &str, records: Vec<Bytes>) -> Result<Vec<RecordId>>;

    /// Poll a subscription for up to `max_records` new records, waiting at
    /// most `timeout` for records to become available.
    ///
    /// Returns an empty vec on timeout with nothing available. Fails with
    /// `SessionLost` if the session no longer holds the lease.
    async fn poll(
        &self,
        session: &SubscriptionSession,
        max_records: usize,
        timeout: Duration,
    ) -> Result<Vec<ReceivedRecord>>;

    /// Open an exclusive session on a subscription.
    ///
    /// Fails with `DuplicateSubscription` if the name is already held by an
    /// active session.
    async fn open_session(&self, subscription: &str, stream: &str) -> Result<SubscriptionSession>;

    /// Release a subscription session.
    async fn close_session(&self, session: &SubscriptionSession) -> Result<()>;
}
