//! Error types for StreamBus client operations.
//!
//! Errors are categorized by where they surface: session lifecycle
//! (`DuplicateSubscription`, `SessionLost`), the transport boundary
//! (`Transport`), lifecycle misuse (`ProducerClosed`, `ConsumerClosed`), and
//! builder validation (`Config`).
//!
//! ## Propagation policy
//!
//! The batching path never swallows errors and never retries: a failed batch
//! send resolves every affected write handle with the same `Transport` error
//! (which is why `ClientError` is `Clone`). Retry and backoff policy belong to
//! the caller, where a retried write is visibly a new write rather than a
//! hidden duplicate. Consumer poll timeouts are not errors; session loss is.

use thiserror::Error;

/// Convenience type alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Error type for Producer and Consumer operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The subscription is already held by another active session.
    ///
    /// Session exclusivity is arbitrated server-side; the client surfaces the
    /// rejection as-is and performs no local deduplication.
    #[error("subscription '{0}' is already held by an active session")]
    DuplicateSubscription(String),

    /// The subscription session was invalidated server-side (lease expiry or
    /// takeover by another consumer).
    ///
    /// A consumer that observes this error latches into a failed state; build
    /// a new `Consumer` to resume consumption.
    #[error("session for subscription '{0}' was lost")]
    SessionLost(String),

    /// A transport-level failure (network, serialization, server error).
    ///
    /// Wraps the underlying RPC failure as a message. Batch sends that fail
    /// with this error are not retried by the client.
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation attempted on a producer after `close()`.
    #[error("producer is closed")]
    ProducerClosed,

    /// Operation attempted on a consumer after `close()`.
    #[error("consumer is closed")]
    ConsumerClosed,

    /// A required builder field was missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),
}
