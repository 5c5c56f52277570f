//! Client facade: the entry point that vends producer and consumer builders.

use std::sync::Arc;

use crate::consumer::{Consumer, ConsumerBuilder};
use crate::producer::{Producer, ProducerBuilder};
use crate::transport::StreamTransport;

/// Entry point for a StreamBus connection.
///
/// Wraps a [`StreamTransport`] and hands out builders pre-wired with it, so
/// application code configures producers and consumers without threading the
/// transport through by hand.
///
/// ```ignore
/// let client = StreamBusClient::new(transport);
///
/// let producer = client.producer().stream("events").build()?;
/// let consumer = client
///     .consumer()
///     .subscription("analytics")
///     .stream("events")
///     .build()
///     .await?;
/// ```
#[derive(Clone)]
pub struct StreamBusClient {
    transport: Arc<dyn StreamTransport>,
}

impl StreamBusClient {
    pub fn new(transport: Arc<dyn StreamTransport>) -> Self {
        Self { transport }
    }

    /// Builder for a [`Producer`] on this connection.
    pub fn producer(&self) -> ProducerBuilder {
        Producer::builder().transport(Arc::clone(&self.transport))
    }

    /// Builder for a [`Consumer`] on this connection.
    pub fn consumer(&self) -> ConsumerBuilder {
        Consumer::builder().transport(Arc::clone(&self.transport))
    }
}
