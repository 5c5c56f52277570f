//! StreamBus Client - Producer and Consumer APIs
//!
//! This crate provides the client side of the StreamBus streaming platform:
//! applications publish records into named streams through a [`Producer`] and
//! consume them via durable subscriptions through a [`Consumer`]. The client
//! hides batching, completion tracking, and the pull-based subscription
//! session; the network itself lives behind the [`StreamTransport`] port.
//!
//! # Examples
//!
//! ## Producer
//!
//! ```ignore
//! use streambus_client::StreamBusClient;
//!
//! let client = StreamBusClient::new(transport);
//! let producer = client
//!     .producer()
//!     .stream("events")
//!     .enable_batch()
//!     .record_count_limit(100)
//!     .build()?;
//!
//! let record_id = producer.write(payload).await?;
//! producer.close().await?;
//! ```
//!
//! ## Consumer
//!
//! ```ignore
//! let consumer = client
//!     .consumer()
//!     .subscription("analytics")
//!     .stream("events")
//!     .build()
//!     .await?;
//!
//! for record in consumer.poll().await? {
//!     println!("{}: {:?}", record.record_id, record.payload);
//! }
//! consumer.close().await?;
//! ```

mod batch;
pub mod client;
pub mod consumer;
pub mod error;
pub mod producer;
pub mod record;
pub mod transport;

pub use client::StreamBusClient;
pub use consumer::{Consumer, ConsumerBuilder};
pub use error::{ClientError, Result};
pub use producer::{Producer, ProducerBuilder, WriteHandle};
pub use record::{ReceivedRecord, RecordId};
pub use transport::{StreamTransport, SubscriptionSession};
