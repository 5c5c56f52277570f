//! Record identifiers and consumed records.

use std::fmt;
use std::time::SystemTime;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Server-assigned identifier marking a record's position in a stream.
///
/// A `RecordId` is produced by the server on append and treated as opaque by
/// the client beyond comparison and round-tripping. Within a shard, `seq` is
/// monotonically increasing, so ids from one shard are totally ordered in
/// append order. Ordering across shards is derived lexicographically but is
/// not part of the contract.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RecordId {
    /// Shard the record was appended to.
    pub shard_id: u64,
    /// Position within the shard, assigned in append order.
    pub seq: u64,
}

impl RecordId {
    pub fn new(shard_id: u64, seq: u64) -> Self {
        Self { shard_id, seq }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.shard_id, self.seq)
    }
}

/// A record delivered to a consumer by `poll()`.
///
/// Ownership transfers to the caller; the payload is a cheaply cloneable
/// `Bytes` buffer.
#[derive(Debug, Clone)]
pub struct ReceivedRecord {
    /// Identifier assigned when the record was appended.
    pub record_id: RecordId,
    /// Record payload.
    pub payload: Bytes,
    /// When the client received the record.
    pub received_at: SystemTime,
}
