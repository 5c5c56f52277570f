//! In-memory broker used by the integration tests.
//!
//! Implements [`StreamTransport`] with the server-side behaviors the client
//! contract depends on: order-preserving appends with one id per record,
//! long-polling with a bounded wait, exclusive subscription sessions with
//! duplicate rejection, cursor persistence across sessions (reopen resumes
//! from the last delivered position), and lease invalidation for session-loss
//! scenarios.

#![allow(dead_code)]

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;
use siphasher::sip::SipHasher;
use tokio::sync::{Mutex, Notify};

use streambus_client::{
    ClientError, ReceivedRecord, RecordId, Result, StreamTransport, SubscriptionSession,
};

struct StreamState {
    shard_id: u64,
    next_seq: u64,
    records: Vec<(RecordId, Bytes)>,
}

struct SubscriptionState {
    stream: String,
    /// Delivery cursor; survives session close so a reopened session resumes.
    cursor: usize,
    /// Token of the currently active session, if any.
    active_token: Option<u64>,
}

/// Single-process broker backing the transport port.
pub struct MemoryBroker {
    streams: Mutex<HashMap<String, StreamState>>,
    subscriptions: Mutex<HashMap<String, SubscriptionState>>,
    arrivals: Notify,
    next_token: AtomicU64,
    append_calls: AtomicUsize,
    fail_appends: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            streams: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            arrivals: Notify::new(),
            next_token: AtomicU64::new(0),
            append_calls: AtomicUsize::new(0),
            fail_appends: AtomicBool::new(false),
        })
    }

    /// Number of `append` calls observed, successful or not.
    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    /// Make every subsequent `append` fail with a transport error.
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Simulate server-side lease expiry or takeover: the current session's
    /// token stops being valid, so its next poll fails with `SessionLost`.
    pub async fn invalidate_session(&self, subscription: &str) {
        if let Some(sub) = self.subscriptions.lock().await.get_mut(subscription) {
            sub.active_token = None;
        }
        self.arrivals.notify_waiters();
    }

    fn shard_id_for(stream: &str) -> u64 {
        let mut hasher = SipHasher::new();
        stream.hash(&mut hasher);
        hasher.finish()
    }
}

#[async_trait]
impl StreamTransport for MemoryBroker {
    async fn append(&self, stream: &str, records: Vec<Bytes>) -> Result<Vec<RecordId>> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("injected append failure".into()));
        }

        let mut streams = self.streams.lock().await;
        let state = streams
            .entry(stream.to_string())
            .or_insert_with(|| StreamState {
                shard_id: Self::shard_id_for(stream),
                next_seq: 0,
                records: Vec::new(),
            });

        let ids: Vec<RecordId> = records
            .into_iter()
            .map(|payload| {
                let id = RecordId::new(state.shard_id, state.next_seq);
                state.next_seq += 1;
                state.records.push((id, payload));
                id
            })
            .collect();
        drop(streams);

        self.arrivals.notify_waiters();
        Ok(ids)
    }

    async fn poll(
        &self,
        session: &SubscriptionSession,
        max_records: usize,
        timeout: Duration,
    ) -> Result<Vec<ReceivedRecord>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Register for wakeups before checking state so an append between
            // the check and the wait is not missed. `enable` performs the
            // registration now; merely creating the future does not.
            let mut notified = std::pin::pin!(self.arrivals.notified());
            notified.as_mut().enable();

            {
                let mut subs = self.subscriptions.lock().await;
                let sub = subs
                    .get_mut(&session.subscription)
                    .ok_or_else(|| ClientError::SessionLost(session.subscription.clone()))?;
                if sub.active_token != Some(session.token) {
                    return Err(ClientError::SessionLost(session.subscription.clone()));
                }

                let streams = self.streams.lock().await;
                if let Some(stream) = streams.get(&sub.stream) {
                    if sub.cursor < stream.records.len() {
                        let end = (sub.cursor + max_records).min(stream.records.len());
                        let out = stream.records[sub.cursor..end]
                            .iter()
                            .map(|(id, payload)| ReceivedRecord {
                                record_id: *id,
                                payload: payload.clone(),
                                received_at: SystemTime::now(),
                            })
                            .collect();
                        sub.cursor = end;
                        return Ok(out);
                    }
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                // Bounded wait elapsed with nothing available: not an error.
                return Ok(Vec::new());
            }
        }
    }

    async fn open_session(&self, subscription: &str, stream: &str) -> Result<SubscriptionSession> {
        let mut subs = self.subscriptions.lock().await;
        let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;

        match subs.entry(subscription.to_string()) {
            Entry::Occupied(mut entry) => {
                let sub = entry.get_mut();
                if sub.active_token.is_some() {
                    return Err(ClientError::DuplicateSubscription(subscription.to_string()));
                }
                // Reattach: keep the cursor so the new session resumes.
                sub.active_token = Some(token);
            }
            Entry::Vacant(entry) => {
                entry.insert(SubscriptionState {
                    stream: stream.to_string(),
                    cursor: 0,
                    active_token: Some(token),
                });
            }
        }

        Ok(SubscriptionSession {
            subscription: subscription.to_string(),
            stream: stream.to_string(),
            token,
        })
    }

    async fn close_session(&self, session: &SubscriptionSession) -> Result<()> {
        let mut subs = self.subscriptions.lock().await;
        if let Some(sub) = subs.get_mut(&session.subscription) {
            if sub.active_token == Some(session.token) {
                sub.active_token = None;
            }
        }
        Ok(())
    }
}
