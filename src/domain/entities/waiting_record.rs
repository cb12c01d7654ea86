//! Waiting record entity and queue store trait.
//!
//! A waiting record is one client's place in the admission queue. It lives in
//! the persisted queue store and outlives the WebSocket session that created
//! it, so a client that drops its connection can reconnect and resume.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::shared::error::StoreError;

/// Represents one client waiting to be admitted into the sale.
///
/// Serialized as JSON in the persisted waiting list:
/// - client_id: opaque id, unique per logical client
/// - heartbeat_at: RFC 3339 timestamp of the last liveness signal
/// - birthday: RFC 3339 timestamp of the original arrival (never changes)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingRecord {
    /// Client identifier (list key)
    pub client_id: String,

    /// Last liveness signal from the connected session
    pub heartbeat_at: DateTime<Utc>,

    /// Original arrival time, preserved across reconnects
    pub birthday: DateTime<Utc>,
}

impl WaitingRecord {
    /// Create a record for a client arriving now.
    pub fn arriving(client_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            client_id: client_id.into(),
            heartbeat_at: at,
            birthday: at,
        }
    }

    /// Copy of this record with a refreshed heartbeat. The birthday is kept.
    pub fn with_heartbeat(&self, at: DateTime<Utc>) -> Self {
        Self {
            client_id: self.client_id.clone(),
            heartbeat_at: at,
            birthday: self.birthday,
        }
    }

    /// Time elapsed since the last heartbeat, zero if the heartbeat is in the future.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.heartbeat_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Whether the client has been silent for longer than `max_alive`.
    pub fn is_expired(&self, now: DateTime<Utc>, max_alive: Duration) -> bool {
        self.idle_for(now) > max_alive
    }

    /// Serialize into the list/arrival payload format.
    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a list/arrival payload.
    pub fn from_json(payload: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// Stream of payloads published on one topic. Dropping it unsubscribes.
pub type Subscription = BoxStream<'static, String>;

/// Persisted queue store: the ordered waiting list plus the pub/sub bus.
///
/// Implementations must serialize conflicting writes to the same record.
/// Index 0 of [`QueueStore::list`] is the oldest arrival.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append a record and publish it on the arrival topic in one atomic step.
    ///
    /// Fails with `StoreError::Duplicate` if a record with the same
    /// `client_id` is already queued.
    async fn enqueue(&self, record: &WaitingRecord) -> Result<(), StoreError>;

    /// Full waiting list in arrival order.
    async fn list(&self) -> Result<Vec<WaitingRecord>, StoreError>;

    /// Look up a record by client id.
    async fn find(&self, client_id: &str) -> Result<Option<WaitingRecord>, StoreError>;

    /// Replace the record with the same client id, keeping its list position.
    async fn replace(&self, record: &WaitingRecord) -> Result<(), StoreError>;

    /// Remove the record for `client_id`.
    ///
    /// Returns `true` only for the caller that actually removed it, so
    /// concurrent removers cannot both believe they retired the record.
    async fn remove(&self, client_id: &str) -> Result<bool, StoreError>;

    /// Take the exclusive admission claim for `client_id`.
    ///
    /// Returns `false` if another owner holds an unexpired claim.
    async fn claim(&self, client_id: &str, owner: &str, ttl: Duration)
        -> Result<bool, StoreError>;

    /// Publish a payload on a topic. Nobody listening is not an error.
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), StoreError>;

    /// Subscribe to a topic. Messages published after this returns are delivered.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, StoreError>;

    /// Connectivity check.
    async fn ping(&self) -> Result<(), StoreError>;
}
