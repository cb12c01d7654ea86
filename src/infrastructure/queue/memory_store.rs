//! In-Process Queue Store
//!
//! `QueueStore` implementation for single-process deployments and tests.
//! The waiting list sits behind one mutex, which also makes enqueue
//! (append + publish) atomic. Rendezvous topics are tokio broadcast channels
//! created on first subscription. The arrival topic is different: every
//! worker gets its own unbounded channel, so an arrival is never dropped
//! while all workers are busy inside a purchase window.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::entities::{QueueStore, Subscription, WaitingRecord};
use crate::domain::rendezvous;
use crate::shared::error::StoreError;

/// Messages buffered per rendezvous topic before slow subscribers start lagging
const TOPIC_CAPACITY: usize = 256;

/// In-memory queue store
pub struct MemoryQueueStore {
    records: Mutex<Vec<WaitingRecord>>,
    topics: DashMap<String, broadcast::Sender<String>>,
    claims: Mutex<HashMap<String, (String, Instant)>>,
    arrivals: Mutex<Vec<mpsc::UnboundedSender<String>>>,
    arrival_topic: String,
}

impl MemoryQueueStore {
    /// Create an empty store using the default arrival topic
    pub fn new() -> Self {
        Self::with_arrival_topic(rendezvous::ARRIVAL_TOPIC)
    }

    /// Create an empty store announcing arrivals on `arrival_topic`
    pub fn with_arrival_topic(arrival_topic: impl Into<String>) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            topics: DashMap::new(),
            claims: Mutex::new(HashMap::new()),
            arrivals: Mutex::new(Vec::new()),
            arrival_topic: arrival_topic.into(),
        }
    }

    /// Number of queued records
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the waiting list is empty
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn send(&self, topic: &str, payload: &str) {
        if topic == self.arrival_topic {
            // Drop workers whose stream is gone
            self.arrivals
                .lock()
                .retain(|worker| worker.unbounded_send(payload.to_string()).is_ok());
            return;
        }

        if let Some(sender) = self.topics.get(topic) {
            let _ = sender.send(payload.to_string());
        }
        // Drop topics nobody listens to any more
        self.topics
            .remove_if(topic, |_, sender| sender.receiver_count() == 0);
    }
}

impl Default for MemoryQueueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn enqueue(&self, record: &WaitingRecord) -> Result<(), StoreError> {
        let payload = record.to_json()?;
        let mut records = self.records.lock();

        if records.iter().any(|r| r.client_id == record.client_id) {
            return Err(StoreError::Duplicate(record.client_id.clone()));
        }

        records.push(record.clone());
        // Publish while still holding the list lock
        self.send(&self.arrival_topic, &payload);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WaitingRecord>, StoreError> {
        Ok(self.records.lock().clone())
    }

    async fn find(&self, client_id: &str) -> Result<Option<WaitingRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .iter()
            .find(|r| r.client_id == client_id)
            .cloned())
    }

    async fn replace(&self, record: &WaitingRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock();
        match records.iter_mut().find(|r| r.client_id == record.client_id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(record.client_id.clone())),
        }
    }

    async fn remove(&self, client_id: &str) -> Result<bool, StoreError> {
        let mut records = self.records.lock();
        match records.iter().position(|r| r.client_id == client_id) {
            Some(index) => {
                records.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn claim(
        &self,
        client_id: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut claims = self.claims.lock();
        claims.retain(|_, (_, expires_at)| *expires_at > now);

        if claims.contains_key(client_id) {
            return Ok(false);
        }
        claims.insert(client_id.to_string(), (owner.to_string(), now + ttl));
        Ok(true)
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), StoreError> {
        self.send(topic, payload);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, StoreError> {
        if topic == self.arrival_topic {
            let (tx, rx) = mpsc::unbounded();
            self.arrivals.lock().push(tx);
            debug!(topic = %topic, "Subscribed to arrivals");
            return Ok(rx.boxed());
        }

        let receiver = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe();

        debug!(topic = %topic, "Subscribed to in-memory topic");

        let topic = topic.to_string();
        let stream = futures::stream::unfold(receiver, move |mut receiver| {
            let topic = topic.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(payload) => return Some((payload, receiver)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(topic = %topic, skipped, "Topic subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
