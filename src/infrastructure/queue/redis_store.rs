//! Redis Queue Store
//!
//! `QueueStore` implementation shared by every process of a deployment.
//!
//! The waiting list is a Redis list of JSON records appended with RPUSH, so
//! index 0 is the oldest arrival. Lookups, replacements and removals match
//! on the record's `client_id` inside Lua scripts, which makes each
//! scan-and-mutate atomic with respect to other writers.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use tracing::{debug, instrument, warn};

use crate::config::RedisSettings;
use crate::domain::entities::{QueueStore, Subscription, WaitingRecord};
use crate::shared::error::StoreError;

/// Append the record and announce it, unless the client is already queued.
const ENQUEUE_SCRIPT: &str = r#"
local items = redis.call('LRANGE', KEYS[1], 0, -1)
for _, item in ipairs(items) do
    local ok, record = pcall(cjson.decode, item)
    if ok and record['client_id'] == ARGV[1] then
        return 0
    end
end
redis.call('RPUSH', KEYS[1], ARGV[2])
redis.call('PUBLISH', KEYS[2], ARGV[2])
return 1
"#;

/// Overwrite the record for a client in place.
const REPLACE_SCRIPT: &str = r#"
local items = redis.call('LRANGE', KEYS[1], 0, -1)
for index, item in ipairs(items) do
    local ok, record = pcall(cjson.decode, item)
    if ok and record['client_id'] == ARGV[1] then
        redis.call('LSET', KEYS[1], index - 1, ARGV[2])
        return 1
    end
end
return 0
"#;

/// Remove the record for a client, returning how many entries were removed.
const REMOVE_SCRIPT: &str = r#"
local items = redis.call('LRANGE', KEYS[1], 0, -1)
for _, item in ipairs(items) do
    local ok, record = pcall(cjson.decode, item)
    if ok and record['client_id'] == ARGV[1] then
        return redis.call('LREM', KEYS[1], 1, item)
    end
end
return 0
"#;

/// Redis-backed queue store.
///
/// Commands go through a `ConnectionManager`; every subscription opens its
/// own pub/sub connection, closed when the subscription stream is dropped.
#[derive(Clone)]
pub struct RedisQueueStore {
    client: Client,
    conn: ConnectionManager,
    waiting_list: String,
    arrival_topic: String,
    claim_prefix: String,
}

impl RedisQueueStore {
    /// Connect to Redis using the given settings.
    #[instrument(skip(settings), fields(url = %settings.url))]
    pub async fn connect(settings: &RedisSettings) -> Result<Self, StoreError> {
        let client = Client::open(settings.url.as_str())?;
        let conn = ConnectionManager::new(client.clone()).await?;
        debug!("Redis queue store connected");

        Ok(Self {
            client,
            conn,
            waiting_list: settings.waiting_list.clone(),
            arrival_topic: settings.arrival_topic.clone(),
            claim_prefix: settings.claim_prefix.clone(),
        })
    }

    fn claim_key(&self, client_id: &str) -> String {
        format!("{}{}", self.claim_prefix, client_id)
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn enqueue(&self, record: &WaitingRecord) -> Result<(), StoreError> {
        let payload = record.to_json()?;
        let mut conn = self.conn.clone();

        let appended: i64 = Script::new(ENQUEUE_SCRIPT)
            .key(&self.waiting_list)
            .key(&self.arrival_topic)
            .arg(&record.client_id)
            .arg(payload)
            .invoke_async(&mut conn)
            .await?;

        if appended == 0 {
            return Err(StoreError::Duplicate(record.client_id.clone()));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<WaitingRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let items: Vec<String> = conn.lrange(&self.waiting_list, 0, -1).await?;

        let mut records = Vec::with_capacity(items.len());
        for item in items {
            match WaitingRecord::from_json(&item) {
                Ok(record) => records.push(record),
                Err(e) => {
                    // Foreign entries must not hide everyone behind them
                    warn!(error = %e, "Skipping malformed waiting record");
                }
            }
        }
        Ok(records)
    }

    async fn find(&self, client_id: &str) -> Result<Option<WaitingRecord>, StoreError> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|record| record.client_id == client_id))
    }

    async fn replace(&self, record: &WaitingRecord) -> Result<(), StoreError> {
        let payload = record.to_json()?;
        let mut conn = self.conn.clone();

        let replaced: i64 = Script::new(REPLACE_SCRIPT)
            .key(&self.waiting_list)
            .arg(&record.client_id)
            .arg(payload)
            .invoke_async(&mut conn)
            .await?;

        if replaced == 0 {
            return Err(StoreError::NotFound(record.client_id.clone()));
        }
        Ok(())
    }

    async fn remove(&self, client_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();

        let removed: i64 = Script::new(REMOVE_SCRIPT)
            .key(&self.waiting_list)
            .arg(client_id)
            .invoke_async(&mut conn)
            .await?;

        Ok(removed > 0)
    }

    async fn claim(
        &self,
        client_id: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let reply: Option<String> = redis::cmd("SET")
            .arg(self.claim_key(client_id))
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _receivers: i64 = conn.publish(topic, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, StoreError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(topic).await?;

        debug!(topic = %topic, "Subscribed to Redis topic");

        let topic = topic.to_string();
        let stream = pubsub.into_on_message().filter_map(move |message| {
            let payload = message.get_payload::<String>();
            let topic = topic.clone();
            async move {
                match payload {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "Dropping undecodable message");
                        None
                    }
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
