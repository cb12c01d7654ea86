//! Queue Store Module
//!
//! Implementations of the persisted waiting list and pub/sub bus.
//!
//! ```text
//! +-------------------+
//! | Session / Worker  |
//! +-------------------+
//!          |
//!          v
//! +-------------------+
//! | QueueStore trait  |  <-- Domain contract
//! +-------------------+
//!       |        |
//!       v        v
//! +---------+ +--------------------+
//! |  Redis  | | MemoryQueueStore   |
//! +---------+ +--------------------+
//! ```

mod memory_store;
mod redis_store;

pub use memory_store::MemoryQueueStore;
pub use redis_store::RedisQueueStore;

use std::sync::Arc;

use tracing::{info, instrument};

use crate::config::{Settings, StoreBackend};
use crate::domain::entities::QueueStore;
use crate::shared::error::StoreError;

/// Creates the queue store selected by `queue.backend`.
///
/// # Errors
/// Returns `StoreError::Redis` if the Redis backend cannot connect.
#[instrument(skip(settings), fields(backend = ?settings.queue.backend))]
pub async fn create_queue_store(settings: &Settings) -> Result<Arc<dyn QueueStore>, StoreError> {
    match settings.queue.backend {
        StoreBackend::Redis => {
            info!(url = %settings.redis.url, "Connecting to Redis...");
            let store = RedisQueueStore::connect(&settings.redis).await?;
            info!("Redis connection established");
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            info!("Using in-process queue store");
            Ok(Arc::new(MemoryQueueStore::with_arrival_topic(
                settings.redis.arrival_topic.clone(),
            )))
        }
    }
}
