//! Rendezvous topic names.
//!
//! A session and the worker that claimed its arrival never talk directly;
//! they hand signals over per-client pub/sub topics:
//!
//! | Topic                | Publisher | Subscriber | Meaning                   |
//! |----------------------|-----------|------------|---------------------------|
//! | arrival topic        | session   | any worker | client entered the queue  |
//! | `sell-tm-{id}`       | worker    | session    | you may purchase now      |
//! | `finish-tm-{id}`     | worker    | session    | admission forcibly ended  |
//! | `sell-worker-{id}`   | session   | worker     | purchase completed        |
//! | `finish-worker-{id}` | session   | worker     | client left voluntarily   |
//!
//! The names must stay byte-for-byte stable: other deployments of the
//! service subscribe to them through the same Redis instance.

/// Default arrival topic.
pub const ARRIVAL_TOPIC: &str = "client-queue";

/// Default waiting list key.
pub const WAITING_LIST: &str = "messageHistory";

const SELL_SESSION_PREFIX: &str = "sell-tm-";
const FINISH_SESSION_PREFIX: &str = "finish-tm-";
const SELL_WORKER_PREFIX: &str = "sell-worker-";
const FINISH_WORKER_PREFIX: &str = "finish-worker-";

/// Worker → session: "you may buy".
#[inline]
pub fn sell_session(client_id: &str) -> String {
    format!("{}{}", SELL_SESSION_PREFIX, client_id)
}

/// Worker → session: "force finish".
#[inline]
pub fn finish_session(client_id: &str) -> String {
    format!("{}{}", FINISH_SESSION_PREFIX, client_id)
}

/// Session → worker: "purchase completed".
#[inline]
pub fn sell_worker(client_id: &str) -> String {
    format!("{}{}", SELL_WORKER_PREFIX, client_id)
}

/// Session → worker: "client left".
#[inline]
pub fn finish_worker(client_id: &str) -> String {
    format!("{}{}", FINISH_WORKER_PREFIX, client_id)
}
