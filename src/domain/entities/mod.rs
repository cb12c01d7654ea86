//! # Domain Entities
//!
//! Core domain entities of the waiting room.
//!
//! - **WaitingRecord**: a client's persisted place in the admission queue
//! - **StatusUpdate**: the transient queue status pushed to a connected client
//!
//! ## Store Trait
//!
//! `QueueStore` defines the persisted list and pub/sub contract. It is
//! implemented in the infrastructure layer (Redis and in-memory).

mod status;
mod waiting_record;

pub use status::StatusUpdate;
pub use waiting_record::{QueueStore, Subscription, WaitingRecord};
