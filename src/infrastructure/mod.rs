//! Infrastructure Layer
//!
//! Contains implementations for external services including:
//! - Queue stores (Redis, in-process)
//! - Prometheus metrics

pub mod metrics;
pub mod queue;
