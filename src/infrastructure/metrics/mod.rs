//! Prometheus Metrics Module
//!
//! Provides application-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Registered waiting sessions gauge
//! - Closed sessions by close reason
//! - Admission attempts by outcome
//! - Periodic status broadcasts

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Sessions currently registered in the queue registry
pub static SESSIONS_REGISTERED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("sessions_registered", "Number of registered waiting sessions")
            .namespace("waiting_room"),
    )
    .expect("Failed to create SESSIONS_REGISTERED metric")
});

/// Closed sessions by reason
pub static SESSIONS_CLOSED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("sessions_closed_total", "Total number of closed sessions")
            .namespace("waiting_room"),
        &["reason"],
    )
    .expect("Failed to create SESSIONS_CLOSED_TOTAL metric")
});

/// Admission attempts by outcome
pub static ADMISSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("admissions_total", "Total number of processed arrivals")
            .namespace("waiting_room"),
        &["outcome"],
    )
    .expect("Failed to create ADMISSIONS_TOTAL metric")
});

/// Status broadcast ticks
pub static STATUS_BROADCASTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(
        Opts::new("status_broadcasts_total", "Total number of status broadcast ticks")
            .namespace("waiting_room"),
    )
    .expect("Failed to create STATUS_BROADCASTS_TOTAL metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(SESSIONS_REGISTERED.clone()))
        .expect("Failed to register SESSIONS_REGISTERED");
    registry
        .register(Box::new(SESSIONS_CLOSED_TOTAL.clone()))
        .expect("Failed to register SESSIONS_CLOSED_TOTAL");
    registry
        .register(Box::new(ADMISSIONS_TOTAL.clone()))
        .expect("Failed to register ADMISSIONS_TOTAL");
    registry
        .register(Box::new(STATUS_BROADCASTS_TOTAL.clone()))
        .expect("Failed to register STATUS_BROADCASTS_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Helper to update the registered sessions gauge
pub fn set_sessions_registered(count: usize) {
    SESSIONS_REGISTERED.set(i64::try_from(count).unwrap_or(i64::MAX));
}

/// Helper to record a closed session
pub fn record_session_closed(reason: &str) {
    SESSIONS_CLOSED_TOTAL.with_label_values(&[reason]).inc();
}

/// Helper to record an admission outcome
pub fn record_admission(outcome: &str) {
    ADMISSIONS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Helper to record a status broadcast tick
pub fn record_status_broadcast() {
    STATUS_BROADCASTS_TOTAL.inc();
}
