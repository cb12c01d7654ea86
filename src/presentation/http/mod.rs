//! HTTP Surface
//!
//! Router, health probes, metrics and the administrative finish-all endpoint.

pub mod handlers;
pub mod routes;
