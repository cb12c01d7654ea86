//! Presentation Layer
//!
//! HTTP routes, the administrative surface and the WebSocket queue endpoint.

pub mod http;
pub mod middleware;
pub mod websocket;
