//! # Waiting Room Library
//!
//! Virtual waiting room for high-demand ticket sales:
//! - WebSocket queue endpoint running one state machine per client
//! - Bounded pool of admission workers draining the arrival queue
//! - Redis (or in-process) queue store and pub/sub rendezvous
//! - Signed purchase tokens for admitted clients
//!
//! ## Architecture
//!
//! - **Domain Layer**: Waiting records, status updates, the queue store
//!   contract, rendezvous topics and the position estimator
//! - **Application Layer**: Admission workers and purchase tokens
//! - **Infrastructure Layer**: Queue store implementations and metrics
//! - **Presentation Layer**: HTTP routes and WebSocket sessions
//!
//! ## Module Structure
//!
//! ```text
//! waiting_room/
//! +-- config/         Configuration management
//! +-- domain/         Entities, rendezvous topics, position estimator
//! +-- application/    Admission worker, token service
//! +-- infrastructure/ Redis and in-process queue stores, metrics
//! +-- presentation/   HTTP routes, WebSocket sessions and registry
//! +-- shared/         Error types
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Business services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
