//! # Domain Layer
//!
//! The domain layer contains the core admission rules of the waiting room.
//! It is independent of any external frameworks or infrastructure concerns.
//!
//! ## Structure
//!
//! - **entities**: Waiting records, status updates and the queue store contract
//! - **rendezvous**: Pub/sub topic names shared by sessions and workers
//! - **services**: Pure domain services (position estimation)

pub mod entities;
pub mod rendezvous;
pub mod services;

// Re-export commonly used types
pub use entities::*;
pub use services::*;
