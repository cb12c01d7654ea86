//! WebSocket Queue Endpoint
//!
//! Connection sessions, the process-wide session registry and the transport
//! bridge between them.

pub mod handler;
pub mod messages;
pub mod registry;
pub mod session;

pub use handler::queue_handler;
pub use messages::{ClientAction, Inbound, Outbound};
pub use registry::{QueueRegistry, SessionFinisher, SessionHandle};
pub use session::{ClientState, CloseReason, ConnectionSession, SessionContext, SessionError};
