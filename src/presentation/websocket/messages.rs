//! WebSocket Message Types
//!
//! Queue protocol frames. Inbound frames are JSON objects carrying an
//! `action` and, for `reconnect`, the `client_id` to resume. Outbound frames
//! are status updates.

use serde::Deserialize;

use crate::domain::entities::StatusUpdate;

/// Action names accepted from clients
pub mod action {
    pub const NEW_CLIENT: &str = "newclient";
    pub const ALIVE: &str = "alive";
    pub const RECONNECT: &str = "reconnect";
    pub const FINISHED: &str = "finished";
}

/// Raw inbound frame
#[derive(Debug, Deserialize)]
struct ActionFrame {
    action: String,
    #[serde(default)]
    client_id: Option<String>,
}

/// Client-initiated action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Join the queue
    NewClient,
    /// Heartbeat
    Alive,
    /// Resume a previously issued client id
    Reconnect { client_id: String },
    /// Leave voluntarily
    Finished,
    /// Well-formed frame with an action this server does not know
    Unknown(String),
}

impl ClientAction {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let frame: ActionFrame = serde_json::from_str(text)?;
        Ok(match frame.action.as_str() {
            action::NEW_CLIENT => Self::NewClient,
            action::ALIVE => Self::Alive,
            action::RECONNECT => Self::Reconnect {
                client_id: frame.client_id.unwrap_or_default(),
            },
            action::FINISHED => Self::Finished,
            _ => Self::Unknown(frame.action),
        })
    }
}

/// Inbound event delivered to a session by the transport reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Action(ClientAction),
    /// Frame that could not be parsed
    Malformed(String),
}

impl Inbound {
    /// Classify a text frame.
    pub fn from_text(text: &str) -> Self {
        match ClientAction::parse(text) {
            Ok(action) => Self::Action(action),
            Err(e) => Self::Malformed(e.to_string()),
        }
    }
}

/// Outbound frame handed to the transport writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Status(StatusUpdate),
    /// Close the transport
    Close,
}
