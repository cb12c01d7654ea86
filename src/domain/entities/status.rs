//! Status update pushed to a waiting client.

use serde::{Deserialize, Serialize};

use crate::domain::services::QueueEstimate;

/// Queue status projection sent over the WebSocket. Never persisted.
///
/// Wire format: `{client_id, position, is_ready_to_buy, time_left, token_to_buy}`
/// with `time_left` in seconds and `position` 1-based (0 when unknown).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub client_id: String,
    pub position: usize,
    pub is_ready_to_buy: bool,
    pub time_left: u64,
    pub token_to_buy: String,
}

impl StatusUpdate {
    /// Periodic waiting status. An unknown estimate maps to the placeholder
    /// `position = 0, time_left = 0`.
    pub fn waiting(client_id: impl Into<String>, estimate: Option<QueueEstimate>) -> Self {
        let (position, time_left) = estimate
            .map(|e| (e.position, e.time_left.as_secs()))
            .unwrap_or((0, 0));

        Self {
            client_id: client_id.into(),
            position,
            is_ready_to_buy: false,
            time_left,
            token_to_buy: String::new(),
        }
    }

    /// Admission status carrying the purchase token.
    pub fn ready_to_buy(client_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            position: 0,
            is_ready_to_buy: true,
            time_left: 0,
            token_to_buy: token.into(),
        }
    }
}
