//! Session state as seen by observers.

use serde::{Deserialize, Serialize};

use crate::record::TraceRecord;

/// Connection state owned by the session controller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SessionState {
    /// No active transport.
    #[default]
    Disconnected,
    /// Handshake or activation in flight.
    Connecting,
    /// Activation acknowledged, receive loop running.
    Connected,
    /// The last attempt ended with an error.
    Failed(String),
}

impl SessionState {
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Failure message, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Flattened form for UI bindings.
    #[must_use]
    pub fn to_update(&self) -> StateUpdate {
        StateUpdate {
            connected: self.is_connected(),
            error_message: self.error_message().unwrap_or_default().to_string(),
        }
    }
}

/// State notification for a presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    pub connected: bool,
    pub error_message: String,
}

/// Item published on the ordered consumer feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RelayEvent {
    /// Records decoded from one frame.
    Records(Vec<TraceRecord>),
    /// Controller state transition.
    State(SessionState),
    /// The subscriber fell behind and this many events were dropped for it.
    /// Only ever yielded by live streams, never kept in history.
    Lagged(u64),
}

impl RelayEvent {
    /// Rough size in bytes, used to bound feed history.
    #[must_use]
    pub fn approx_bytes(&self) -> usize {
        const OVERHEAD: usize = 8;
        match self {
            Self::Records(records) => {
                OVERHEAD + records.iter().map(TraceRecord::approx_bytes).sum::<usize>()
            }
            Self::State(SessionState::Failed(reason)) => OVERHEAD + reason.len(),
            Self::State(_) | Self::Lagged(_) => OVERHEAD,
        }
    }
}
