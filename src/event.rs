//! Event: the wire message types of the session relay.
//!
//! ARCHITECTURE
//! ============
//! Clients send JSON text messages discriminated by a `type` field. Inbound
//! messages parse into [`Inbound`]; the relay answers with [`Outbound`]
//! events fanned out to the session room.
//!
//! DESIGN
//! ======
//! - Both directions are tagged enums, matched exhaustively by the relay.
//! - Each outbound variant owns its echo rule (see [`Outbound::echo`]), so a
//!   new event kind cannot ship without deciding who receives it.
//! - Payloads the server never inspects (board deltas, WebRTC signaling)
//!   stay opaque `serde_json::Value`s.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EconomyError;
use crate::services::settlement::Settlement;

// =============================================================================
// INBOUND
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerAction {
    Start,
    Stop,
}

/// A message received from one connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    Chat { content: String },
    Timer { action: TimerAction },
    Whiteboard { data: serde_json::Value },
    CodeChange { code: String, language: String },
    VideoSignal { data: serde_json::Value },
}

impl Inbound {
    /// Parse one text frame. Unknown types and missing fields are errors.
    ///
    /// # Errors
    ///
    /// Returns `MalformedInput` if the text is not a known event.
    pub fn parse(text: &str) -> Result<Self, EconomyError> {
        serde_json::from_str(text).map_err(|e| EconomyError::MalformedInput(e.to_string()))
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chat { .. } => "chat",
            Self::Timer { .. } => "timer",
            Self::Whiteboard { .. } => "whiteboard",
            Self::CodeChange { .. } => "code_change",
            Self::VideoSignal { .. } => "video_signal",
        }
    }
}

// =============================================================================
// OUTBOUND
// =============================================================================

/// Whether a broadcast is redelivered to the connection that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    IncludeSender,
    ExcludeSender,
}

/// A message delivered to room members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Chat { sender: String, sender_id: Uuid, content: String },
    Timer { action: TimerAction, user_id: Uuid, user_name: String },
    Whiteboard { data: serde_json::Value },
    CodeChange { code: String, language: String },
    VideoSignal { data: serde_json::Value },
    SessionEnded { redirect_url: String, settlement: Settlement },
}

impl Outbound {
    /// Chat and timer notices confirm back to the sender's own UI; board,
    /// code and signaling deltas were already applied locally by the sender.
    #[must_use]
    pub fn echo(&self) -> Echo {
        match self {
            Self::Chat { .. } | Self::Timer { .. } | Self::SessionEnded { .. } => Echo::IncludeSender,
            Self::Whiteboard { .. } | Self::CodeChange { .. } | Self::VideoSignal { .. } => Echo::ExcludeSender,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chat { .. } => "chat",
            Self::Timer { .. } => "timer",
            Self::Whiteboard { .. } => "whiteboard",
            Self::CodeChange { .. } => "code_change",
            Self::VideoSignal { .. } => "video_signal",
            Self::SessionEnded { .. } => "session_ended",
        }
    }
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
