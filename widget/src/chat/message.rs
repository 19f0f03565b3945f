//! Chat message model and the signaling wire payload.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Display name used when a remote payload carries none.
pub const ANONYMOUS: &str = "Anonymous";

/// Display name attached to messages authored by this widget.
pub const LOCAL_DISPLAY_NAME: &str = "Me";

/// `type` value of a chat text payload.
pub const TEXT_PAYLOAD_TYPE: &str = "text";

/// One chat line, as held by the pending queue and the display log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub message: String,
    /// Sender clock, milliseconds since the Unix epoch. Informational only.
    pub timestamp: i64,
    pub is_local: bool,
}

impl ChatMessage {
    /// Build the display entry for a payload received from another participant.
    #[must_use]
    pub fn remote(payload: TextPayload, id: String) -> Self {
        let user_name = match payload.user_name {
            Some(name) if !name.is_empty() => name,
            _ => ANONYMOUS.to_owned(),
        };
        Self {
            id,
            user_id: payload.user_id,
            user_name,
            message: payload.message,
            timestamp: payload.timestamp,
            is_local: false,
        }
    }

    /// Build the local echo of a message this widget is sending.
    #[must_use]
    pub fn local(id: String, user_id: impl Into<String>, message: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id,
            user_id: user_id.into(),
            user_name: LOCAL_DISPLAY_NAME.to_owned(),
            message: message.into(),
            timestamp,
            is_local: true,
        }
    }
}

// =============================================================================
// WIRE PAYLOAD
// =============================================================================

/// Payload published on the signaling channel for every chat line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub timestamp: i64,
    pub user_id: String,
    #[serde(default)]
    pub user_name: Option<String>,
}

impl TextPayload {
    #[must_use]
    pub fn text(message: impl Into<String>, timestamp: i64, user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            kind: TEXT_PAYLOAD_TYPE.to_owned(),
            message: message.into(),
            timestamp,
            user_id: user_id.into(),
            user_name: Some(user_name.into()),
        }
    }

    #[must_use]
    pub fn is_text(&self) -> bool {
        self.kind == TEXT_PAYLOAD_TYPE
    }
}

/// Error returned by [`parse_payload`].
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("malformed chat payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Parse the JSON text delivered by the transport.
///
/// # Errors
///
/// Returns [`PayloadError::Malformed`] for invalid JSON or missing fields.
pub fn parse_payload(raw: &str) -> Result<TextPayload, PayloadError> {
    Ok(serde_json::from_str(raw)?)
}

// =============================================================================
// IDENTITY
// =============================================================================

/// Per-session message id source.
///
/// Ids are `{user}-{timestamp}-{seq}`. The sequence keeps two messages from
/// the same sender in the same millisecond distinct.
#[derive(Debug, Default)]
pub struct MessageIds {
    seq: AtomicU64,
}

impl MessageIds {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, user_id: &str, timestamp: i64) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{user_id}-{timestamp}-{seq}")
    }
}

/// Current time as milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
