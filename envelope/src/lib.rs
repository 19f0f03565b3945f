//! Envelope: the cross-frame wire model shared by the widget and its host page.
//!
//! ARCHITECTURE
//! ============
//! Every message crossing the iframe boundary is an [`Envelope`]:
//! `{ type, payload?, error?, requestId? }`. Notifications carry only `type`
//! and an optional `payload`. Request/response pairs correlate through
//! `requestId`; a response carrying `error` is a rejection.
//!
//! DESIGN
//! ======
//! - `type` stays a plain string on the wire so unknown kinds decode cleanly
//!   and can be ignored by the receiver instead of failing the decode.
//! - [`MessageKind`] is the closed set of kinds this widget understands.
//! - Absent optional fields are omitted on encode.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Payload key for grepable error codes on rejections.
pub const PAYLOAD_CODE: &str = "code";

/// Payload key for the retryable flag on rejections.
pub const PAYLOAD_RETRYABLE: &str = "retryable";

// =============================================================================
// ERRORS
// =============================================================================

/// Error returned by the envelope decoders.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw text is not JSON, or the JSON is not envelope-shaped.
    #[error("failed to decode envelope: {0}")]
    Json(#[from] serde_json::Error),
    /// The envelope has an empty `type`.
    #[error("envelope is missing a type")]
    MissingType,
}

/// Grepable error code and retryable flag for structured rejections.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

impl ErrorCode for CodecError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Json(_) => "E_ENVELOPE_JSON",
            Self::MissingType => "E_ENVELOPE_MISSING_TYPE",
        }
    }
}

// =============================================================================
// MESSAGE KINDS
// =============================================================================

/// Message kinds understood by the widget, in both directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    // Host -> widget.
    ToggleChat,
    CycleWidgetMode,
    AccessToken,
    FontSize,
    SetAudioVolume,
    SetVideoControlsVisibility,
    // Widget -> host.
    StateUpdate,
    MediaConnecting,
    MediaConnected,
    MediaConnectionFailed,
    ChatConnecting,
    ChatConnected,
    ChatConnectionFailed,
    EmojiSelected,
    EmojiModelOpened,
    ResizeWidget,
}

impl MessageKind {
    /// Every kind, host-bound and widget-bound.
    pub const ALL: [Self; 16] = [
        Self::ToggleChat,
        Self::CycleWidgetMode,
        Self::AccessToken,
        Self::FontSize,
        Self::SetAudioVolume,
        Self::SetVideoControlsVisibility,
        Self::StateUpdate,
        Self::MediaConnecting,
        Self::MediaConnected,
        Self::MediaConnectionFailed,
        Self::ChatConnecting,
        Self::ChatConnected,
        Self::ChatConnectionFailed,
        Self::EmojiSelected,
        Self::EmojiModelOpened,
        Self::ResizeWidget,
    ];

    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ToggleChat => "TOGGLE_CHAT",
            Self::CycleWidgetMode => "CYCLE_WIDGET_MODE",
            Self::AccessToken => "ACCESS_TOKEN",
            Self::FontSize => "FONT_SIZE",
            Self::SetAudioVolume => "SET_AUDIO_VOLUME",
            Self::SetVideoControlsVisibility => "SET_VIDEO_CONTROLS_VISIBILITY",
            Self::StateUpdate => "STATE_UPDATE",
            Self::MediaConnecting => "MEDIA_CONNECTING",
            Self::MediaConnected => "MEDIA_CONNECTED",
            Self::MediaConnectionFailed => "MEDIA_CONNECTION_FAILED",
            Self::ChatConnecting => "CHAT_CONNECTING",
            Self::ChatConnected => "CHAT_CONNECTED",
            Self::ChatConnectionFailed => "CHAT_CONNECTION_FAILED",
            Self::EmojiSelected => "EMOJI_SELECTED",
            Self::EmojiModelOpened => "EMOJI_MODEL_OPENED",
            Self::ResizeWidget => "RESIZE_WIDGET",
        }
    }

    /// Parse a wire name. Unknown names yield `None`.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// True for kinds the host sends to the widget.
    #[must_use]
    pub fn is_inbound(self) -> bool {
        matches!(
            self,
            Self::ToggleChat
                | Self::CycleWidgetMode
                | Self::AccessToken
                | Self::FontSize
                | Self::SetAudioVolume
                | Self::SetVideoControlsVisibility
        )
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ENVELOPE
// =============================================================================

/// A single message on the cross-frame control channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Wire name of the message kind.
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Rejection text on a response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Correlates a response with the request that caused it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl Envelope {
    /// Notification without a payload.
    #[must_use]
    pub fn event(kind: MessageKind) -> Self {
        Self { kind: kind.as_str().to_owned(), payload: None, error: None, request_id: None }
    }

    /// Notification carrying a payload.
    #[must_use]
    pub fn with_payload(kind: MessageKind, payload: Value) -> Self {
        Self { payload: Some(payload), ..Self::event(kind) }
    }

    /// Request with a freshly generated `requestId`.
    pub fn request(kind: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            kind: kind.into(),
            payload,
            error: None,
            request_id: Some(Uuid::new_v4().to_string()),
        }
    }

    /// Successful response to this request. Inherits `type` and `requestId`.
    #[must_use]
    pub fn reply(&self, payload: Option<Value>) -> Self {
        Self { kind: self.kind.clone(), payload, error: None, request_id: self.request_id.clone() }
    }

    /// Rejection of this request with a plain message.
    #[must_use]
    pub fn reject(&self, message: impl Into<String>) -> Self {
        Self {
            kind: self.kind.clone(),
            payload: None,
            error: Some(message.into()),
            request_id: self.request_id.clone(),
        }
    }

    /// Structured rejection from a typed error.
    #[must_use]
    pub fn reject_from(&self, err: &(impl ErrorCode + ?Sized)) -> Self {
        let mut data = Map::new();
        data.insert(PAYLOAD_CODE.into(), Value::String(err.error_code().to_owned()));
        data.insert(PAYLOAD_RETRYABLE.into(), Value::Bool(err.retryable()));
        Self { payload: Some(Value::Object(data)), ..self.reject(err.to_string()) }
    }

    /// The known kind of this envelope, if any.
    #[must_use]
    pub fn message_kind(&self) -> Option<MessageKind> {
        MessageKind::from_wire(&self.kind)
    }

    #[must_use]
    pub fn payload_bool(&self) -> Option<bool> {
        self.payload.as_ref().and_then(Value::as_bool)
    }

    #[must_use]
    pub fn payload_str(&self) -> Option<&str> {
        self.payload.as_ref().and_then(Value::as_str)
    }

    #[must_use]
    pub fn payload_f64(&self) -> Option<f64> {
        self.payload.as_ref().and_then(Value::as_f64)
    }
}

// =============================================================================
// CODEC
// =============================================================================

/// Decode an envelope from an already-parsed JSON value.
///
/// # Errors
///
/// Returns [`CodecError::Json`] when the value is not an object of the right
/// shape and [`CodecError::MissingType`] when `type` is absent or empty.
pub fn decode_value(value: Value) -> Result<Envelope, CodecError> {
    let envelope: Envelope = serde_json::from_value(value)?;
    if envelope.kind.is_empty() {
        return Err(CodecError::MissingType);
    }
    Ok(envelope)
}

/// Encode an envelope as compact JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn encode(envelope: &Envelope) -> Result<String, CodecError> {
    Ok(serde_json::to_string(envelope)?)
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
