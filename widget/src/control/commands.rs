//! Typed host commands decoded from inbound envelopes.

use envelope::{Envelope, ErrorCode, MessageKind};
use serde_json::Value;

/// Upper bound of the host volume scale.
pub const MAX_VOLUME: u8 = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostCommand {
    ToggleChat(bool),
    CycleWidgetMode,
    AccessToken(String),
    FontSize(String),
    /// Already clamped to `0..=MAX_VOLUME`.
    SetAudioVolume(u8),
    SetVideoControlsVisibility(bool),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("{kind} payload must be {expected}")]
    InvalidPayload { kind: MessageKind, expected: &'static str },
}

impl ErrorCode for CommandError {
    fn error_code(&self) -> &'static str {
        "E_COMMAND_INVALID_PAYLOAD"
    }
}

impl HostCommand {
    /// Decode a host command. Returns `Ok(None)` for kinds the widget does
    /// not accept from the host.
    ///
    /// # Errors
    ///
    /// [`CommandError::InvalidPayload`] when the payload has the wrong shape.
    pub fn from_envelope(envelope: &Envelope) -> Result<Option<Self>, CommandError> {
        let Some(kind) = envelope.message_kind().filter(|k| k.is_inbound()) else {
            return Ok(None);
        };
        let invalid = |expected| CommandError::InvalidPayload { kind, expected };

        let command = match kind {
            MessageKind::ToggleChat => Self::ToggleChat(envelope.payload_bool().ok_or_else(|| invalid("a boolean"))?),
            MessageKind::CycleWidgetMode => Self::CycleWidgetMode,
            MessageKind::AccessToken => {
                Self::AccessToken(envelope.payload_str().ok_or_else(|| invalid("a string"))?.to_owned())
            }
            MessageKind::FontSize => Self::FontSize(font_size(envelope.payload.as_ref()).ok_or_else(|| invalid("a CSS size"))?),
            MessageKind::SetAudioVolume => {
                Self::SetAudioVolume(clamp_volume(envelope.payload_f64().ok_or_else(|| invalid("a number"))?))
            }
            MessageKind::SetVideoControlsVisibility => {
                Self::SetVideoControlsVisibility(envelope.payload_bool().ok_or_else(|| invalid("a boolean"))?)
            }
            _ => return Ok(None),
        };
        Ok(Some(command))
    }
}

/// CSS size strings pass through; bare numbers are taken as pixels.
fn font_size(payload: Option<&Value>) -> Option<String> {
    match payload? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite() && *v > 0.0).map(|v| format!("{v}px")),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_volume(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, f64::from(MAX_VOLUME)) as u8
}

#[cfg(test)]
#[path = "commands_test.rs"]
mod tests;
