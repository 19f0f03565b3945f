//! Widget state: visibility mode, connection lifecycle, host settings.
//!
//! DESIGN
//! ======
//! Everything here is plain data with pure transitions. The session owns a
//! single `WidgetState` behind a mutex and decides what to post to the host
//! from the values these methods return.

use envelope::MessageKind;
use serde::Serialize;
use serde_json::{Value, json};

use crate::control::HostCommand;

// =============================================================================
// MODE
// =============================================================================

/// Which sections of the widget are visible.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WidgetMode {
    VideoChat,
    #[default]
    VideoOnly,
    AudioOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Visibility {
    pub show_chat: bool,
    pub show_video: bool,
    pub show_audio: bool,
}

impl WidgetMode {
    /// Next mode in the host's cycle order.
    ///
    /// The rotation covers all three modes. A plain video/audio-only switch
    /// would never return to `VideoChat`; here cycling does, and
    /// `TOGGLE_CHAT false` lands on `VideoOnly` rather than being ignored.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::VideoChat => Self::VideoOnly,
            Self::VideoOnly => Self::AudioOnly,
            Self::AudioOnly => Self::VideoChat,
        }
    }

    #[must_use]
    pub fn visibility(self) -> Visibility {
        match self {
            Self::VideoChat => Visibility { show_chat: true, show_video: true, show_audio: false },
            Self::VideoOnly => Visibility { show_chat: false, show_video: true, show_audio: false },
            Self::AudioOnly => Visibility { show_chat: false, show_video: false, show_audio: true },
        }
    }

    /// Wire name reported to the host as `currentAction`.
    #[must_use]
    pub fn current_action(self) -> &'static str {
        match self {
            Self::VideoChat => "SHOW_CHAT_VIDEO",
            Self::VideoOnly => "SHOW_VIDEO_ONLY",
            Self::AudioOnly => "SHOW_AUDIO_ONLY",
        }
    }
}

// =============================================================================
// CONNECTIONS
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Failed,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("{subsystem} cannot move from {from:?} to {to:?}")]
pub struct TransitionError {
    pub subsystem: Subsystem,
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// The two independently connected halves of the widget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Subsystem {
    Media,
    Chat,
}

impl Subsystem {
    #[must_use]
    pub fn connecting_kind(self) -> MessageKind {
        match self {
            Self::Media => MessageKind::MediaConnecting,
            Self::Chat => MessageKind::ChatConnecting,
        }
    }

    #[must_use]
    pub fn connected_kind(self) -> MessageKind {
        match self {
            Self::Media => MessageKind::MediaConnected,
            Self::Chat => MessageKind::ChatConnected,
        }
    }

    #[must_use]
    pub fn failed_kind(self) -> MessageKind {
        match self {
            Self::Media => MessageKind::MediaConnectionFailed,
            Self::Chat => MessageKind::ChatConnectionFailed,
        }
    }
}

impl std::fmt::Display for Subsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Media => "media",
            Self::Chat => "chat",
        })
    }
}

/// Enforces idle → connecting → connected | failed for one subsystem.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionTracker {
    subsystem: Subsystem,
    state: ConnectionState,
}

impl ConnectionTracker {
    #[must_use]
    pub fn new(subsystem: Subsystem) -> Self {
        Self { subsystem, state: ConnectionState::Idle }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True while a join is in flight or has succeeded.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.state, ConnectionState::Connecting | ConnectionState::Connected)
    }

    /// # Errors
    ///
    /// Unless the tracker is idle.
    pub fn begin(&mut self) -> Result<(), TransitionError> {
        self.advance(ConnectionState::Idle, ConnectionState::Connecting)
    }

    /// # Errors
    ///
    /// Unless the tracker is connecting.
    pub fn succeed(&mut self) -> Result<(), TransitionError> {
        self.advance(ConnectionState::Connecting, ConnectionState::Connected)
    }

    /// # Errors
    ///
    /// Unless the tracker is connecting.
    pub fn fail(&mut self) -> Result<(), TransitionError> {
        self.advance(ConnectionState::Connecting, ConnectionState::Failed)
    }

    /// Manual retry: `failed` back to `idle`.
    ///
    /// # Errors
    ///
    /// Unless the tracker has failed.
    pub fn reset(&mut self) -> Result<(), TransitionError> {
        self.advance(ConnectionState::Failed, ConnectionState::Idle)
    }

    fn advance(&mut self, from: ConnectionState, to: ConnectionState) -> Result<(), TransitionError> {
        if self.state != from {
            return Err(TransitionError { subsystem: self.subsystem, from: self.state, to });
        }
        self.state = to;
        Ok(())
    }
}

// =============================================================================
// WIDGET STATE
// =============================================================================

pub const DEFAULT_AUDIO_VOLUME: u8 = 100;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WidgetState {
    pub mode: WidgetMode,
    pub media: ConnectionTracker,
    pub chat: ConnectionTracker,
    pub token_received: bool,
    pub access_token: Option<String>,
    pub video_controls_visible: bool,
    pub audio_volume: u8,
    pub font_size: Option<String>,
}

impl Default for WidgetState {
    fn default() -> Self {
        Self {
            mode: WidgetMode::default(),
            media: ConnectionTracker::new(Subsystem::Media),
            chat: ConnectionTracker::new(Subsystem::Chat),
            token_received: false,
            access_token: None,
            video_controls_visible: true,
            audio_volume: DEFAULT_AUDIO_VOLUME,
            font_size: None,
        }
    }
}

impl WidgetState {
    #[must_use]
    pub fn tracker(&self, subsystem: Subsystem) -> &ConnectionTracker {
        match subsystem {
            Subsystem::Media => &self.media,
            Subsystem::Chat => &self.chat,
        }
    }

    pub fn tracker_mut(&mut self, subsystem: Subsystem) -> &mut ConnectionTracker {
        match subsystem {
            Subsystem::Media => &mut self.media,
            Subsystem::Chat => &mut self.chat,
        }
    }

    /// Apply a host command. Returns true when the visibility flags changed.
    pub fn apply(&mut self, command: &HostCommand) -> bool {
        let before = self.mode.visibility();
        match command {
            HostCommand::ToggleChat(true) => self.mode = WidgetMode::VideoChat,
            HostCommand::ToggleChat(false) => self.mode = WidgetMode::VideoOnly,
            HostCommand::CycleWidgetMode => self.mode = self.mode.next(),
            HostCommand::AccessToken(token) => {
                self.access_token = Some(token.clone());
                self.token_received = true;
            }
            HostCommand::FontSize(size) => self.font_size = Some(size.clone()),
            HostCommand::SetAudioVolume(volume) => self.audio_volume = *volume,
            HostCommand::SetVideoControlsVisibility(visible) => self.video_controls_visible = *visible,
        }
        self.mode.visibility() != before
    }

    /// Payload of the `STATE_UPDATE` notification.
    #[must_use]
    pub fn state_update_payload(&self) -> Value {
        json!({
            "currentAction": self.mode.current_action(),
            "state": self.mode.visibility(),
        })
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
