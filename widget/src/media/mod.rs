//! Media: backend-neutral control of the live audio/video session.
//!
//! DESIGN
//! ======
//! The backend is chosen once at startup as a [`BackendKind`]. Everything
//! the widget needs from a media SDK goes through the [`MediaEngine`]
//! capability trait; [`MediaController`] owns the lifecycle and the
//! host-facing settings (volume, mute) and enforces what each backend can do.
//!
//! Volume and mute set before the join are remembered and applied once the
//! engine has joined. Settings calls to the engine run one at a time under an
//! async lock, and each reads the remembered value inside it, so the engine
//! always ends on the latest stored setting.

pub mod headless;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use envelope::ErrorCode;
use tracing::{debug, info, warn};

pub use headless::{HeadlessMediaEngine, MediaCall};

use crate::control::commands::MAX_VOLUME;

// =============================================================================
// BACKEND
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendKind {
    /// Real-time conferencing SDK with per-participant tracks.
    #[default]
    Conferencing,
    /// Managed live-stream playback. One stream, no track selection.
    ManagedStream,
}

impl BackendKind {
    /// Parse the configured backend name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "conferencing" => Some(Self::Conferencing),
            "managed_stream" => Some(Self::ManagedStream),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conferencing => "conferencing",
            Self::ManagedStream => "managed_stream",
        }
    }

    #[must_use]
    pub fn supports_track_subscription(self) -> bool {
        matches!(self, Self::Conferencing)
    }

    /// Managed streams autoplay muted until the viewer unmutes.
    #[must_use]
    pub fn starts_muted(self) -> bool {
        matches!(self, Self::ManagedStream)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("media join failed: {0}")]
    Join(String),
    #[error("{backend} backend does not support {operation}")]
    Unsupported { backend: BackendKind, operation: &'static str },
    #[error("media session not joined")]
    NotJoined,
    #[error("media engine error: {0}")]
    Engine(String),
}

impl ErrorCode for MediaError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Join(_) => "E_MEDIA_JOIN",
            Self::Unsupported { .. } => "E_MEDIA_UNSUPPORTED",
            Self::NotJoined => "E_MEDIA_NOT_JOINED",
            Self::Engine(_) => "E_MEDIA_ENGINE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Join(_) | Self::Engine(_))
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// Capabilities the widget uses from a media SDK.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn join(&self, token: &str) -> Result<(), MediaError>;
    async fn leave(&self) -> Result<(), MediaError>;
    async fn subscribe_video(&self, participant: &str) -> Result<(), MediaError>;
    async fn unsubscribe_video(&self, participant: &str) -> Result<(), MediaError>;
    async fn set_volume(&self, volume: u8) -> Result<(), MediaError>;
    async fn set_muted(&self, muted: bool) -> Result<(), MediaError>;
}

// =============================================================================
// CONTROLLER
// =============================================================================

#[derive(Debug)]
struct MediaStatus {
    joined: bool,
    volume: u8,
    muted: bool,
    subscribed: HashSet<String>,
}

pub struct MediaController {
    backend: BackendKind,
    engine: Arc<dyn MediaEngine>,
    status: Mutex<MediaStatus>,
    settings: tokio::sync::Mutex<()>,
}

impl MediaController {
    #[must_use]
    pub fn new(backend: BackendKind, engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            backend,
            engine,
            status: Mutex::new(MediaStatus {
                joined: false,
                volume: MAX_VOLUME,
                muted: backend.starts_muted(),
                subscribed: HashSet::new(),
            }),
            settings: tokio::sync::Mutex::new(()),
        }
    }

    fn status(&self) -> MutexGuard<'_, MediaStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.status().joined
    }

    #[must_use]
    pub fn volume(&self) -> u8 {
        self.status().volume
    }

    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.status().muted
    }

    #[must_use]
    pub fn subscribed(&self) -> Vec<String> {
        let mut out: Vec<String> = self.status().subscribed.iter().cloned().collect();
        out.sort();
        out
    }

    /// Join the media session and apply the remembered volume and mute.
    ///
    /// # Errors
    ///
    /// Returns the engine's join error. Settings failures after a successful
    /// join are logged and do not fail the join.
    pub async fn join(&self, token: &str) -> Result<(), MediaError> {
        self.engine.join(token).await?;
        let _settings = self.settings.lock().await;
        let (volume, muted) = {
            let mut status = self.status();
            status.joined = true;
            (status.volume, status.muted)
        };
        info!(backend = %self.backend, volume, muted, "media joined");

        if let Err(e) = self.engine.set_volume(volume).await {
            warn!(error = %e, "initial media volume not applied");
        }
        if let Err(e) = self.engine.set_muted(muted).await {
            warn!(error = %e, "initial media mute not applied");
        }
        Ok(())
    }

    /// Leave the session. A no-op when not joined.
    ///
    /// # Errors
    ///
    /// Returns the engine's leave error; local state is reset regardless.
    pub async fn leave(&self) -> Result<(), MediaError> {
        let was_joined = {
            let mut status = self.status();
            status.subscribed.clear();
            std::mem::replace(&mut status.joined, false)
        };
        if !was_joined {
            return Ok(());
        }
        self.engine.leave().await?;
        info!(backend = %self.backend, "media left");
        Ok(())
    }

    /// # Errors
    ///
    /// [`MediaError::Unsupported`] on backends without track selection,
    /// [`MediaError::NotJoined`] before the join, or the engine's error.
    pub async fn subscribe_video(&self, participant: &str) -> Result<(), MediaError> {
        self.check_track_call("subscribe_video")?;
        self.engine.subscribe_video(participant).await?;
        self.status().subscribed.insert(participant.to_owned());
        debug!(%participant, "subscribed to participant video");
        Ok(())
    }

    /// # Errors
    ///
    /// Same as [`MediaController::subscribe_video`].
    pub async fn unsubscribe_video(&self, participant: &str) -> Result<(), MediaError> {
        self.check_track_call("unsubscribe_video")?;
        self.engine.unsubscribe_video(participant).await?;
        self.status().subscribed.remove(participant);
        debug!(%participant, "unsubscribed from participant video");
        Ok(())
    }

    fn check_track_call(&self, operation: &'static str) -> Result<(), MediaError> {
        if !self.backend.supports_track_subscription() {
            return Err(MediaError::Unsupported { backend: self.backend, operation });
        }
        if !self.is_joined() {
            return Err(MediaError::NotJoined);
        }
        Ok(())
    }

    /// Store the volume (clamped to the host scale) and forward it once joined.
    ///
    /// # Errors
    ///
    /// Returns the engine's error when forwarding fails.
    pub async fn set_volume(&self, volume: u8) -> Result<(), MediaError> {
        let volume = volume.min(MAX_VOLUME);
        let _settings = self.settings.lock().await;
        let joined = {
            let mut status = self.status();
            status.volume = volume;
            status.joined
        };
        if joined {
            self.engine.set_volume(volume).await?;
        }
        Ok(())
    }

    /// Flip host audio mute. Returns the new muted flag.
    ///
    /// # Errors
    ///
    /// Returns the engine's error when forwarding fails; the flag is
    /// restored in that case.
    pub async fn toggle_mute(&self) -> Result<bool, MediaError> {
        let _settings = self.settings.lock().await;
        let (muted, joined) = {
            let mut status = self.status();
            status.muted = !status.muted;
            (status.muted, status.joined)
        };
        if joined {
            if let Err(e) = self.engine.set_muted(muted).await {
                self.status().muted = !muted;
                return Err(e);
            }
        }
        Ok(muted)
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
