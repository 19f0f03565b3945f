//! In-process media engine for the harness and tests.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{MediaEngine, MediaError};

/// One call received by [`HeadlessMediaEngine`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MediaCall {
    Join(String),
    Leave,
    SubscribeVideo(String),
    UnsubscribeVideo(String),
    SetVolume(u8),
    SetMuted(bool),
}

/// Records every call. Joins succeed unless a failure reason is set.
#[derive(Debug, Default)]
pub struct HeadlessMediaEngine {
    calls: Mutex<Vec<MediaCall>>,
    join_failure: Option<String>,
    join_delay: Option<Duration>,
}

impl HeadlessMediaEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every join fails with `reason`.
    #[must_use]
    pub fn failing_join(mut self, reason: impl Into<String>) -> Self {
        self.join_failure = Some(reason.into());
        self
    }

    /// Joins take this long before resolving.
    #[must_use]
    pub fn with_join_delay(mut self, delay: Duration) -> Self {
        self.join_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn calls(&self) -> Vec<MediaCall> {
        self.log().clone()
    }

    fn log(&self) -> MutexGuard<'_, Vec<MediaCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: MediaCall) {
        self.log().push(call);
    }
}

#[async_trait]
impl MediaEngine for HeadlessMediaEngine {
    async fn join(&self, token: &str) -> Result<(), MediaError> {
        self.record(MediaCall::Join(token.to_owned()));
        if let Some(delay) = self.join_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.join_failure {
            Some(reason) => Err(MediaError::Join(reason.clone())),
            None => Ok(()),
        }
    }

    async fn leave(&self) -> Result<(), MediaError> {
        self.record(MediaCall::Leave);
        Ok(())
    }

    async fn subscribe_video(&self, participant: &str) -> Result<(), MediaError> {
        self.record(MediaCall::SubscribeVideo(participant.to_owned()));
        Ok(())
    }

    async fn unsubscribe_video(&self, participant: &str) -> Result<(), MediaError> {
        self.record(MediaCall::UnsubscribeVideo(participant.to_owned()));
        Ok(())
    }

    async fn set_volume(&self, volume: u8) -> Result<(), MediaError> {
        self.record(MediaCall::SetVolume(volume));
        Ok(())
    }

    async fn set_muted(&self, muted: bool) -> Result<(), MediaError> {
        self.record(MediaCall::SetMuted(muted));
        Ok(())
    }
}
