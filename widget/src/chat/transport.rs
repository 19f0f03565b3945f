//! Chat transport: the signaling publish/subscribe seam.
//!
//! DESIGN
//! ======
//! The vendor signaling SDK sits behind [`ChatTransport`]: join with a token,
//! publish serialized text to a named channel, and subscribe to the payloads
//! delivered on it. Delivery includes the sender's own echo; suppressing it
//! is the chat session's job.
//!
//! [`LoopbackHub`] is an in-process implementation keyed by channel name,
//! used by the headless harness and by tests. Each participant gets its own
//! [`LoopbackTransport`] over a shared hub.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use envelope::ErrorCode;
use tokio::sync::broadcast;

/// Per-channel buffer of undelivered events before slow subscribers lag.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("join failed: {0}")]
    Join(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("not joined to a signaling channel")]
    NotJoined,
}

impl ErrorCode for TransportError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Join(_) => "E_CHAT_JOIN",
            Self::Publish(_) => "E_CHAT_PUBLISH",
            Self::NotJoined => "E_CHAT_NOT_JOINED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Publish(_))
    }
}

/// Identity and channel assigned by a successful join.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinedChannel {
    pub channel: String,
    pub user_id: String,
    pub user_name: Option<String>,
}

/// One delivered payload, as JSON text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportEvent {
    pub message: String,
}

#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    async fn join(&self, token: &str) -> Result<JoinedChannel, TransportError>;

    async fn publish(&self, channel: &str, payload: String) -> Result<(), TransportError>;

    /// Stream of payloads delivered on `channel`, including our own.
    fn subscribe(&self, channel: &str) -> broadcast::Receiver<TransportEvent>;
}

// =============================================================================
// LOOPBACK
// =============================================================================

/// In-process publish/subscribe hub keyed by channel name.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<TransportEvent>>>>,
}

impl LoopbackHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<TransportEvent> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Deliver a payload to every subscriber of `channel`. Returns the
    /// number of receivers reached.
    pub fn publish(&self, channel: &str, payload: String) -> usize {
        // No subscribers is not an error for a pub/sub channel.
        self.sender(channel).send(TransportEvent { message: payload }).unwrap_or(0)
    }

    #[must_use]
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<TransportEvent> {
        self.sender(channel).subscribe()
    }
}

/// One participant's view of a [`LoopbackHub`].
pub struct LoopbackTransport {
    hub: LoopbackHub,
    channel: String,
    user_id: String,
    user_name: Option<String>,
}

impl LoopbackTransport {
    pub fn new(hub: LoopbackHub, channel: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self { hub, channel: channel.into(), user_id: user_id.into(), user_name: None }
    }

    #[must_use]
    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }
}

#[async_trait::async_trait]
impl ChatTransport for LoopbackTransport {
    async fn join(&self, token: &str) -> Result<JoinedChannel, TransportError> {
        if token.trim().is_empty() {
            return Err(TransportError::Join("empty access token".into()));
        }
        Ok(JoinedChannel {
            channel: self.channel.clone(),
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
        })
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<(), TransportError> {
        self.hub.publish(channel, payload);
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> broadcast::Receiver<TransportEvent> {
        self.hub.subscribe(channel)
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
