//! Chat session: signaling join, inbound filtering, and local sends.
//!
//! ERROR HANDLING
//! ==============
//! Failures stay at the boundary where they happen. A malformed inbound
//! payload is logged and dropped without touching the rest of the queue. A
//! failed publish is logged and not retried; the local echo has already been
//! appended and stays in the display log.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::message::{ANONYMOUS, ChatMessage, MessageIds, PayloadError, TextPayload, now_ms, parse_payload};
use super::queue::ChatQueueStore;
use super::transport::{ChatTransport, JoinedChannel, TransportError};

pub struct ChatSession {
    transport: Arc<dyn ChatTransport>,
    store: ChatQueueStore,
    ids: MessageIds,
    joined: Mutex<Option<JoinedChannel>>,
}

impl ChatSession {
    #[must_use]
    pub fn new(transport: Arc<dyn ChatTransport>, store: ChatQueueStore) -> Self {
        Self { transport, store, ids: MessageIds::new(), joined: Mutex::new(None) }
    }

    fn joined(&self) -> MutexGuard<'_, Option<JoinedChannel>> {
        self.joined.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the signaling channel with the host-supplied token.
    ///
    /// # Errors
    ///
    /// Returns the transport's join error unchanged.
    pub async fn join(&self, token: &str) -> Result<JoinedChannel, TransportError> {
        let channel = self.transport.join(token).await?;
        info!(channel = %channel.channel, user_id = %channel.user_id, "joined signaling channel");
        *self.joined() = Some(channel.clone());
        Ok(channel)
    }

    #[must_use]
    pub fn channel(&self) -> Option<JoinedChannel> {
        self.joined().clone()
    }

    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.joined().is_some()
    }

    #[must_use]
    pub fn store(&self) -> &ChatQueueStore {
        &self.store
    }

    /// Handle one delivered payload. Returns the queued message, or `None`
    /// when the payload is not a text line from another participant.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] for payloads that fail to parse.
    pub fn receive(&self, raw: &str) -> Result<Option<ChatMessage>, PayloadError> {
        let payload = parse_payload(raw)?;
        if !payload.is_text() {
            return Ok(None);
        }
        let own_id = self.joined().as_ref().map(|c| c.user_id.clone());
        if own_id.as_deref() == Some(payload.user_id.as_str()) {
            return Ok(None);
        }
        let id = self.ids.next(&payload.user_id, payload.timestamp);
        let message = ChatMessage::remote(payload, id);
        self.store.enqueue(message.clone());
        Ok(Some(message))
    }

    /// Send a chat line. The local echo is appended before the publish
    /// starts. Returns the echo, or `None` if nothing was sent.
    pub async fn send(&self, text: &str) -> Option<ChatMessage> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let Some(channel) = self.channel() else {
            debug!("chat send ignored: not joined");
            return None;
        };

        let timestamp = now_ms();
        let local = ChatMessage::local(self.ids.next(&channel.user_id, timestamp), &channel.user_id, text, timestamp);
        self.store.append_local(local.clone());

        let user_name = channel.user_name.clone().unwrap_or_else(|| ANONYMOUS.to_owned());
        let payload = TextPayload::text(text, timestamp, &channel.user_id, user_name);
        match serde_json::to_string(&payload) {
            Ok(body) => {
                if let Err(e) = self.transport.publish(&channel.channel, body).await {
                    warn!(error = %e, channel = %channel.channel, "chat publish failed");
                }
            }
            Err(e) => warn!(error = %e, "chat payload serialization failed"),
        }
        Some(local)
    }

    /// Forward delivered payloads into the queue until the transport closes
    /// or the task is aborted. Returns `None` when not joined.
    #[must_use]
    pub fn spawn_pump(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let channel = self.channel()?;
        let mut events = self.transport.subscribe(&channel.channel);
        let session = Arc::clone(self);
        Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Err(e) = session.receive(&event.message) {
                            warn!(error = %e, "dropping malformed chat payload");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "chat pump lagged behind transport");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("chat pump stopped");
        }))
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
