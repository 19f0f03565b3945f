//! Control channel: host messages in, notifications and requests out.
//!
//! ARCHITECTURE
//! ============
//! Inbound: the host messaging primitive hands us `(origin, data)`. The
//! origin is checked against the configured [`OriginPolicy`], the data is
//! decoded into an [`Envelope`], and then either:
//! - it resolves a pending request (matching `requestId`), or
//! - it is dropped as a stale response (unmatched `requestId` on a kind we
//!   would never handle), or
//! - it is dispatched to the listeners registered for its kind.
//!
//! Outbound: notifications are fire-and-forget through a [`HostPort`].
//! Requests register a oneshot under a fresh `requestId` and wait for the
//! host's answer.
//!
//! DESIGN
//! ======
//! Dispatch iterates a snapshot of the listener list, so subscribing or
//! unsubscribing from inside a listener never changes the pass in progress.
//! No lock is held while a listener runs.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use envelope::{Envelope, ErrorCode, MessageKind};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// The host answered the request with an `error`.
    #[error("{0}")]
    Rejected(String),
    /// The channel closed before the host answered.
    #[error("control channel closed")]
    ChannelClosed,
    /// The host messaging primitive refused the message.
    #[error("host unavailable")]
    HostUnavailable,
}

impl ErrorCode for ControlError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Rejected(_) => "E_CONTROL_REJECTED",
            Self::ChannelClosed => "E_CONTROL_CLOSED",
            Self::HostUnavailable => "E_CONTROL_HOST_UNAVAILABLE",
        }
    }
}

// =============================================================================
// ORIGIN POLICY
// =============================================================================

/// Which host origins may talk to the widget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OriginPolicy {
    /// Explicit opt-in to accept every origin.
    Any,
    /// Only these origins. Empty accepts nothing.
    AllowList(HashSet<String>),
}

impl OriginPolicy {
    /// Parse a comma-separated list. `*` means [`OriginPolicy::Any`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let entries: HashSet<String> = raw
            .split(',')
            .map(|s| s.trim().trim_end_matches('/'))
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        if entries.contains("*") {
            return Self::Any;
        }
        Self::AllowList(entries)
    }

    #[must_use]
    pub fn allows(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::AllowList(origins) => origins.contains(origin.trim_end_matches('/')),
        }
    }
}

impl Default for OriginPolicy {
    fn default() -> Self {
        Self::AllowList(HashSet::new())
    }
}

// =============================================================================
// HOST PORT
// =============================================================================

/// The cross-document messaging primitive toward the host page.
pub trait HostPort: Send + Sync {
    /// Post one envelope to the host.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::HostUnavailable`] when the host cannot be reached.
    fn post(&self, envelope: &Envelope) -> Result<(), ControlError>;
}

/// Host port that forwards envelopes into a tokio channel.
pub struct ChannelHostPort {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelHostPort {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { tx }
    }
}

impl HostPort for ChannelHostPort {
    fn post(&self, envelope: &Envelope) -> Result<(), ControlError> {
        self.tx.send(envelope.clone()).map_err(|_| ControlError::HostUnavailable)
    }
}

// =============================================================================
// CHANNEL
// =============================================================================

pub type Listener = Arc<dyn Fn(&Envelope) + Send + Sync>;

type PendingReply = oneshot::Sender<Result<Option<Value>, ControlError>>;

/// Outcome of one inbound host message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Resolved or rejected a pending request.
    Resolved,
    /// Handed to this many listeners.
    Dispatched(usize),
    /// Well-formed, but nobody handles this kind.
    Ignored,
    Dropped(DropReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// The origin is not allowed by the policy.
    Origin,
    /// The data is not a valid envelope.
    Malformed,
    /// A response whose `requestId` matches nothing pending.
    StaleResponse,
    /// The channel has been closed.
    Closed,
}

struct ChannelInner {
    policy: OriginPolicy,
    port: Arc<dyn HostPort>,
    listeners: Mutex<HashMap<MessageKind, Vec<(u64, Listener)>>>,
    pending: Mutex<HashMap<String, PendingReply>>,
    next_listener_id: AtomicU64,
    closed: AtomicBool,
}

impl ChannelInner {
    fn listeners(&self) -> MutexGuard<'_, HashMap<MessageKind, Vec<(u64, Listener)>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, PendingReply>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_listener(&self, kind: MessageKind, id: u64) {
        let mut listeners = self.listeners();
        if let Some(list) = listeners.get_mut(&kind) {
            list.retain(|(listener_id, _)| *listener_id != id);
            if list.is_empty() {
                listeners.remove(&kind);
            }
        }
    }
}

/// Shared handle to the widget's control channel.
#[derive(Clone)]
pub struct ControlChannel {
    inner: Arc<ChannelInner>,
}

impl ControlChannel {
    #[must_use]
    pub fn new(policy: OriginPolicy, port: Arc<dyn HostPort>) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                policy,
                port,
                listeners: Mutex::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                next_listener_id: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn policy(&self) -> &OriginPolicy {
        &self.inner.policy
    }

    /// Register a listener for `kind`. The listener stays registered until
    /// the returned [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe(&self, kind: MessageKind, listener: impl Fn(&Envelope) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners().entry(kind).or_default().push((id, Arc::new(listener)));
        Subscription { channel: Arc::downgrade(&self.inner), kind, id }
    }

    #[must_use]
    pub fn listener_count(&self, kind: MessageKind) -> usize {
        self.inner.listeners().get(&kind).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.pending().len()
    }

    // -------------------------------------------------------------------------
    // Outbound
    // -------------------------------------------------------------------------

    /// Fire-and-forget send. Failures are logged, never raised.
    pub fn send(&self, envelope: &Envelope) {
        if self.inner.closed.load(Ordering::Acquire) {
            debug!(kind = %envelope.kind, "control send after close ignored");
            return;
        }
        if let Err(e) = self.inner.port.post(envelope) {
            warn!(error = %e, code = e.error_code(), kind = %envelope.kind, "control message not delivered");
        }
    }

    pub fn notify(&self, kind: MessageKind) {
        self.send(&Envelope::event(kind));
    }

    pub fn notify_with(&self, kind: MessageKind, payload: Value) {
        self.send(&Envelope::with_payload(kind, payload));
    }

    /// Send a request and wait for the host's answer.
    ///
    /// # Errors
    ///
    /// [`ControlError::Rejected`] with the host's error text,
    /// [`ControlError::HostUnavailable`] if the request could not be posted,
    /// [`ControlError::ChannelClosed`] if the channel closed first.
    pub async fn request(&self, kind: impl Into<String>, payload: Option<Value>) -> Result<Option<Value>, ControlError> {
        let envelope = Envelope::request(kind, payload);
        let request_id = envelope.request_id.clone().unwrap_or_default();
        let (tx, rx) = oneshot::channel();
        {
            // `close` flips the flag under this lock, so a request either sees
            // it here or is drained by it.
            let mut pending = self.inner.pending();
            if self.inner.closed.load(Ordering::Acquire) {
                return Err(ControlError::ChannelClosed);
            }
            pending.insert(request_id.clone(), tx);
        }

        if let Err(e) = self.inner.port.post(&envelope) {
            self.inner.pending().remove(&request_id);
            return Err(e);
        }
        rx.await.unwrap_or(Err(ControlError::ChannelClosed))
    }

    // -------------------------------------------------------------------------
    // Inbound
    // -------------------------------------------------------------------------

    /// Handle one message from the host messaging primitive.
    pub fn handle_message(&self, origin: &str, data: Value) -> Delivery {
        if self.inner.closed.load(Ordering::Acquire) {
            return Delivery::Dropped(DropReason::Closed);
        }
        if !self.inner.policy.allows(origin) {
            warn!(%origin, "control message from disallowed origin dropped");
            return Delivery::Dropped(DropReason::Origin);
        }
        let envelope = match envelope::decode_value(data) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(error = %e, code = e.error_code(), %origin, "malformed control message dropped");
                return Delivery::Dropped(DropReason::Malformed);
            }
        };
        self.handle_envelope(&envelope)
    }

    /// Route an already-decoded envelope.
    pub fn handle_envelope(&self, envelope: &Envelope) -> Delivery {
        if let Some(request_id) = &envelope.request_id {
            let pending = self.inner.pending().remove(request_id);
            if let Some(reply) = pending {
                let outcome = match &envelope.error {
                    Some(error) => Err(ControlError::Rejected(error.clone())),
                    None => Ok(envelope.payload.clone()),
                };
                if reply.send(outcome).is_err() {
                    debug!(%request_id, "request caller went away before its answer");
                }
                return Delivery::Resolved;
            }
            let handled_kind = envelope.message_kind().is_some_and(MessageKind::is_inbound);
            if envelope.error.is_some() || !handled_kind {
                debug!(%request_id, kind = %envelope.kind, "stale control response dropped");
                return Delivery::Dropped(DropReason::StaleResponse);
            }
        }

        let Some(kind) = envelope.message_kind() else {
            return Delivery::Ignored;
        };
        let snapshot: Vec<Listener> = self
            .inner
            .listeners()
            .get(&kind)
            .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();
        if snapshot.is_empty() {
            return Delivery::Ignored;
        }
        for listener in &snapshot {
            listener(envelope);
        }
        Delivery::Dispatched(snapshot.len())
    }

    /// Close the channel: reject every pending request, drop all listeners,
    /// and ignore further traffic.
    pub fn close(&self) {
        let pending: Vec<PendingReply> = {
            let mut pending = self.inner.pending();
            self.inner.closed.store(true, Ordering::Release);
            pending.drain().map(|(_, tx)| tx).collect()
        };
        for reply in pending {
            if reply.send(Err(ControlError::ChannelClosed)).is_err() {
                debug!("pending request caller already gone at close");
            }
        }
        self.inner.listeners().clear();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Keeps a listener registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    channel: Weak<ChannelInner>,
    kind: MessageKind,
    id: u64,
}

impl Subscription {
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.channel.upgrade() {
            inner.remove_listener(self.kind, self.id);
        }
    }
}

#[cfg(test)]
#[path = "channel_test.rs"]
mod tests;
