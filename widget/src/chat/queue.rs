//! Chat queue store: bounded display log plus the not-yet-displayed backlog.
//!
//! DESIGN
//! ======
//! Two ordered sequences and a pause flag. Remote messages are enqueued and
//! reach the display log only through `drain`; local messages are appended
//! directly. Both append paths trim from the head, so the log always holds
//! the most recent `max_messages` entries by insertion order. Timestamps are
//! never used as a sort key.
//!
//! CONCURRENCY
//! ===========
//! `ChatQueueStore` is a cheap-clone handle over `Arc<Mutex<_>>`. The lock is
//! held only for the synchronous body of each operation, never across an
//! await. Every display-log change bumps a revision on a `watch` channel so
//! the scroll effect can follow the log without polling.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use super::message::ChatMessage;

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_MAX_MESSAGES: usize = 100;

/// Drain batch and retention cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChatLimits {
    /// Max entries moved per drain.
    pub batch_size: usize,
    /// Retention cap for the display log.
    pub max_messages: usize,
}

impl Default for ChatLimits {
    fn default() -> Self {
        Self { batch_size: DEFAULT_BATCH_SIZE, max_messages: DEFAULT_MAX_MESSAGES }
    }
}

// =============================================================================
// STATE
// =============================================================================

/// The queue state proper. All mutation goes through the five operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatQueueState {
    /// Display log, oldest first.
    messages: VecDeque<ChatMessage>,
    /// Pending inbound messages, oldest first.
    message_queue: VecDeque<ChatMessage>,
    /// Suppresses draining and auto-scroll.
    paused: bool,
    batch_size: usize,
    max_messages: usize,
}

impl ChatQueueState {
    #[must_use]
    pub fn new(limits: ChatLimits) -> Self {
        Self {
            messages: VecDeque::new(),
            message_queue: VecDeque::new(),
            paused: false,
            batch_size: limits.batch_size,
            max_messages: limits.max_messages,
        }
    }

    /// Display log, oldest first.
    #[must_use]
    pub fn messages(&self) -> &VecDeque<ChatMessage> {
        &self.messages
    }

    /// Pending inbound messages, oldest first.
    #[must_use]
    pub fn pending(&self) -> &VecDeque<ChatMessage> {
        &self.message_queue
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    #[must_use]
    pub fn limits(&self) -> ChatLimits {
        ChatLimits { batch_size: self.batch_size, max_messages: self.max_messages }
    }

    /// Append to the pending queue. No de-duplication by id.
    pub fn enqueue(&mut self, message: ChatMessage) {
        self.message_queue.push_back(message);
    }

    /// Append straight to the display log, then trim.
    pub fn append_local(&mut self, message: ChatMessage) {
        self.messages.push_back(message);
        self.trim();
    }

    /// Move up to `batch_size` pending entries, in arrival order, to the log.
    /// Returns how many moved.
    pub fn drain(&mut self) -> usize {
        let count = self.batch_size.min(self.message_queue.len());
        if count == 0 {
            return 0;
        }
        self.messages.extend(self.message_queue.drain(..count));
        self.trim();
        count
    }

    /// `drain`, unless paused. Returns how many moved.
    pub fn drain_if_unpaused(&mut self) -> usize {
        if self.paused {
            return 0;
        }
        self.drain()
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Empty both sequences. Session teardown only.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.message_queue.clear();
    }

    fn trim(&mut self) {
        if self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(..excess);
        }
    }
}

impl Default for ChatQueueState {
    fn default() -> Self {
        Self::new(ChatLimits::default())
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Shared handle to the session's single `ChatQueueState`.
#[derive(Clone)]
pub struct ChatQueueStore {
    state: Arc<Mutex<ChatQueueState>>,
    revision: Arc<watch::Sender<u64>>,
}

impl ChatQueueStore {
    #[must_use]
    pub fn new(limits: ChatLimits) -> Self {
        let (revision, _) = watch::channel(0);
        Self { state: Arc::new(Mutex::new(ChatQueueState::new(limits))), revision: Arc::new(revision) }
    }

    fn lock(&self) -> MutexGuard<'_, ChatQueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    pub fn enqueue(&self, message: ChatMessage) {
        self.lock().enqueue(message);
    }

    pub fn append_local(&self, message: ChatMessage) {
        self.lock().append_local(message);
        self.bump();
    }

    pub fn drain(&self) -> usize {
        let moved = self.lock().drain();
        if moved > 0 {
            self.bump();
        }
        moved
    }

    /// Check the pause flag and drain under one lock, so a pause that lands
    /// mid-tick holds back the batch.
    pub fn drain_if_unpaused(&self) -> usize {
        let moved = self.lock().drain_if_unpaused();
        if moved > 0 {
            self.bump();
        }
        moved
    }

    pub fn set_paused(&self, paused: bool) {
        self.lock().set_paused(paused);
    }

    pub fn clear(&self) {
        self.lock().clear();
        self.bump();
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.lock().is_paused()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.lock().pending().len()
    }

    /// Copy of the display log, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().messages().iter().cloned().collect()
    }

    #[must_use]
    pub fn snapshot(&self) -> ChatQueueState {
        self.lock().clone()
    }

    /// Receiver that observes every display-log change.
    #[must_use]
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

impl Default for ChatQueueStore {
    fn default() -> Self {
        Self::new(ChatLimits::default())
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod tests;
