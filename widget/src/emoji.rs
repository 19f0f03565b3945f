//! Emoji picker: open/close/select with timed lockouts.
//!
//! DESIGN
//! ======
//! Three timers drive the picker, each a tokio task whose handle is aborted
//! when superseded or on shutdown:
//! - selection delay: picks are ignored for a moment after opening
//! - auto-close: the picker closes itself if nothing is picked
//! - lock: after a pick the picker cannot reopen for a while
//!
//! Timer tasks hold a `Weak` to the picker state, so an abandoned picker is
//! freed even if a timer is still pending.
//!
//! A pick is sent as a chat line, so the picker only opens once chat is
//! joined, and a pick the chat refuses is never reported to the host.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use envelope::MessageKind;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::chat::ChatSession;
use crate::control::ControlChannel;

pub const DEFAULT_AUTO_CLOSE: Duration = Duration::from_millis(3000);
pub const DEFAULT_SELECTION_DELAY: Duration = Duration::from_millis(500);
pub const DEFAULT_LOCK: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmojiTimings {
    pub auto_close: Duration,
    pub selection_delay: Duration,
    pub lock: Duration,
}

impl Default for EmojiTimings {
    fn default() -> Self {
        Self { auto_close: DEFAULT_AUTO_CLOSE, selection_delay: DEFAULT_SELECTION_DELAY, lock: DEFAULT_LOCK }
    }
}

/// Direction reported with `RESIZE_WIDGET`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeDirection {
    Expand,
    Contract,
}

impl ResizeDirection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expand => "expand",
            Self::Contract => "contract",
        }
    }
}

#[derive(Default)]
struct PickerState {
    open: bool,
    selection_enabled: bool,
    locked: bool,
    auto_close: Option<JoinHandle<()>>,
    selection_timer: Option<JoinHandle<()>>,
    lock_timer: Option<JoinHandle<()>>,
}

struct PickerShared {
    state: Mutex<PickerState>,
    control: ControlChannel,
}

impl PickerShared {
    fn state(&self) -> MutexGuard<'_, PickerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) -> bool {
        {
            let mut state = self.state();
            if !state.open {
                return false;
            }
            state.open = false;
            state.selection_enabled = false;
            abort(&mut state.auto_close);
            abort(&mut state.selection_timer);
        }
        self.control.notify_with(MessageKind::EmojiModelOpened, json!({ "opened": false }));
        true
    }
}

fn abort(slot: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = slot.take() {
        handle.abort();
    }
}

/// Run `action` on the picker after `delay`, unless the picker is gone.
fn after(delay: Duration, shared: &Arc<PickerShared>, action: fn(&PickerShared)) -> JoinHandle<()> {
    let weak: Weak<PickerShared> = Arc::downgrade(shared);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(shared) = weak.upgrade() {
            action(&shared);
        }
    })
}

pub struct EmojiPicker {
    shared: Arc<PickerShared>,
    chat: Arc<ChatSession>,
    timings: EmojiTimings,
}

impl EmojiPicker {
    #[must_use]
    pub fn new(control: ControlChannel, chat: Arc<ChatSession>, timings: EmojiTimings) -> Self {
        Self { shared: Arc::new(PickerShared { state: Mutex::new(PickerState::default()), control }), chat, timings }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.shared.state().open
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.shared.state().locked
    }

    #[must_use]
    pub fn selection_enabled(&self) -> bool {
        self.shared.state().selection_enabled
    }

    /// Open the picker. Returns false when chat is not joined, or the picker
    /// is locked or already open.
    pub fn open(&self) -> bool {
        if !self.chat.is_joined() {
            debug!("emoji picker open ignored: chat not joined");
            return false;
        }
        {
            let mut state = self.shared.state();
            if state.locked || state.open {
                debug!(locked = state.locked, "emoji picker open ignored");
                return false;
            }
            state.open = true;
            state.selection_enabled = false;
            abort(&mut state.selection_timer);
            abort(&mut state.auto_close);
            state.selection_timer = Some(after(self.timings.selection_delay, &self.shared, |shared| {
                let mut state = shared.state();
                if state.open {
                    state.selection_enabled = true;
                }
            }));
            state.auto_close = Some(after(self.timings.auto_close, &self.shared, |shared| {
                if shared.close() {
                    debug!("emoji picker auto-closed");
                }
            }));
        }
        self.shared.control.notify_with(MessageKind::EmojiModelOpened, json!({ "opened": true }));
        true
    }

    /// Close the picker. Returns false when it was not open.
    pub fn close(&self) -> bool {
        self.shared.close()
    }

    /// Pick an emoji: send it as chat, tell the host, close and lock.
    /// Returns false when the pick was ignored or chat did not take it; the
    /// picker closes unlocked in the latter case.
    pub async fn select(&self, emoji: &str) -> bool {
        let emoji = emoji.trim();
        {
            let mut state = self.shared.state();
            if !state.open || !state.selection_enabled || emoji.is_empty() {
                debug!(open = state.open, enabled = state.selection_enabled, "emoji selection ignored");
                return false;
            }
            state.locked = true;
            state.selection_enabled = false;
            abort(&mut state.auto_close);
            abort(&mut state.lock_timer);
            state.lock_timer = Some(after(self.timings.lock, &self.shared, |shared| {
                shared.state().locked = false;
                debug!("emoji picker unlocked");
            }));
        }

        if self.chat.send(emoji).await.is_none() {
            {
                let mut state = self.shared.state();
                state.locked = false;
                abort(&mut state.lock_timer);
            }
            self.shared.close();
            debug!(%emoji, "emoji pick not sent: chat not joined");
            return false;
        }
        self.shared.control.notify_with(MessageKind::EmojiSelected, json!({ "emoji": emoji }));
        self.shared.close();
        true
    }

    /// Tell the host to grow or shrink the widget frame.
    pub fn resize(&self, direction: ResizeDirection) {
        self.shared.control.notify_with(MessageKind::ResizeWidget, json!({ "resize": direction.as_str() }));
    }

    /// Abort every timer and reset to closed and unlocked.
    pub fn shutdown(&self) {
        let mut state = self.shared.state();
        abort(&mut state.auto_close);
        abort(&mut state.selection_timer);
        abort(&mut state.lock_timer);
        state.open = false;
        state.selection_enabled = false;
        state.locked = false;
    }
}

#[cfg(test)]
#[path = "emoji_test.rs"]
mod tests;
