//! Widget session: wires host commands, chat, media, and the emoji picker
//! into one explicitly constructed unit.
//!
//! ARCHITECTURE
//! ============
//! `start` builds every service from the config and the injected seams
//! (chat transport, media engine, host port), subscribes the host command
//! handler on the control channel, starts the drain scheduler, and posts the
//! initial `STATE_UPDATE`.
//!
//! JOIN CHOREOGRAPHY
//! =================
//! A non-empty access token starts the media and chat joins as two
//! independent tasks. Each posts `*_CONNECTING`, then `*_CONNECTED` or
//! `*_CONNECTION_FAILED`. One failing never cancels the other, and neither is
//! retried automatically; `retry` is the manual path back from `failed`.
//!
//! Host volume changes go through one worker task in arrival order, so the
//! engine always ends on the last volume the host sent.
//!
//! A task handle is stored only while holding the task lock and after
//! re-checking `stopped`; `shutdown` sets the flag before taking the lock,
//! so nothing spawned around teardown outlives it.
//!
//! ERROR HANDLING
//! ==============
//! Nothing here fails the session. Bad command payloads, join failures, and
//! media errors are logged with their error code and, where the host cares,
//! reported as events. A host command that carries a `requestId` is answered:
//! an empty reply once applied, or a structured rejection when its payload is
//! invalid.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use envelope::{Envelope, ErrorCode, MessageKind};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chat::{
    ChatMessage, ChatQueueStore, ChatSession, ChatTransport, DrainScheduler, ScrollMetrics, ScrollPauseController,
    TransportError,
};
use crate::config::WidgetConfig;
use crate::control::{ControlChannel, Delivery, HostCommand, HostPort, Subscription};
use crate::emoji::EmojiPicker;
use crate::media::{MediaController, MediaEngine, MediaError};
use crate::state::{Subsystem, TransitionError, WidgetState};

#[derive(Default)]
struct SessionTasks {
    scheduler: Option<DrainScheduler>,
    volume: Option<JoinHandle<()>>,
    pump: Option<JoinHandle<()>>,
    joins: Vec<JoinHandle<()>>,
}

/// A failed join, reduced to what gets logged.
struct JoinFailure {
    message: String,
    code: &'static str,
    retryable: bool,
}

impl JoinFailure {
    fn from_error(error: &impl ErrorCode) -> Self {
        Self { message: error.to_string(), code: error.error_code(), retryable: error.retryable() }
    }
}

pub struct WidgetSession {
    control: ControlChannel,
    store: ChatQueueStore,
    chat: Arc<ChatSession>,
    media: Arc<MediaController>,
    emoji: EmojiPicker,
    scroll: ScrollPauseController,
    state: Mutex<WidgetState>,
    tasks: Mutex<SessionTasks>,
    subscriptions: Mutex<Vec<Subscription>>,
    volume_tx: mpsc::UnboundedSender<u8>,
    stopped: AtomicBool,
}

impl WidgetSession {
    /// Build and start a session. Must be called inside a tokio runtime.
    pub fn start(
        config: WidgetConfig,
        transport: Arc<dyn ChatTransport>,
        engine: Arc<dyn MediaEngine>,
        host: Arc<dyn HostPort>,
    ) -> Arc<Self> {
        let session = Arc::new_cyclic(|weak: &Weak<Self>| {
            let control = ControlChannel::new(config.allowed_origins.clone(), host);
            let store = ChatQueueStore::new(config.limits);
            let chat = Arc::new(ChatSession::new(transport, store.clone()));
            let media = Arc::new(MediaController::new(config.backend, engine));
            let (volume_tx, volume_rx) = mpsc::unbounded_channel();

            let subscriptions = MessageKind::ALL
                .into_iter()
                .filter(|kind| kind.is_inbound())
                .map(|kind| {
                    let weak = weak.clone();
                    control.subscribe(kind, move |envelope| {
                        if let Some(session) = weak.upgrade() {
                            session.on_host_command(envelope);
                        }
                    })
                })
                .collect();

            Self {
                emoji: EmojiPicker::new(control.clone(), Arc::clone(&chat), config.emoji),
                scroll: ScrollPauseController::new(store.clone(), config.scroll_threshold_px),
                tasks: Mutex::new(SessionTasks {
                    scheduler: Some(DrainScheduler::spawn(store.clone(), config.drain_interval)),
                    volume: Some(tokio::spawn(apply_volumes(Arc::clone(&media), volume_rx))),
                    ..SessionTasks::default()
                }),
                media,
                control,
                store,
                chat,
                state: Mutex::new(WidgetState::default()),
                subscriptions: Mutex::new(subscriptions),
                volume_tx,
                stopped: AtomicBool::new(false),
            }
        });

        info!(backend = %config.backend, "widget session started");
        session.post_state_update();
        session
    }

    fn state_guard(&self) -> MutexGuard<'_, WidgetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks(&self) -> MutexGuard<'_, SessionTasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn state(&self) -> WidgetState {
        self.state_guard().clone()
    }

    #[must_use]
    pub fn control(&self) -> &ControlChannel {
        &self.control
    }

    #[must_use]
    pub fn store(&self) -> &ChatQueueStore {
        &self.store
    }

    #[must_use]
    pub fn media(&self) -> &MediaController {
        &self.media
    }

    #[must_use]
    pub fn emoji(&self) -> &EmojiPicker {
        &self.emoji
    }

    #[must_use]
    pub fn scroll(&self) -> &ScrollPauseController {
        &self.scroll
    }

    // -------------------------------------------------------------------------
    // Inbound
    // -------------------------------------------------------------------------

    /// Feed one message from the host messaging primitive.
    pub fn handle_host_message(&self, origin: &str, data: Value) -> Delivery {
        self.control.handle_message(origin, data)
    }

    fn on_host_command(self: &Arc<Self>, envelope: &Envelope) {
        match HostCommand::from_envelope(envelope) {
            Ok(Some(command)) => {
                self.apply_command(command);
                if envelope.request_id.is_some() {
                    self.control.send(&envelope.reply(None));
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "host command dropped");
                if envelope.request_id.is_some() {
                    self.control.send(&envelope.reject_from(&e));
                }
            }
        }
    }

    fn apply_command(self: &Arc<Self>, command: HostCommand) {
        debug!(?command, "host command");
        let visibility_changed = self.state_guard().apply(&command);
        if visibility_changed {
            self.post_state_update();
        }

        match command {
            HostCommand::AccessToken(token) => {
                if token.trim().is_empty() {
                    debug!("empty access token stored, joins not started");
                    return;
                }
                for subsystem in [Subsystem::Media, Subsystem::Chat] {
                    self.start_join(subsystem, &token);
                }
            }
            HostCommand::SetAudioVolume(volume) => {
                if self.volume_tx.send(volume).is_err() {
                    debug!(volume, "volume worker stopped, change dropped");
                }
            }
            HostCommand::FontSize(size) => debug!(%size, "font size updated"),
            HostCommand::ToggleChat(_) | HostCommand::CycleWidgetMode | HostCommand::SetVideoControlsVisibility(_) => {}
        }
    }

    fn post_state_update(&self) {
        let payload = self.state_guard().state_update_payload();
        self.control.notify_with(MessageKind::StateUpdate, payload);
    }

    // -------------------------------------------------------------------------
    // Join choreography
    // -------------------------------------------------------------------------

    fn start_join(self: &Arc<Self>, subsystem: Subsystem, token: &str) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        if let Err(e) = self.state_guard().tracker_mut(subsystem).begin() {
            debug!(error = %e, "join not started");
            return;
        }
        self.control.notify(subsystem.connecting_kind());
        info!(%subsystem, "joining");

        let handle = tokio::spawn(Arc::clone(self).run_join(subsystem, token.to_owned()));

        let mut tasks = self.tasks();
        if self.stopped.load(Ordering::Acquire) {
            handle.abort();
            return;
        }
        tasks.joins.retain(|h| !h.is_finished());
        tasks.joins.push(handle);
    }

    async fn run_join(self: Arc<Self>, subsystem: Subsystem, token: String) {
        let outcome = match subsystem {
            Subsystem::Media => self.media.join(&token).await.map_err(|e| JoinFailure::from_error(&e)),
            Subsystem::Chat => self.join_chat(&token).await.map_err(|e| JoinFailure::from_error(&e)),
        };
        if self.stopped.load(Ordering::Acquire) {
            if outcome.is_ok()
                && subsystem == Subsystem::Media
                && let Err(e) = self.media.leave().await
            {
                warn!(error = %e, "media leave after late join failed");
            }
            debug!(%subsystem, "join finished after shutdown, discarded");
            return;
        }
        self.finish_join(subsystem, outcome);
    }

    async fn join_chat(&self, token: &str) -> Result<(), TransportError> {
        self.chat.join(token).await?;
        if let Some(pump) = self.chat.spawn_pump() {
            let mut tasks = self.tasks();
            if self.stopped.load(Ordering::Acquire) {
                pump.abort();
            } else if let Some(old) = tasks.pump.replace(pump) {
                old.abort();
            }
        }
        Ok(())
    }

    fn finish_join(&self, subsystem: Subsystem, outcome: Result<(), JoinFailure>) {
        let transition = {
            let mut state = self.state_guard();
            let tracker = state.tracker_mut(subsystem);
            match &outcome {
                Ok(()) => tracker.succeed(),
                Err(_) => tracker.fail(),
            }
        };
        if let Err(e) = transition {
            debug!(error = %e, "join outcome discarded");
            return;
        }
        match outcome {
            Ok(()) => {
                info!(%subsystem, "connected");
                self.control.notify(subsystem.connected_kind());
            }
            Err(failure) => {
                warn!(
                    %subsystem,
                    error = %failure.message,
                    code = failure.code,
                    retryable = failure.retryable,
                    "connection failed"
                );
                self.control.notify(subsystem.failed_kind());
            }
        }
    }

    /// Manual retry of a failed subsystem with the last received token.
    ///
    /// # Errors
    ///
    /// [`TransitionError`] unless the subsystem is in `failed`.
    pub fn retry(self: &Arc<Self>, subsystem: Subsystem) -> Result<(), TransitionError> {
        let token = {
            let mut state = self.state_guard();
            state.tracker_mut(subsystem).reset()?;
            state.access_token.clone()
        };
        match token {
            Some(token) if !token.trim().is_empty() => self.start_join(subsystem, &token),
            _ => debug!(%subsystem, "retry reset without a token"),
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Widget-side actions
    // -------------------------------------------------------------------------

    /// Send a chat line from the local user.
    pub async fn send_chat(&self, text: &str) -> Option<ChatMessage> {
        self.chat.send(text).await
    }

    /// Feed a scroll event from the display surface. Returns the pause flag.
    pub fn on_scroll(&self, metrics: ScrollMetrics) -> bool {
        self.scroll.on_scroll(metrics)
    }

    /// Flip host audio mute.
    ///
    /// # Errors
    ///
    /// Returns the media engine's error.
    pub async fn toggle_mute(&self) -> Result<bool, MediaError> {
        self.media.toggle_mute().await
    }

    // -------------------------------------------------------------------------
    // Teardown
    // -------------------------------------------------------------------------

    /// Stop every task, leave media, clear chat, and close the channel.
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        let (scheduler, volume, pump, joins) = {
            let mut tasks = self.tasks();
            (tasks.scheduler.take(), tasks.volume.take(), tasks.pump.take(), std::mem::take(&mut tasks.joins))
        };
        for handle in joins.into_iter().chain(volume).chain(pump) {
            handle.abort();
        }
        if let Some(scheduler) = scheduler {
            scheduler.stop().await;
        }
        self.emoji.shutdown();
        if let Err(e) = self.media.leave().await {
            warn!(error = %e, "media leave failed during shutdown");
        }
        self.store.clear();
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner).clear();
        self.control.close();
        info!("widget session stopped");
    }
}

/// Apply host volume changes one at a time, in arrival order.
async fn apply_volumes(media: Arc<MediaController>, mut changes: mpsc::UnboundedReceiver<u8>) {
    while let Some(volume) = changes.recv().await {
        if let Err(e) = media.set_volume(volume).await {
            warn!(error = %e, code = e.error_code(), volume, "audio volume not applied");
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
