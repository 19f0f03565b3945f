//! Widget configuration parsed from environment variables.
//!
//! Every setting has a default, so an empty environment yields a working
//! configuration. The one exception is the origin allow-list, which defaults
//! to accepting nothing.

use std::time::Duration;

use crate::chat::ChatLimits;
use crate::chat::queue::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_MESSAGES};
use crate::chat::scheduler::DEFAULT_DRAIN_INTERVAL;
use crate::chat::scroll::DEFAULT_THRESHOLD_PX;
use crate::control::OriginPolicy;
use crate::emoji::{DEFAULT_AUTO_CLOSE, DEFAULT_LOCK, DEFAULT_SELECTION_DELAY, EmojiTimings};
use crate::media::BackendKind;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown WIDGET_MEDIA_BACKEND: {0}")]
    UnknownBackend(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Clone, Debug, PartialEq)]
pub struct WidgetConfig {
    pub backend: BackendKind,
    pub allowed_origins: OriginPolicy,
    pub drain_interval: Duration,
    pub limits: ChatLimits,
    pub scroll_threshold_px: f64,
    pub emoji: EmojiTimings,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            allowed_origins: OriginPolicy::default(),
            drain_interval: DEFAULT_DRAIN_INTERVAL,
            limits: ChatLimits::default(),
            scroll_threshold_px: DEFAULT_THRESHOLD_PX,
            emoji: EmojiTimings::default(),
        }
    }
}

impl WidgetConfig {
    /// Build config from the process environment.
    ///
    /// - `WIDGET_MEDIA_BACKEND`: `conferencing` (default) or `managed_stream`
    /// - `WIDGET_ALLOWED_ORIGINS`: comma-separated origins, `*` for any
    /// - `CHAT_DRAIN_INTERVAL_MS`: default 500
    /// - `CHAT_BATCH_SIZE`: default 10
    /// - `CHAT_MAX_MESSAGES`: default 100
    /// - `CHAT_SCROLL_THRESHOLD_PX`: default 10
    /// - `EMOJI_AUTO_CLOSE_MS`: default 3000
    /// - `EMOJI_SELECTION_DELAY_MS`: default 500
    /// - `EMOJI_LOCK_SECS`: default 5
    ///
    /// # Errors
    ///
    /// See [`WidgetConfig::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Unparseable numbers fall
    /// back to their defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownBackend`] for an unrecognized backend name and
    /// [`ConfigError::Zero`] for a zero batch size, cap, or drain interval.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("WIDGET_MEDIA_BACKEND") {
            Some(raw) if !raw.trim().is_empty() => {
                BackendKind::parse(&raw).ok_or_else(|| ConfigError::UnknownBackend(raw.trim().to_owned()))?
            }
            _ => BackendKind::default(),
        };
        let allowed_origins = lookup("WIDGET_ALLOWED_ORIGINS").map(|raw| OriginPolicy::parse(&raw)).unwrap_or_default();

        let drain_ms = env_parse(&lookup, "CHAT_DRAIN_INTERVAL_MS", duration_ms(DEFAULT_DRAIN_INTERVAL));
        let limits = ChatLimits {
            batch_size: env_parse(&lookup, "CHAT_BATCH_SIZE", DEFAULT_BATCH_SIZE),
            max_messages: env_parse(&lookup, "CHAT_MAX_MESSAGES", DEFAULT_MAX_MESSAGES),
        };
        if drain_ms == 0 {
            return Err(ConfigError::Zero("CHAT_DRAIN_INTERVAL_MS"));
        }
        if limits.batch_size == 0 {
            return Err(ConfigError::Zero("CHAT_BATCH_SIZE"));
        }
        if limits.max_messages == 0 {
            return Err(ConfigError::Zero("CHAT_MAX_MESSAGES"));
        }

        let scroll_threshold_px = env_parse(&lookup, "CHAT_SCROLL_THRESHOLD_PX", DEFAULT_THRESHOLD_PX);
        let emoji = EmojiTimings {
            auto_close: Duration::from_millis(env_parse(&lookup, "EMOJI_AUTO_CLOSE_MS", duration_ms(DEFAULT_AUTO_CLOSE))),
            selection_delay: Duration::from_millis(env_parse(
                &lookup,
                "EMOJI_SELECTION_DELAY_MS",
                duration_ms(DEFAULT_SELECTION_DELAY),
            )),
            lock: Duration::from_secs(env_parse(&lookup, "EMOJI_LOCK_SECS", DEFAULT_LOCK.as_secs())),
        };

        Ok(Self {
            backend,
            allowed_origins,
            drain_interval: Duration::from_millis(drain_ms),
            limits,
            scroll_threshold_px: if scroll_threshold_px.is_finite() { scroll_threshold_px } else { DEFAULT_THRESHOLD_PX },
            emoji,
        })
    }
}

fn env_parse<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy,
{
    lookup(key).and_then(|v| v.trim().parse::<T>().ok()).unwrap_or(default)
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
