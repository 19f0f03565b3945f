//! Line-oriented driver for a headless widget session.
//!
//! Each input line is one of:
//! - a JSON object `{"origin": "...", "data": {...}}`, a host message; a bare
//!   envelope object is accepted too and gets the default origin
//! - `say <text>`: the local viewer sends a chat line
//! - `remote <user> <text>`: another participant publishes a chat line
//! - `scroll <top> <client-height> <scroll-height>`: a scroll event
//! - `emoji open|close|expand|contract` or `emoji pick <name>`
//! - `retry media|chat`, `mute`, `log`, `quit`
//!
//! Blank lines and lines starting with `#` are skipped.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};
use widget::WidgetSession;
use widget::chat::LoopbackHub;
use widget::chat::ScrollMetrics;
use widget::chat::message::{TextPayload, now_ms};
use widget::emoji::ResizeDirection;
use widget::state::Subsystem;

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("invalid JSON line: {0}")]
    Json(#[from] serde_json::Error),
    #[error("host message must be a JSON object")]
    NotAnObject,
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("missing {0}")]
    MissingArgument(&'static str),
    #[error("invalid number `{0}`")]
    InvalidNumber(String),
    #[error("stdin read failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmojiAction {
    Open,
    Close,
    Resize(ResizeDirection),
}

#[derive(Clone, Debug, PartialEq)]
pub enum HarnessLine {
    Host { origin: String, data: Value },
    Say(String),
    Remote { user: String, text: String },
    Scroll(ScrollMetrics),
    Emoji(EmojiAction),
    EmojiPick(String),
    Retry(Subsystem),
    Mute,
    Log,
    Quit,
    Skip,
}

/// Parse one input line. `default_origin` is used for bare envelopes.
///
/// # Errors
///
/// Returns [`HarnessError`] for lines that match no command.
pub fn parse_line(line: &str, default_origin: &str) -> Result<HarnessLine, HarnessError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(HarnessLine::Skip);
    }
    if line.starts_with('{') {
        return parse_host_message(line, default_origin);
    }

    let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    match command {
        "say" => Ok(HarnessLine::Say(rest.to_owned())),
        "remote" => {
            let (user, text) = rest.split_once(char::is_whitespace).ok_or(HarnessError::MissingArgument("remote text"))?;
            Ok(HarnessLine::Remote { user: user.to_owned(), text: text.trim().to_owned() })
        }
        "scroll" => {
            let numbers = rest.split_whitespace().map(parse_number).collect::<Result<Vec<f64>, _>>()?;
            let [scroll_top, client_height, scroll_height] = numbers[..] else {
                return Err(HarnessError::MissingArgument("scroll top, client height, scroll height"));
            };
            Ok(HarnessLine::Scroll(ScrollMetrics { scroll_top, client_height, scroll_height }))
        }
        "emoji" => parse_emoji(rest),
        "retry" => match rest {
            "media" => Ok(HarnessLine::Retry(Subsystem::Media)),
            "chat" => Ok(HarnessLine::Retry(Subsystem::Chat)),
            _ => Err(HarnessError::MissingArgument("retry target (media|chat)")),
        },
        "mute" => Ok(HarnessLine::Mute),
        "log" => Ok(HarnessLine::Log),
        "quit" | "exit" => Ok(HarnessLine::Quit),
        other => Err(HarnessError::UnknownCommand(other.to_owned())),
    }
}

fn parse_host_message(line: &str, default_origin: &str) -> Result<HarnessLine, HarnessError> {
    let Value::Object(mut object) = serde_json::from_str::<Value>(line)? else {
        return Err(HarnessError::NotAnObject);
    };
    if let Some(data) = object.remove("data") {
        let origin = match object.remove("origin") {
            Some(Value::String(origin)) => origin,
            _ => default_origin.to_owned(),
        };
        return Ok(HarnessLine::Host { origin, data });
    }
    Ok(HarnessLine::Host { origin: default_origin.to_owned(), data: Value::Object(object) })
}

fn parse_emoji(rest: &str) -> Result<HarnessLine, HarnessError> {
    let (action, arg) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    match action {
        "open" => Ok(HarnessLine::Emoji(EmojiAction::Open)),
        "close" => Ok(HarnessLine::Emoji(EmojiAction::Close)),
        "expand" => Ok(HarnessLine::Emoji(EmojiAction::Resize(ResizeDirection::Expand))),
        "contract" => Ok(HarnessLine::Emoji(EmojiAction::Resize(ResizeDirection::Contract))),
        "pick" if !arg.trim().is_empty() => Ok(HarnessLine::EmojiPick(arg.trim().to_owned())),
        "pick" => Err(HarnessError::MissingArgument("emoji name")),
        other => Err(HarnessError::UnknownCommand(format!("emoji {other}"))),
    }
}

fn parse_number(raw: &str) -> Result<f64, HarnessError> {
    raw.parse::<f64>().map_err(|_| HarnessError::InvalidNumber(raw.to_owned()))
}

// =============================================================================
// RUNNER
// =============================================================================

/// Drives one session from parsed lines.
pub struct Harness {
    session: Arc<WidgetSession>,
    hub: LoopbackHub,
    channel: String,
    default_origin: String,
}

impl Harness {
    #[must_use]
    pub fn new(session: Arc<WidgetSession>, hub: LoopbackHub, channel: impl Into<String>, default_origin: impl Into<String>) -> Self {
        Self { session, hub, channel: channel.into(), default_origin: default_origin.into() }
    }

    /// Execute one line. Returns false when the harness should stop.
    pub async fn execute(&self, line: HarnessLine) -> bool {
        match line {
            HarnessLine::Host { origin, data } => {
                let delivery = self.session.handle_host_message(&origin, data);
                info!(?delivery, %origin, "host message");
            }
            HarnessLine::Say(text) => {
                if self.session.send_chat(&text).await.is_none() {
                    warn!("chat line not sent (blank or not joined)");
                }
            }
            HarnessLine::Remote { user, text } => {
                let payload = TextPayload::text(text, now_ms(), user.as_str(), user.as_str());
                match serde_json::to_string(&payload) {
                    Ok(body) => {
                        let reached = self.hub.publish(&self.channel, body);
                        info!(%user, reached, "remote chat published");
                    }
                    Err(e) => warn!(error = %e, "remote chat not encoded"),
                }
            }
            HarnessLine::Scroll(metrics) => {
                let paused = self.session.on_scroll(metrics);
                info!(paused, "scroll");
            }
            HarnessLine::Emoji(EmojiAction::Open) => {
                self.session.emoji().open();
            }
            HarnessLine::Emoji(EmojiAction::Close) => {
                self.session.emoji().close();
            }
            HarnessLine::Emoji(EmojiAction::Resize(direction)) => self.session.emoji().resize(direction),
            HarnessLine::EmojiPick(name) => {
                if !self.session.emoji().select(&name).await {
                    warn!(%name, "emoji pick ignored");
                }
            }
            HarnessLine::Retry(subsystem) => {
                if let Err(e) = self.session.retry(subsystem) {
                    warn!(error = %e, "retry refused");
                }
            }
            HarnessLine::Mute => match self.session.toggle_mute().await {
                Ok(muted) => info!(muted, "audio mute toggled"),
                Err(e) => warn!(error = %e, "mute toggle failed"),
            },
            HarnessLine::Log => {
                for message in self.session.store().messages() {
                    info!(user = %message.user_name, local = message.is_local, "{}", message.message);
                }
            }
            HarnessLine::Quit => return false,
            HarnessLine::Skip => {}
        }
        true
    }

    /// Read lines until EOF or `quit`. Bad lines are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Io`] when reading fails.
    pub async fn run<R>(&self, reader: R) -> Result<(), HarnessError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            match parse_line(&line, &self.default_origin) {
                Ok(parsed) => {
                    if !self.execute(parsed).await {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "input line skipped"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "harness_test.rs"]
mod tests;
