use serde_json::json;
use tokio::sync::mpsc;
use widget::WidgetConfig;
use widget::chat::LoopbackTransport;
use widget::control::{ChannelHostPort, OriginPolicy};
use widget::media::HeadlessMediaEngine;

use super::*;

const ORIGIN: &str = "http://localhost";

fn parse(line: &str) -> HarnessLine {
    parse_line(line, ORIGIN).expect("parse")
}

fn start() -> (Harness, mpsc::UnboundedReceiver<envelope::Envelope>) {
    let hub = LoopbackHub::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let config = WidgetConfig { allowed_origins: OriginPolicy::parse(ORIGIN), ..WidgetConfig::default() };
    let session = WidgetSession::start(
        config,
        Arc::new(LoopbackTransport::new(hub.clone(), "widget", "viewer")),
        Arc::new(HeadlessMediaEngine::new()),
        Arc::new(ChannelHostPort::new(tx)),
    );
    (Harness::new(session, hub, "widget", ORIGIN), rx)
}

fn kinds(rx: &mut mpsc::UnboundedReceiver<envelope::Envelope>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        out.push(envelope.kind);
    }
    out
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

// =============================================================
// parse_line
// =============================================================

#[test]
fn host_message_with_origin_and_data() {
    let line = r#"{"origin":"https://host.example","data":{"type":"TOGGLE_CHAT","payload":true}}"#;
    assert_eq!(
        parse(line),
        HarnessLine::Host { origin: "https://host.example".into(), data: json!({"type": "TOGGLE_CHAT", "payload": true}) }
    );
}

#[test]
fn bare_envelope_gets_default_origin() {
    assert_eq!(
        parse(r#"{"type":"CYCLE_WIDGET_MODE"}"#),
        HarnessLine::Host { origin: ORIGIN.into(), data: json!({"type": "CYCLE_WIDGET_MODE"}) }
    );
}

#[test]
fn json_errors() {
    assert!(matches!(parse_line("{nope", ORIGIN), Err(HarnessError::Json(_))));
    assert!(matches!(parse_line("[1,2]", ORIGIN), Err(HarnessError::UnknownCommand(_))));
}

#[test]
fn text_commands() {
    assert_eq!(parse("say  hello there "), HarnessLine::Say("hello there".into()));
    assert_eq!(parse("remote guest hi all"), HarnessLine::Remote { user: "guest".into(), text: "hi all".into() });
    assert_eq!(
        parse("scroll 80 500 600"),
        HarnessLine::Scroll(ScrollMetrics { scroll_top: 80.0, client_height: 500.0, scroll_height: 600.0 })
    );
    assert_eq!(parse("emoji open"), HarnessLine::Emoji(EmojiAction::Open));
    assert_eq!(parse("emoji expand"), HarnessLine::Emoji(EmojiAction::Resize(ResizeDirection::Expand)));
    assert_eq!(parse("emoji pick LOVE_IT"), HarnessLine::EmojiPick("LOVE_IT".into()));
    assert_eq!(parse("retry chat"), HarnessLine::Retry(Subsystem::Chat));
    assert_eq!(parse("mute"), HarnessLine::Mute);
    assert_eq!(parse("quit"), HarnessLine::Quit);
    assert_eq!(parse("   "), HarnessLine::Skip);
    assert_eq!(parse("# comment"), HarnessLine::Skip);
}

#[test]
fn command_errors() {
    assert!(matches!(parse_line("remote guest", ORIGIN), Err(HarnessError::MissingArgument(_))));
    assert!(matches!(parse_line("scroll 1 2", ORIGIN), Err(HarnessError::MissingArgument(_))));
    assert!(matches!(parse_line("scroll 1 x 3", ORIGIN), Err(HarnessError::InvalidNumber(n)) if n == "x"));
    assert!(matches!(parse_line("emoji pick", ORIGIN), Err(HarnessError::MissingArgument(_))));
    assert!(matches!(parse_line("retry everything", ORIGIN), Err(HarnessError::MissingArgument(_))));
    assert!(matches!(parse_line("dance", ORIGIN), Err(HarnessError::UnknownCommand(c)) if c == "dance"));
}

// =============================================================
// Harness
// =============================================================

#[tokio::test]
async fn run_feeds_host_messages_and_stops_at_quit() {
    let (harness, mut rx) = start();
    let input = concat!(
        "{\"type\":\"TOGGLE_CHAT\",\"payload\":true}\n",
        "not a command\n",
        "quit\n",
        "{\"type\":\"CYCLE_WIDGET_MODE\"}\n",
    );
    harness.run(input.as_bytes()).await.expect("run");

    assert_eq!(kinds(&mut rx), ["STATE_UPDATE", "STATE_UPDATE"], "initial update, then toggle; nothing after quit");
}

#[tokio::test]
async fn token_then_chat_both_directions() {
    let (harness, mut rx) = start();
    harness.execute(parse(r#"{"type":"ACCESS_TOKEN","payload":"tok"}"#)).await;
    settle().await;
    let events = kinds(&mut rx);
    assert!(events.contains(&"MEDIA_CONNECTED".to_owned()));
    assert!(events.contains(&"CHAT_CONNECTED".to_owned()));

    assert!(harness.execute(parse("say hello")).await);
    harness.execute(parse("remote guest hi")).await;
    settle().await;

    let store = harness.session.store();
    assert_eq!(store.messages().len(), 1, "local echo appended at once");
    assert_eq!(store.pending_len(), 1, "remote line waits for the drain");
}

#[tokio::test(start_paused = true)]
async fn emoji_pick_reports_to_host() {
    let (harness, mut rx) = start();
    harness.execute(parse(r#"{"type":"ACCESS_TOKEN","payload":"tok"}"#)).await;
    settle().await;
    kinds(&mut rx);

    harness.execute(parse("emoji open")).await;
    tokio::time::sleep(std::time::Duration::from_millis(600)).await;
    harness.execute(parse("emoji pick WOW")).await;

    assert_eq!(kinds(&mut rx), ["EMOJI_MODEL_OPENED", "EMOJI_SELECTED", "EMOJI_MODEL_OPENED"]);
}
