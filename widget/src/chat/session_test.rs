use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::broadcast;

use super::*;
use crate::chat::transport::{LoopbackHub, LoopbackTransport, TransportEvent};

fn loopback_session(hub: &LoopbackHub, user_id: &str) -> Arc<ChatSession> {
    let transport = Arc::new(LoopbackTransport::new(hub.clone(), "room", user_id).with_user_name(user_id));
    Arc::new(ChatSession::new(transport, ChatQueueStore::default()))
}

fn text(user_id: &str, message: &str, timestamp: i64) -> String {
    serde_json::to_string(&TextPayload::text(message, timestamp, user_id, user_id)).expect("serialize")
}

/// Transport whose publish always fails.
struct BrokenPublish {
    attempts: AtomicUsize,
}

#[async_trait::async_trait]
impl ChatTransport for BrokenPublish {
    async fn join(&self, _token: &str) -> Result<JoinedChannel, TransportError> {
        Ok(JoinedChannel { channel: "room".into(), user_id: "me".into(), user_name: None })
    }

    async fn publish(&self, _channel: &str, _payload: String) -> Result<(), TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::Publish("socket closed".into()))
    }

    fn subscribe(&self, _channel: &str) -> broadcast::Receiver<TransportEvent> {
        broadcast::channel(1).1
    }
}

// =============================================================
// receive
// =============================================================

#[tokio::test]
async fn receive_enqueues_remote_text() {
    let hub = LoopbackHub::new();
    let session = loopback_session(&hub, "me");
    session.join("token").await.expect("join");

    let queued = session.receive(&text("other", "hi", 10)).expect("parse").expect("queued");
    assert_eq!(queued.user_id, "other");
    assert!(!queued.is_local);
    assert_eq!(session.store().pending_len(), 1);
    assert!(session.store().messages().is_empty(), "remote messages wait for the drain");
}

#[tokio::test]
async fn receive_suppresses_own_echo() {
    let hub = LoopbackHub::new();
    let session = loopback_session(&hub, "me");
    session.join("token").await.expect("join");

    assert_eq!(session.receive(&text("me", "hi", 10)).expect("parse"), None);
    assert_eq!(session.store().pending_len(), 0);
}

#[test]
fn receive_ignores_non_text_payloads() {
    let hub = LoopbackHub::new();
    let session = loopback_session(&hub, "me");
    let raw = r#"{"type":"reaction","message":"x","timestamp":1,"userId":"other"}"#;
    assert_eq!(session.receive(raw).expect("parse"), None);
}

#[test]
fn malformed_payload_is_an_error_and_leaves_queue_alone() {
    let hub = LoopbackHub::new();
    let session = loopback_session(&hub, "me");
    session.receive(&text("other", "first", 1)).expect("parse");
    assert!(session.receive("{broken").is_err());
    assert_eq!(session.store().pending_len(), 1);
}

#[test]
fn same_sender_same_millisecond_gets_distinct_ids() {
    let hub = LoopbackHub::new();
    let session = loopback_session(&hub, "me");
    let a = session.receive(&text("other", "a", 5)).expect("parse").expect("queued");
    let b = session.receive(&text("other", "b", 5)).expect("parse").expect("queued");
    assert_ne!(a.id, b.id);
}

// =============================================================
// send
// =============================================================

#[tokio::test]
async fn send_appends_trimmed_local_echo_immediately() {
    let hub = LoopbackHub::new();
    let session = loopback_session(&hub, "me");
    session.join("token").await.expect("join");

    let echo = session.send("  hello  ").await.expect("sent");
    assert_eq!(echo.message, "hello");
    assert!(echo.is_local);
    assert_eq!(session.store().messages(), vec![echo]);
    assert_eq!(session.store().pending_len(), 0);
}

#[tokio::test]
async fn send_blank_or_unjoined_is_noop() {
    let hub = LoopbackHub::new();
    let session = loopback_session(&hub, "me");
    assert!(session.send("hello").await.is_none(), "not joined");
    session.join("token").await.expect("join");
    assert!(session.send("   ").await.is_none(), "blank");
    assert!(session.store().messages().is_empty());
}

#[tokio::test]
async fn publish_failure_keeps_local_echo_and_is_not_retried() {
    let transport = Arc::new(BrokenPublish { attempts: AtomicUsize::new(0) });
    let session = ChatSession::new(transport.clone(), ChatQueueStore::default());
    session.join("token").await.expect("join");

    assert!(session.send("hello").await.is_some());
    assert_eq!(session.store().messages().len(), 1);
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn send_publishes_wire_payload() {
    let hub = LoopbackHub::new();
    let mut rx = hub.subscribe("room");
    let session = loopback_session(&hub, "me");
    session.join("token").await.expect("join");
    session.send("hello").await.expect("sent");

    let event = rx.recv().await.expect("delivered");
    let payload = parse_payload(&event.message).expect("parse");
    assert!(payload.is_text());
    assert_eq!(payload.message, "hello");
    assert_eq!(payload.user_id, "me");
    assert_eq!(payload.user_name.as_deref(), Some("me"));
}

// =============================================================
// pump
// =============================================================

#[tokio::test]
async fn pump_queues_other_participants_and_skips_own() {
    let hub = LoopbackHub::new();
    let me = loopback_session(&hub, "me");
    let other = loopback_session(&hub, "other");
    me.join("token").await.expect("join");
    other.join("token").await.expect("join");
    assert!(loopback_session(&hub, "x").spawn_pump().is_none(), "unjoined session has no pump");

    let pump = me.spawn_pump().expect("pump");
    other.send("from other").await.expect("sent");
    me.send("from me").await.expect("sent");
    hub.publish("room", "{garbage".into());
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    let snapshot = me.store().snapshot();
    assert_eq!(snapshot.pending().len(), 1);
    assert_eq!(snapshot.pending()[0].message, "from other");
    assert_eq!(snapshot.messages().len(), 1, "own echo only via local append");
    pump.abort();
}
