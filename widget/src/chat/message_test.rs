use super::*;

#[test]
fn parse_payload_reads_camel_case_fields() {
    let raw = r#"{"type":"text","message":"hi","timestamp":1700,"userId":"u1","userName":"Ada"}"#;
    let payload = parse_payload(raw).expect("parse");
    assert!(payload.is_text());
    assert_eq!(payload.user_id, "u1");
    assert_eq!(payload.user_name.as_deref(), Some("Ada"));
    assert_eq!(payload.timestamp, 1700);
}

#[test]
fn parse_payload_rejects_missing_message() {
    let raw = r#"{"type":"text","timestamp":1,"userId":"u1"}"#;
    assert!(matches!(parse_payload(raw), Err(PayloadError::Malformed(_))));
}

#[test]
fn parse_payload_rejects_garbage() {
    assert!(parse_payload("not json").is_err());
}

#[test]
fn remote_message_defaults_user_name() {
    let raw = r#"{"type":"text","message":"  spaced  ","timestamp":5,"userId":"u2"}"#;
    let payload = parse_payload(raw).expect("parse");
    let msg = ChatMessage::remote(payload, "id-1".into());
    assert_eq!(msg.user_name, ANONYMOUS);
    assert!(!msg.is_local);
    // Receivers never re-trim.
    assert_eq!(msg.message, "  spaced  ");
}

#[test]
fn remote_message_treats_empty_name_as_anonymous() {
    let payload = TextPayload::text("x", 1, "u3", "");
    let msg = ChatMessage::remote(payload, "id".into());
    assert_eq!(msg.user_name, ANONYMOUS);
}

#[test]
fn local_message_is_flagged_and_named_me() {
    let msg = ChatMessage::local("id".into(), "me", "hello", 9);
    assert!(msg.is_local);
    assert_eq!(msg.user_name, LOCAL_DISPLAY_NAME);
}

#[test]
fn ids_do_not_collide_within_one_millisecond() {
    let ids = MessageIds::new();
    let a = ids.next("u1", 1000);
    let b = ids.next("u1", 1000);
    assert_ne!(a, b);
    assert!(a.starts_with("u1-1000-"));
}

#[test]
fn text_payload_serializes_wire_shape() {
    let payload = TextPayload::text("hi", 7, "u1", "Ada");
    let value = serde_json::to_value(&payload).expect("serialize");
    assert_eq!(
        value,
        serde_json::json!({"type": "text", "message": "hi", "timestamp": 7, "userId": "u1", "userName": "Ada"})
    );
}

#[test]
fn now_ms_is_positive() {
    assert!(now_ms() > 0);
}
