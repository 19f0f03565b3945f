use super::*;

fn controller(backend: BackendKind) -> (MediaController, Arc<HeadlessMediaEngine>) {
    let engine = Arc::new(HeadlessMediaEngine::new());
    (MediaController::new(backend, engine.clone()), engine)
}

#[test]
fn backend_names_parse() {
    assert_eq!(BackendKind::parse("conferencing"), Some(BackendKind::Conferencing));
    assert_eq!(BackendKind::parse(" Managed_Stream "), Some(BackendKind::ManagedStream));
    assert_eq!(BackendKind::parse("rtmp"), None);
    assert_eq!(BackendKind::ManagedStream.to_string(), "managed_stream");
}

#[tokio::test]
async fn join_applies_backend_defaults() {
    let (conf, conf_engine) = controller(BackendKind::Conferencing);
    conf.join("tok").await.expect("join");
    assert!(conf.is_joined());
    assert_eq!(
        conf_engine.calls(),
        vec![MediaCall::Join("tok".into()), MediaCall::SetVolume(100), MediaCall::SetMuted(false)]
    );

    let (stream, stream_engine) = controller(BackendKind::ManagedStream);
    stream.join("tok").await.expect("join");
    assert!(stream.is_muted());
    assert_eq!(stream_engine.calls().last(), Some(&MediaCall::SetMuted(true)));
}

#[tokio::test]
async fn failed_join_stays_unjoined() {
    let engine = Arc::new(HeadlessMediaEngine::new().failing_join("no camera"));
    let media = MediaController::new(BackendKind::Conferencing, engine.clone());

    let err = media.join("tok").await.expect_err("forced failure");
    assert_eq!(err, MediaError::Join("no camera".into()));
    assert!(err.retryable());
    assert!(!media.is_joined());
    assert_eq!(engine.calls(), vec![MediaCall::Join("tok".into())]);
}

#[tokio::test]
async fn volume_before_join_is_remembered_and_applied() {
    let (media, engine) = controller(BackendKind::Conferencing);
    media.set_volume(30).await.expect("stored");
    assert!(engine.calls().is_empty(), "nothing forwarded before join");

    media.join("tok").await.expect("join");
    assert!(engine.calls().contains(&MediaCall::SetVolume(30)));

    media.set_volume(250).await.expect("forwarded");
    assert_eq!(media.volume(), 100);
    assert_eq!(engine.calls().last(), Some(&MediaCall::SetVolume(100)));
}

#[tokio::test]
async fn toggle_mute_flips_and_forwards_once_joined() {
    let (media, engine) = controller(BackendKind::ManagedStream);
    assert!(!media.toggle_mute().await.expect("toggle"), "starts muted, so first toggle unmutes");
    media.join("tok").await.expect("join");
    assert!(media.toggle_mute().await.expect("toggle"));
    assert_eq!(engine.calls().last(), Some(&MediaCall::SetMuted(true)));
}

#[tokio::test]
async fn track_subscription_on_conferencing() {
    let (media, engine) = controller(BackendKind::Conferencing);
    assert_eq!(media.subscribe_video("host").await, Err(MediaError::NotJoined));

    media.join("tok").await.expect("join");
    media.subscribe_video("host").await.expect("subscribe");
    media.subscribe_video("guest").await.expect("subscribe");
    media.unsubscribe_video("host").await.expect("unsubscribe");
    assert_eq!(media.subscribed(), vec!["guest".to_owned()]);
    assert!(engine.calls().contains(&MediaCall::UnsubscribeVideo("host".into())));
}

#[tokio::test]
async fn managed_stream_rejects_track_subscription() {
    let (media, engine) = controller(BackendKind::ManagedStream);
    media.join("tok").await.expect("join");

    let err = media.subscribe_video("host").await.expect_err("unsupported");
    assert_eq!(err, MediaError::Unsupported { backend: BackendKind::ManagedStream, operation: "subscribe_video" });
    assert_eq!(err.error_code(), "E_MEDIA_UNSUPPORTED");
    assert!(!engine.calls().iter().any(|c| matches!(c, MediaCall::SubscribeVideo(_))));
}

#[tokio::test]
async fn leave_is_idempotent() {
    let (media, engine) = controller(BackendKind::Conferencing);
    media.leave().await.expect("noop");
    assert!(engine.calls().is_empty());

    media.join("tok").await.expect("join");
    media.subscribe_video("host").await.expect("subscribe");
    media.leave().await.expect("leave");
    media.leave().await.expect("second leave");
    assert!(!media.is_joined());
    assert!(media.subscribed().is_empty());
    assert_eq!(engine.calls().iter().filter(|c| **c == MediaCall::Leave).count(), 1);
}
