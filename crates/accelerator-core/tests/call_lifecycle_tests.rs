//! Integration tests for the call lifecycle.
//!
//! Drives a `VideoAccelerator` against `MockSdk` through connect, join,
//! remote stream churn and leave, asserting on registry snapshots and the
//! events delivered to host callbacks.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use accelerator_core::gateway::ObjectListeners;
use accelerator_core::{
    AcceleratorError, AcceleratorEvent, AcceleratorOptions, Callback, CommunicationOptions,
    Credential, EventData, EventName, VideoAccelerator,
};
use accelerator_test_utils::{
    init_test_tracing, EventRecorder, MockSdk, TestCredentials, TestStream,
};
use common::sdk::{SessionEvent, SessionEventKind, VideoSdk};
use common::types::{Container, MediaProperties, StreamType};
use tokio::sync::Notify;

// ============================================================================
// Helpers
// ============================================================================

fn credential() -> Credential {
    let creds = TestCredentials::new();
    Credential::new(creds.api_key, creds.session_id, creds.token).unwrap()
}

struct Call {
    sdk: Arc<MockSdk>,
    acc: VideoAccelerator,
    recorder: EventRecorder,
}

async fn connected_call(sdk: MockSdk, communication: CommunicationOptions) -> Call {
    init_test_tracing();
    let sdk = Arc::new(sdk);
    let options = AcceleratorOptions {
        communication,
        ..AcceleratorOptions::new(credential())
    };
    let acc = VideoAccelerator::new(options, Arc::clone(&sdk) as Arc<dyn VideoSdk>).unwrap();
    let recorder = EventRecorder::new();
    recorder.attach(acc.events(), AcceleratorEvent::ALL);
    acc.connect().await.unwrap();
    Call { sdk, acc, recorder }
}

async fn default_call() -> Call {
    connected_call(MockSdk::default(), CommunicationOptions::default()).await
}

fn remote_stream_appears(call: &Call, stream: TestStream) {
    call.sdk.emit(SessionEvent::StreamCreated(stream.build()));
}

/// Let spawned tasks run until they block.
async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Credentials
// ============================================================================

#[test]
fn test_empty_token_is_rejected_naming_the_field() {
    let err = Credential::new("k1", "s1", "").unwrap_err();

    assert!(matches!(err, AcceleratorError::Configuration(_)));
    assert_eq!(err.to_string(), "token is a required credential");
}

// ============================================================================
// Join
// ============================================================================

#[tokio::test]
async fn test_join_subscribes_to_existing_camera_streams() {
    let call = default_call().await;
    remote_stream_appears(&call, TestStream::camera("cam-a"));
    remote_stream_appears(&call, TestStream::camera("cam-b"));

    let result = call.acc.join(None).await.unwrap();

    assert!(result.publisher.is_some());
    assert_eq!(call.recorder.count("subscribeToCamera"), 2);
    assert_eq!(call.recorder.count("joinSession"), 1);

    let Some(EventData::Joined(joined)) = call.recorder.last("joinSession") else {
        unreachable!("joinSession without a join payload");
    };
    assert_eq!(joined.pub_sub.publishers.len(StreamType::Camera), 1);
    assert_eq!(joined.pub_sub.subscribers.len(StreamType::Camera), 2);
    assert_eq!(joined.pub_sub.meta.subscriber.camera, 2);
    assert_eq!(joined, result);
}

#[tokio::test]
async fn test_join_event_sees_registry_already_updated() {
    let call = default_call().await;
    remote_stream_appears(&call, TestStream::camera("cam-a"));

    let seen = Arc::new(AtomicUsize::new(0));
    let gateway = call.acc.gateway().clone();
    let observed = Arc::clone(&seen);
    let callback: Callback = Arc::new(move |_: &EventData| {
        observed.store(gateway.pub_sub().meta.subscriber.total, Ordering::SeqCst);
    });
    call.acc.on(AcceleratorEvent::JoinSession, callback);

    call.acc.join(None).await.unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_join_with_failed_subscription_keeps_publisher() {
    let call = connected_call(
        MockSdk::builder()
            .fail_subscribe_for("cam-bad", 1500, "Stream unavailable")
            .build(),
        CommunicationOptions::default(),
    )
    .await;
    remote_stream_appears(&call, TestStream::camera("cam-good"));
    remote_stream_appears(&call, TestStream::camera("cam-bad"));

    let result = call.acc.join(None).await.unwrap();

    assert!(result.publisher.is_some());
    assert_eq!(result.pub_sub.meta.publisher.camera, 1);
    assert_eq!(result.pub_sub.meta.subscriber.camera, 1);
    assert_eq!(call.sdk.subscribe_calls().len(), 2);
    assert_eq!(call.recorder.count("joinSession"), 0);
    assert!(call.acc.communication().is_active());
}

#[tokio::test]
async fn test_network_publish_failure_raises_friendly_error() {
    let call = connected_call(
        MockSdk::builder()
            .fail_publish_with(1010, "Publisher ICE workflow failed")
            .build(),
        CommunicationOptions::default(),
    )
    .await;

    let publisher = call.acc.communication().publish(None).await;

    assert!(publisher.is_none());
    assert_eq!(
        call.recorder.last("error"),
        Some(EventData::Error("Check your network connection".to_string()))
    );
}

#[tokio::test]
async fn test_other_publish_failure_passes_message_through() {
    let call = connected_call(
        MockSdk::builder()
            .fail_publish_with(1500, "Unable to publish")
            .build(),
        CommunicationOptions::default(),
    )
    .await;

    let result = call.acc.join(None).await.unwrap();

    assert!(result.publisher.is_none());
    assert_eq!(
        call.recorder.last("error"),
        Some(EventData::Error("Unable to publish".to_string()))
    );
    assert_eq!(call.recorder.count("joinSession"), 1);
}

// ============================================================================
// Admission control
// ============================================================================

#[tokio::test]
async fn test_admission_flips_at_the_limit() {
    let call = connected_call(
        MockSdk::default(),
        CommunicationOptions {
            connection_limit: Some(3),
            ..CommunicationOptions::default()
        },
    )
    .await;
    let communication = call.acc.communication();

    for id in ["cam-1", "cam-2"] {
        call.acc
            .subscribe(&TestStream::camera(id).build(), None, false)
            .await
            .unwrap();
        assert!(communication.able_to_join());
    }
    for stream in [TestStream::screen("scr-1"), TestStream::sip("sip-1")] {
        call.acc.subscribe(&stream.build(), None, false).await.unwrap();
    }
    assert!(communication.able_to_join());

    call.acc
        .subscribe(&TestStream::camera("cam-3").build(), None, false)
        .await
        .unwrap();
    assert!(!communication.able_to_join());

    let err = call.acc.join(None).await.unwrap_err();
    assert_eq!(err, AcceleratorError::ConnectionLimit);
    assert_eq!(
        call.recorder.last("error"),
        Some(EventData::Error(
            "Session has reached its connection limit".to_string()
        ))
    );
    assert!(call.sdk.init_publisher_calls().is_empty());
}

// ============================================================================
// Leave
// ============================================================================

#[tokio::test]
async fn test_join_then_leave_restores_empty_registry() {
    let call = default_call().await;
    remote_stream_appears(&call, TestStream::camera("cam-a"));
    remote_stream_appears(&call, TestStream::screen("scr-a"));

    call.acc.join(None).await.unwrap();
    call.acc.leave().await;

    let state = call.acc.state();
    assert_eq!(state.pub_sub.meta.publisher.total, 0);
    assert_eq!(state.pub_sub.meta.subscriber.total, 0);
    assert!(state.stream_map.is_empty());
    assert!(!call.acc.communication().is_active());
    assert_eq!(call.recorder.count("leaveSession"), 1);

    // the call can be started again
    call.acc.join(None).await.unwrap();
    assert_eq!(call.recorder.count("joinSession"), 2);
}

#[tokio::test]
async fn test_unsubscribe_removes_registry_state_before_sdk_settles() {
    let gate = Arc::new(tokio::sync::Notify::new());
    let call = connected_call(
        MockSdk::builder().hold_unsubscribe(Arc::clone(&gate)).build(),
        CommunicationOptions::default(),
    )
    .await;
    let subscriber = call
        .acc
        .subscribe(&TestStream::camera("cam-a").build(), None, false)
        .await
        .unwrap();

    let acc = Arc::new(call.acc);
    let pending = {
        let acc = Arc::clone(&acc);
        tokio::spawn(async move { acc.unsubscribe(&subscriber).await })
    };
    tokio::task::yield_now().await;

    assert_eq!(acc.state().pub_sub.meta.subscriber.total, 0);
    assert!(call.sdk.unsubscribed().is_empty());

    gate.notify_one();
    pending.await.unwrap();
    assert_eq!(call.sdk.unsubscribed().len(), 1);
}

// ============================================================================
// Remote stream churn
// ============================================================================

#[tokio::test]
async fn test_streams_arriving_mid_call_are_subscribed() {
    let call = default_call().await;
    call.acc.join(None).await.unwrap();

    remote_stream_appears(&call, TestStream::camera("late-cam"));
    remote_stream_appears(&call, TestStream::sip("late-sip"));

    assert!(
        call.recorder
            .wait_for("subscribeToCamera", 1, Duration::from_secs(1))
            .await
    );
    assert!(
        call.recorder
            .wait_for("subscribeToSip", 1, Duration::from_secs(1))
            .await
    );

    call.sdk.emit(SessionEvent::StreamDestroyed(
        TestStream::camera("late-cam").build(),
    ));
    assert_eq!(call.recorder.count("unsubscribeFromCamera"), 1);
    assert_eq!(call.acc.state().pub_sub.meta.subscriber.camera, 0);
}

#[tokio::test]
async fn test_relayed_session_events_reach_host_callbacks() {
    let call = default_call().await;
    let recorder = EventRecorder::new();
    recorder.attach(
        call.acc.events(),
        [
            SessionEventKind::ArchiveStarted,
            SessionEventKind::SessionReconnecting,
        ],
    );

    call.sdk.emit(SessionEvent::ArchiveStarted {
        id: "archive-1".to_string(),
        name: "standup".to_string(),
    });
    call.sdk.emit(SessionEvent::SessionReconnecting);

    assert_eq!(recorder.names(), vec!["archiveStarted", "sessionReconnecting"]);
}

// ============================================================================
// Event bus
// ============================================================================

#[tokio::test]
async fn test_off_all_silences_every_event() {
    let call = default_call().await;
    let hits = Arc::new(AtomicUsize::new(0));
    for event in [AcceleratorEvent::Error, AcceleratorEvent::JoinSession] {
        let hits = Arc::clone(&hits);
        call.acc.on(
            event,
            Arc::new(move |_: &EventData| {
                hits.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }

    call.acc.off_all();

    assert_eq!(
        call.acc
            .trigger_event(AcceleratorEvent::Error, &EventData::Error("x".to_string())),
        0
    );
    assert_eq!(
        call.acc
            .trigger_event(AcceleratorEvent::JoinSession, &EventData::Empty),
        0
    );
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_subscribe_twice_yields_one_subscriber() {
    let call = default_call().await;
    let stream = TestStream::camera("cam-a").build();

    let first = call.acc.subscribe(&stream, None, false).await.unwrap();
    let second = call.acc.subscribe(&stream, None, false).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(call.acc.state().pub_sub.meta.subscriber.total, 1);
}

// ============================================================================
// Overlapping operations
// ============================================================================

#[tokio::test]
async fn test_concurrent_subscribes_to_one_stream_share_a_subscriber() {
    let gate = Arc::new(Notify::new());
    let call = connected_call(
        MockSdk::builder().hold_subscribe(Arc::clone(&gate)).build(),
        CommunicationOptions::default(),
    )
    .await;
    let stream = TestStream::camera("cam-a").build();
    call.sdk.emit(SessionEvent::StreamCreated(stream.clone()));

    let (first, second, ()) = tokio::join!(
        call.acc.subscribe(&stream, None, false),
        call.acc.subscribe(&stream, None, false),
        async { gate.notify_one() },
    );

    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(call.sdk.subscribe_calls().len(), 1);
    assert_eq!(call.recorder.count("subscribeToCamera"), 1);
    assert_eq!(call.acc.state().pub_sub.meta.subscriber.total, 1);

    // the one mapping is enough to release everything on destroy
    call.sdk.emit(SessionEvent::StreamDestroyed(stream));
    assert_eq!(call.acc.state().pub_sub.meta.subscriber.total, 0);
    assert_eq!(call.acc.gateway().bound_objects(), 0);
}

#[tokio::test]
async fn test_stream_created_while_leaving_stays_unsubscribed() {
    let gate = Arc::new(Notify::new());
    let call = connected_call(
        MockSdk::builder().hold_unsubscribe(Arc::clone(&gate)).build(),
        CommunicationOptions::default(),
    )
    .await;
    remote_stream_appears(&call, TestStream::camera("cam-a"));
    call.acc.join(None).await.unwrap();
    assert_eq!(call.sdk.subscribe_calls().len(), 1);

    tokio::join!(call.acc.leave(), async {
        assert!(!call.acc.communication().is_active());
        remote_stream_appears(&call, TestStream::camera("cam-late"));
        gate.notify_one();
    });
    settle().await;

    assert_eq!(call.sdk.subscribe_calls().len(), 1);
    let state = call.acc.state();
    assert_eq!(state.pub_sub.meta.subscriber.total, 0);
    assert_eq!(state.streams.len(), 2);
    assert_eq!(call.recorder.count("leaveSession"), 1);
}

#[tokio::test]
async fn test_object_listeners_follow_their_subscriber() {
    let call = default_call().await;
    let hits = EventRecorder::new();
    let listeners = |label: &str| -> Option<ObjectListeners> {
        Some(vec![(EventName::from("videoDisabled"), hits.callback(label))])
    };
    let subscribe = |stream_id: &'static str, label: &'static str| {
        let stream = TestStream::camera(stream_id).build();
        let listeners = listeners(label);
        let gateway = call.acc.gateway();
        async move {
            gateway
                .subscribe(
                    &stream,
                    &Container::new("#cameraSubscriberContainer"),
                    &MediaProperties::default(),
                    listeners,
                )
                .await
                .unwrap()
        }
    };
    let cam_a = subscribe("cam-a", "cam-a").await;
    let cam_b = subscribe("cam-b", "cam-b").await;
    let video_disabled = |source_id: &str| SessionEvent::Media {
        source_id: source_id.to_string(),
        name: "videoDisabled".to_string(),
        payload: serde_json::Value::Null,
    };

    call.sdk.emit(video_disabled(cam_a.id.as_str()));
    assert_eq!(hits.count("cam-a"), 1);
    assert_eq!(hits.count("cam-b"), 0);

    call.acc.unsubscribe(&cam_a).await;
    call.sdk.emit(video_disabled(cam_a.id.as_str()));
    call.sdk.emit(video_disabled(cam_b.id.as_str()));

    assert_eq!(hits.count("cam-a"), 1);
    assert_eq!(hits.count("cam-b"), 1);
    assert_eq!(call.acc.gateway().bound_objects(), 1);
}
