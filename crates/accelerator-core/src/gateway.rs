//! Session gateway.
//!
//! Wraps the video SDK session: every SDK call made by the accelerator goes
//! through here, and every SDK notification is relayed from here into the
//! registry and then onto the event bus.
//!
//! # Ordering
//!
//! - A relayed notification mutates the registry before any callback sees it.
//! - Publishers and subscribers are recorded only after the SDK confirms them.
//! - `unsubscribe` drops registry state before the SDK call; SDK errors are
//!   logged and swallowed.
//! - Operations that need a connection fail with `NotConnected` before
//!   reaching the SDK.
//!
//! # Per-object listeners
//!
//! Listeners handed to `publish`/`subscribe` are bound to that one object:
//! they only see object-level events (`SessionEvent::Media`) whose source
//! is the object, and they are removed when the object is unpublished,
//! unsubscribed or replaced.

use crate::credential::Credential;
use crate::errors::{AcceleratorError, Result};
use crate::events::{Callback, EventBus, EventData, EventName};
use crate::observability::metrics;
use crate::registry::{PubSubDetail, State, StateSnapshot};
use common::sdk::{
    MediaTrack, OutboundSignal, Publisher, SessionEvent, SessionEventSink, Subscriber, VideoSdk,
};
use common::secret::ExposeSecret;
use common::types::{
    Connection, Container, MediaProperties, PublisherId, Stream, StreamId, StreamType,
    SubscriberId,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

/// Per-object listeners bound when a publisher or subscriber is created.
pub type ObjectListeners = Vec<(EventName, Callback)>;

fn lock_state(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Listeners currently bound, keyed by publisher or subscriber id.
type BoundListeners = HashMap<String, ObjectListeners>;

fn lock_bound(bound: &Mutex<BoundListeners>) -> MutexGuard<'_, BoundListeners> {
    bound.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Remove every listener bound to `object_id` from `events`.
fn unbind_listeners(bound: &Mutex<BoundListeners>, events: &EventBus, object_id: &str) {
    let removed = lock_bound(bound).remove(object_id);
    for (event, callback) in removed.into_iter().flatten() {
        events.off(event, &callback);
    }
}

/// Gateway to one SDK session. Clones share the session and registry.
#[derive(Clone)]
pub struct SessionGateway {
    sdk: Arc<dyn VideoSdk>,
    state: Arc<Mutex<State>>,
    events: EventBus,
    bound: Arc<Mutex<BoundListeners>>,
}

impl fmt::Debug for SessionGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionGateway")
            .field("state", &*lock_state(&self.state))
            .finish_non_exhaustive()
    }
}

impl SessionGateway {
    pub fn new(credentials: Credential, sdk: Arc<dyn VideoSdk>, events: EventBus) -> Self {
        Self {
            sdk,
            state: Arc::new(Mutex::new(State::new(credentials))),
            events,
            bound: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn bound(&self) -> MutexGuard<'_, BoundListeners> {
        lock_bound(&self.bound)
    }

    /// Register `listeners` for the object `object_id`. Each callback only
    /// runs for object-level events raised by that object.
    fn bind_listeners(&self, object_id: &str, listeners: ObjectListeners) {
        let scoped: ObjectListeners = listeners
            .into_iter()
            .map(|(event, callback)| {
                let source = object_id.to_string();
                let scoped: Callback = Arc::new(move |data: &EventData| {
                    if let EventData::Session(SessionEvent::Media { source_id, .. }) = data {
                        if *source_id == source {
                            callback(data);
                        }
                    }
                });
                (event, scoped)
            })
            .collect();

        for (event, callback) in &scoped {
            self.events.on(event, Arc::clone(callback));
        }
        debug!(target: "acc.gateway", object_id = %object_id, listeners = scoped.len(), "Object listeners bound");
        self.bound()
            .entry(object_id.to_string())
            .or_default()
            .extend(scoped);
    }

    fn unbind_listeners(&self, object_id: &str) {
        unbind_listeners(&self.bound, &self.events, object_id);
    }

    /// Number of objects that currently have listeners bound.
    pub fn bound_objects(&self) -> usize {
        self.bound().len()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock_state(&self.state)
    }

    /// Read the registry under its lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&State) -> R) -> R {
        f(&self.state())
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn sdk(&self) -> &Arc<dyn VideoSdk> {
        &self.sdk
    }

    pub fn session_id(&self) -> String {
        self.state().credentials().session_id().to_string()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    fn ensure_connected(&self, message: &str) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(AcceleratorError::NotConnected(message.to_string()))
        }
    }

    fn relay_sink(&self) -> SessionEventSink {
        let state = Arc::clone(&self.state);
        let bound = Arc::clone(&self.bound);
        let events = self.events.clone();
        Arc::new(move |event: SessionEvent| {
            let mut dropped = None;
            {
                let mut state = lock_state(&state);
                match &event {
                    SessionEvent::StreamCreated(stream) => state.add_stream(stream.clone()),
                    SessionEvent::StreamDestroyed(stream) => {
                        dropped = state.remove_stream(&stream.stream_id);
                        metrics::set_subscribers_active(state.subscribers().total());
                    }
                    SessionEvent::SessionConnected | SessionEvent::SessionReconnected => {
                        state.set_connected(true);
                    }
                    SessionEvent::SessionDisconnected { reason } => {
                        info!(target: "acc.gateway", reason = %reason, "Session disconnected");
                        state.set_connected(false);
                    }
                    _ => {}
                }
            }
            if let Some(subscriber) = dropped {
                unbind_listeners(&bound, &events, subscriber.id.as_str());
            }

            let name = event.name().to_string();
            let signal_name = match &event {
                SessionEvent::Signal(signal) => signal
                    .signal_type
                    .as_ref()
                    .map(|signal_type| format!("signal:{signal_type}")),
                _ => None,
            };
            let data = EventData::Session(event);
            if let Some(signal_name) = signal_name {
                events.trigger_event(signal_name, &data);
            }
            events.trigger_event(name, &data);
        })
    }

    /// Connect to the session and start relaying its events.
    ///
    /// Any previously installed relay is replaced. There is no retry.
    #[instrument(skip_all, fields(session_id = %self.session_id()))]
    pub async fn connect(&self) -> Result<()> {
        let token = self.state().credentials().token().clone();
        if token.expose_secret().is_empty() {
            return Err(AcceleratorError::Configuration(
                "Token not provided".to_string(),
            ));
        }

        self.sdk.set_event_sink(None);
        self.sdk.set_event_sink(Some(self.relay_sink()));

        match self.sdk.connect(token.expose_secret()).await {
            Ok(()) => {
                self.state().set_connected(true);
                info!(target: "acc.gateway", "Connected to session");
                Ok(())
            }
            Err(e) => {
                warn!(target: "acc.gateway", error = %e, "Failed to connect to session");
                Err(e.into())
            }
        }
    }

    /// Leave the session and clear the registry.
    pub fn disconnect(&self) {
        self.sdk.disconnect();
        {
            let mut state = self.state();
            state.reset();
            state.set_connected(false);
        }
        let objects: Vec<String> = self.bound().keys().cloned().collect();
        for object_id in objects {
            self.unbind_listeners(&object_id);
        }
        metrics::set_subscribers_active(0);
        info!(target: "acc.gateway", "Disconnected from session");
    }

    /// Create a publisher and, unless `preview`, publish it.
    ///
    /// `listeners` are registered once the publisher exists.
    #[instrument(skip_all, fields(container = %container.as_str(), preview = preview))]
    pub async fn publish(
        &self,
        container: &Container,
        properties: &MediaProperties,
        listeners: Option<ObjectListeners>,
        preview: bool,
    ) -> Result<Publisher> {
        if !preview {
            self.ensure_connected("Unable to publish without an active connection to a session")?;
        }

        let publisher = self.sdk.init_publisher(container, properties).await?;
        if let Some(listeners) = listeners {
            self.bind_listeners(publisher.id.as_str(), listeners);
        }

        if preview {
            debug!(target: "acc.gateway", publisher_id = %publisher.id, "Publisher preview created");
            return Ok(publisher);
        }
        let publisher_id = publisher.id.clone();
        self.publish_preview(publisher).await.inspect_err(|_| {
            self.unbind_listeners(publisher_id.as_str());
        })
    }

    /// Publish a publisher created earlier as a preview.
    #[instrument(skip_all, fields(publisher_id = %publisher.id))]
    pub async fn publish_preview(&self, publisher: Publisher) -> Result<Publisher> {
        self.ensure_connected("Unable to publish without an active connection to a session")?;

        let published = self.sdk.publish(publisher).await?;
        let stream_type = published.stream_type();
        self.state().add_publisher(stream_type, published.clone());
        debug!(target: "acc.gateway", publisher_id = %published.id, stream_type = %stream_type, "Published");
        Ok(published)
    }

    /// Stop publishing. The publisher leaves the registry even if the SDK
    /// no longer knows it.
    pub fn unpublish(&self, publisher: &Publisher) {
        self.sdk.unpublish(publisher);
        self.state()
            .remove_publisher(publisher.stream_type(), &publisher.id);
        self.unbind_listeners(publisher.id.as_str());
        debug!(target: "acc.gateway", publisher_id = %publisher.id, "Unpublished");
    }

    #[instrument(skip_all, fields(stream_id = %stream.stream_id))]
    pub async fn subscribe(
        &self,
        stream: &Stream,
        container: &Container,
        properties: &MediaProperties,
        listeners: Option<ObjectListeners>,
    ) -> Result<Subscriber> {
        self.ensure_connected("Unable to subscribe to a stream when not connected to a session")?;

        let subscriber = self.sdk.subscribe(stream, container, properties).await?;
        let displaced = {
            let mut state = self.state();
            let displaced = state.add_subscriber(subscriber.clone());
            metrics::set_subscribers_active(state.subscribers().total());
            displaced
        };
        if let Some(listeners) = listeners {
            self.bind_listeners(subscriber.id.as_str(), listeners);
        }
        debug!(target: "acc.gateway", subscriber_id = %subscriber.id, "Subscribed");

        if let Some(displaced) = displaced {
            warn!(
                target: "acc.gateway",
                subscriber_id = %displaced.id,
                replaced_by = %subscriber.id,
                "Stream already had a subscriber, releasing the old one"
            );
            self.unbind_listeners(displaced.id.as_str());
            if let Err(e) = self.sdk.unsubscribe(&displaced).await {
                debug!(target: "acc.gateway", error = %e, "SDK unsubscribe of replaced subscriber failed");
            }
        }
        Ok(subscriber)
    }

    /// Drop a subscriber. Always succeeds.
    #[instrument(skip_all, fields(subscriber_id = %subscriber.id))]
    pub async fn unsubscribe(&self, subscriber: &Subscriber) {
        {
            let mut state = self.state();
            state.remove_subscriber(&subscriber.id);
            metrics::set_subscribers_active(state.subscribers().total());
        }
        self.unbind_listeners(subscriber.id.as_str());
        if let Err(e) = self.sdk.unsubscribe(subscriber).await {
            debug!(target: "acc.gateway", error = %e, "SDK unsubscribe failed, registry already updated");
        }
    }

    #[instrument(skip_all, fields(connection_id = %connection.connection_id))]
    pub async fn force_disconnect(&self, connection: &Connection) -> Result<()> {
        self.ensure_connected("Unable to force disconnect when not connected to a session")?;
        self.sdk.force_disconnect(connection).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(stream_id = %stream.stream_id))]
    pub async fn force_unpublish(&self, stream: &Stream) -> Result<()> {
        self.ensure_connected("Unable to force unpublish when not connected to a session")?;
        self.sdk.force_unpublish(stream).await?;
        Ok(())
    }

    /// Send a signal; `data` is JSON-encoded. `to: None` broadcasts.
    #[instrument(skip_all, fields(signal_type = %signal_type))]
    pub async fn signal(
        &self,
        signal_type: &str,
        data: &serde_json::Value,
        to: Option<&Connection>,
    ) -> Result<()> {
        self.ensure_connected("Unable to send a signal when not connected to a session")?;
        self.sdk
            .signal(OutboundSignal {
                signal_type: signal_type.to_string(),
                data: data.to_string(),
                to: to.cloned(),
            })
            .await?;
        Ok(())
    }

    /// Whether `connection` is our own.
    pub fn is_me(&self, connection: &Connection) -> bool {
        self.sdk
            .connection()
            .is_some_and(|own| own.connection_id == connection.connection_id)
    }

    pub fn pub_sub(&self) -> PubSubDetail {
        self.state().pub_sub()
    }

    pub fn state_snapshot(&self) -> StateSnapshot {
        self.state().all()
    }

    pub fn streams(&self) -> Vec<Stream> {
        self.state().streams().values().cloned().collect()
    }

    pub fn subscriber_for_stream(&self, stream_id: &StreamId) -> Option<Subscriber> {
        self.state().get_subscriber(stream_id).cloned()
    }

    pub fn publisher_for_stream(&self, stream_id: &StreamId) -> Option<Publisher> {
        self.state().get_publisher(stream_id).cloned()
    }

    pub fn publishers(&self, stream_type: StreamType) -> Vec<Publisher> {
        self.state().get_publishers(stream_type).cloned().collect()
    }

    pub fn subscribers(&self, stream_type: StreamType) -> Vec<Subscriber> {
        self.state().get_subscribers(stream_type).cloned().collect()
    }

    fn set_camera_publishers(&self, track: MediaTrack, enabled: bool) -> Result<()> {
        for publisher in self.publishers(StreamType::Camera) {
            self.sdk.set_publisher_media(&publisher.id, track, enabled)?;
        }
        Ok(())
    }

    /// Toggle audio on every camera publisher.
    pub fn enable_publisher_audio(&self, enabled: bool) -> Result<()> {
        self.set_camera_publishers(MediaTrack::Audio, enabled)
    }

    /// Toggle video on every camera publisher.
    pub fn enable_publisher_video(&self, enabled: bool) -> Result<()> {
        self.set_camera_publishers(MediaTrack::Video, enabled)
    }

    fn set_stream_subscriber(
        &self,
        stream_id: &StreamId,
        track: MediaTrack,
        enabled: bool,
    ) -> Result<()> {
        let subscriber = self.subscriber_for_stream(stream_id).ok_or_else(|| {
            AcceleratorError::NotFound(format!("No subscriber for stream {stream_id}"))
        })?;
        self.sdk.set_subscriber_media(&subscriber.id, track, enabled)?;
        Ok(())
    }

    pub fn enable_subscriber_audio(&self, stream_id: &StreamId, enabled: bool) -> Result<()> {
        self.set_stream_subscriber(stream_id, MediaTrack::Audio, enabled)
    }

    pub fn enable_subscriber_video(&self, stream_id: &StreamId, enabled: bool) -> Result<()> {
        self.set_stream_subscriber(stream_id, MediaTrack::Video, enabled)
    }

    pub fn set_publisher_media(
        &self,
        publisher_id: &PublisherId,
        track: MediaTrack,
        enabled: bool,
    ) -> Result<()> {
        self.sdk.set_publisher_media(publisher_id, track, enabled)?;
        Ok(())
    }

    pub fn set_subscriber_media(
        &self,
        subscriber_id: &SubscriberId,
        track: MediaTrack,
        enabled: bool,
    ) -> Result<()> {
        self.sdk.set_subscriber_media(subscriber_id, track, enabled)?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::events::EventRecorder;
    use accelerator_test_utils::{MediaTarget, MockSdk, TestCredentials, TestStream};
    use common::sdk::{SessionEventKind, Signal};
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    fn gateway_with(sdk: Arc<MockSdk>) -> SessionGateway {
        let creds = TestCredentials::new();
        let credential = Credential::new(creds.api_key, creds.session_id, creds.token).unwrap();
        SessionGateway::new(credential, sdk, EventBus::new())
    }

    async fn connected(sdk: Arc<MockSdk>) -> SessionGateway {
        let gateway = gateway_with(sdk);
        gateway.connect().await.unwrap();
        gateway
    }

    fn container() -> Container {
        Container::new("#cameraSubscriberContainer")
    }

    #[tokio::test]
    async fn test_connect_installs_relay_and_sets_connected() {
        let sdk = Arc::new(MockSdk::builder().emit_session_connected().build());
        let gateway = gateway_with(Arc::clone(&sdk));
        let recorder = EventRecorder::new();
        recorder.attach(gateway.events(), [SessionEventKind::SessionConnected]);

        gateway.connect().await.unwrap();

        assert!(gateway.is_connected());
        assert!(sdk.has_event_sink());
        assert_eq!(sdk.connect_tokens().len(), 1);
        assert_eq!(recorder.count("sessionConnected"), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_stays_disconnected() {
        let sdk = Arc::new(MockSdk::builder().fail_connect(1004, "Invalid token").build());
        let gateway = gateway_with(sdk);

        let err = gateway.connect().await.unwrap_err();

        assert_eq!(err.error_name(), "sdkError");
        assert!(!gateway.is_connected());
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let sdk = Arc::new(MockSdk::default());
        let gateway = gateway_with(Arc::clone(&sdk));
        let stream = TestStream::camera("s-1").build();

        let publish = gateway
            .publish(&container(), &MediaProperties::default(), None, false)
            .await;
        let subscribe = gateway
            .subscribe(&stream, &container(), &MediaProperties::default(), None)
            .await;
        let signal = gateway
            .signal("chat", &serde_json::json!("hi"), None)
            .await;

        assert!(matches!(publish, Err(AcceleratorError::NotConnected(_))));
        assert!(matches!(subscribe, Err(AcceleratorError::NotConnected(_))));
        assert!(matches!(signal, Err(AcceleratorError::NotConnected(_))));
        assert!(sdk.init_publisher_calls().is_empty());
        assert!(sdk.subscribe_calls().is_empty());
        assert!(sdk.sent_signals().is_empty());
    }

    #[tokio::test]
    async fn test_preview_does_not_require_connection_or_record() {
        let sdk = Arc::new(MockSdk::default());
        let gateway = gateway_with(Arc::clone(&sdk));

        let preview = gateway
            .publish(&container(), &MediaProperties::default(), None, true)
            .await
            .unwrap();

        assert!(preview.stream.is_none());
        assert!(sdk.published().is_empty());
        assert_eq!(gateway.pub_sub().meta.publisher.total, 0);
    }

    #[tokio::test]
    async fn test_failed_subscribe_is_not_recorded() {
        let sdk = Arc::new(
            MockSdk::builder()
                .fail_subscribe_for("s-1", 1500, "subscribe failed")
                .build(),
        );
        let gateway = connected(sdk).await;
        let stream = TestStream::camera("s-1").build();

        let err = gateway
            .subscribe(&stream, &container(), &MediaProperties::default(), None)
            .await
            .unwrap_err();

        assert_eq!(err.client_message(), "subscribe failed");
        assert!(gateway.subscriber_for_stream(&stream.stream_id).is_none());
        assert!(gateway.state_snapshot().stream_map.is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_updates_registry_before_sdk_completes() {
        let gate = Arc::new(Notify::new());
        let sdk = Arc::new(
            MockSdk::builder()
                .hold_unsubscribe(Arc::clone(&gate))
                .fail_unsubscribe(1500, "already gone")
                .build(),
        );
        let gateway = connected(Arc::clone(&sdk)).await;
        let stream = TestStream::camera("s-1").build();
        let subscriber = gateway
            .subscribe(&stream, &container(), &MediaProperties::default(), None)
            .await
            .unwrap();

        let task_gateway = gateway.clone();
        let task = tokio::spawn(async move { task_gateway.unsubscribe(&subscriber).await });
        tokio::task::yield_now().await;

        assert!(gateway.subscriber_for_stream(&stream.stream_id).is_none());
        assert!(sdk.unsubscribed().is_empty());

        gate.notify_one();
        task.await.unwrap();
        assert_eq!(sdk.unsubscribed().len(), 1);
    }

    #[tokio::test]
    async fn test_stream_destroyed_updates_registry_before_event() {
        let sdk = Arc::new(MockSdk::default());
        let gateway = connected(Arc::clone(&sdk)).await;
        let stream = TestStream::camera("s-1").build();
        sdk.emit(SessionEvent::StreamCreated(stream.clone()));
        gateway
            .subscribe(&stream, &container(), &MediaProperties::default(), None)
            .await
            .unwrap();

        let saw_clean_state = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&saw_clean_state);
        let observer = gateway.clone();
        let id = stream.stream_id.clone();
        gateway.events().on(
            SessionEventKind::StreamDestroyed,
            Arc::new(move |_: &EventData| {
                let clean = observer.subscriber_for_stream(&id).is_none()
                    && observer.streams().is_empty();
                flag.store(clean, Ordering::SeqCst);
            }),
        );

        sdk.emit(SessionEvent::StreamDestroyed(stream));

        assert!(saw_clean_state.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_typed_signal_is_relayed_twice() {
        let sdk = Arc::new(MockSdk::default());
        let gateway = connected(Arc::clone(&sdk)).await;
        let recorder = EventRecorder::new();
        recorder.attach(gateway.events(), ["signal", "signal:chat"]);

        sdk.emit(SessionEvent::Signal(Signal {
            signal_type: Some("chat".to_string()),
            data: "\"hello\"".to_string(),
            from: None,
        }));

        assert_eq!(
            recorder.names(),
            vec!["signal:chat".to_string(), "signal".to_string()]
        );
    }

    #[tokio::test]
    async fn test_media_events_use_their_own_name() {
        let sdk = Arc::new(MockSdk::default());
        let gateway = connected(Arc::clone(&sdk)).await;
        let recorder = EventRecorder::new();
        let stream = TestStream::camera("s-1").build();
        let listeners: ObjectListeners = vec![(
            EventName::from("videoDisabled"),
            recorder.callback("videoDisabled"),
        )];
        gateway
            .subscribe(
                &stream,
                &container(),
                &MediaProperties::default(),
                Some(listeners),
            )
            .await
            .unwrap();

        sdk.emit(SessionEvent::Media {
            source_id: "subscriber-1".to_string(),
            name: "videoDisabled".to_string(),
            payload: serde_json::json!({"reason": "quality"}),
        });

        assert_eq!(recorder.count("videoDisabled"), 1);
    }

    fn video_disabled(source_id: &str) -> SessionEvent {
        SessionEvent::Media {
            source_id: source_id.to_string(),
            name: "videoDisabled".to_string(),
            payload: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_object_listeners_only_see_their_own_object() {
        let sdk = Arc::new(MockSdk::default());
        let gateway = connected(Arc::clone(&sdk)).await;
        let recorder = EventRecorder::new();
        let first = gateway
            .subscribe(
                &TestStream::camera("s-1").build(),
                &container(),
                &MediaProperties::default(),
                Some(vec![(
                    EventName::from("videoDisabled"),
                    recorder.callback("first"),
                )]),
            )
            .await
            .unwrap();
        let second = gateway
            .subscribe(
                &TestStream::camera("s-2").build(),
                &container(),
                &MediaProperties::default(),
                Some(vec![(
                    EventName::from("videoDisabled"),
                    recorder.callback("second"),
                )]),
            )
            .await
            .unwrap();

        sdk.emit(video_disabled(second.id.as_str()));
        sdk.emit(video_disabled("publisher-elsewhere"));

        assert_eq!(recorder.count("first"), 0);
        assert_eq!(recorder.count("second"), 1);
        assert_eq!(gateway.events().listener_count("videoDisabled"), 2);

        gateway.unsubscribe(&first).await;
        assert_eq!(gateway.events().listener_count("videoDisabled"), 1);
        assert_eq!(gateway.bound_objects(), 1);
    }

    #[tokio::test]
    async fn test_object_listeners_released_with_their_object() {
        let sdk = Arc::new(MockSdk::default());
        let gateway = connected(Arc::clone(&sdk)).await;
        let recorder = EventRecorder::new();
        let listeners = || {
            Some(vec![(
                EventName::from("videoDisabled"),
                recorder.callback("videoDisabled"),
            )])
        };
        let subscriber = gateway
            .subscribe(
                &TestStream::camera("s-1").build(),
                &container(),
                &MediaProperties::default(),
                listeners(),
            )
            .await
            .unwrap();
        let publisher = gateway
            .publish(
                &Container::new("#cameraPublisherContainer"),
                &MediaProperties::default(),
                listeners(),
                false,
            )
            .await
            .unwrap();
        assert_eq!(gateway.bound_objects(), 2);

        gateway.unsubscribe(&subscriber).await;
        gateway.unpublish(&publisher);
        sdk.emit(video_disabled(subscriber.id.as_str()));
        sdk.emit(video_disabled(publisher.id.as_str()));

        assert_eq!(recorder.count("videoDisabled"), 0);
        assert_eq!(gateway.events().listener_count("videoDisabled"), 0);
        assert_eq!(gateway.bound_objects(), 0);
    }

    #[tokio::test]
    async fn test_destroyed_stream_releases_subscriber_listeners() {
        let sdk = Arc::new(MockSdk::default());
        let gateway = connected(Arc::clone(&sdk)).await;
        let recorder = EventRecorder::new();
        let stream = TestStream::camera("s-1").build();
        sdk.emit(SessionEvent::StreamCreated(stream.clone()));
        gateway
            .subscribe(
                &stream,
                &container(),
                &MediaProperties::default(),
                Some(vec![(
                    EventName::from("audioLevelUpdated"),
                    recorder.callback("audioLevelUpdated"),
                )]),
            )
            .await
            .unwrap();

        sdk.emit(SessionEvent::StreamDestroyed(stream));

        assert_eq!(gateway.events().listener_count("audioLevelUpdated"), 0);
        assert_eq!(gateway.bound_objects(), 0);
    }

    #[tokio::test]
    async fn test_resubscribing_a_stream_releases_the_old_subscriber() {
        let sdk = Arc::new(MockSdk::default());
        let gateway = connected(Arc::clone(&sdk)).await;
        let stream = TestStream::camera("s-1").build();

        let old = gateway
            .subscribe(&stream, &container(), &MediaProperties::default(), None)
            .await
            .unwrap();
        let new = gateway
            .subscribe(&stream, &container(), &MediaProperties::default(), None)
            .await
            .unwrap();

        assert_ne!(old.id, new.id);
        assert_eq!(sdk.unsubscribed(), vec![old.id]);
        assert_eq!(gateway.pub_sub().meta.subscriber.total, 1);
        assert_eq!(gateway.subscriber_for_stream(&stream.stream_id), Some(new));
    }

    #[tokio::test]
    async fn test_signal_json_encodes_data() {
        let sdk = Arc::new(MockSdk::default());
        let gateway = connected(Arc::clone(&sdk)).await;
        let to = Connection::new("remote", "");

        gateway
            .signal("poll", &serde_json::json!({"answer": 42}), Some(&to))
            .await
            .unwrap();

        let sent = sdk.sent_signals();
        assert_eq!(sent.len(), 1);
        let signal = sent.first().unwrap();
        assert_eq!(signal.data, r#"{"answer":42}"#);
        assert_eq!(signal.to.as_ref().unwrap().connection_id.as_str(), "remote");
    }

    #[tokio::test]
    async fn test_disconnect_resets_registry() {
        let sdk = Arc::new(MockSdk::default());
        let gateway = connected(Arc::clone(&sdk)).await;
        let stream = TestStream::camera("s-1").build();
        sdk.emit(SessionEvent::StreamCreated(stream.clone()));
        gateway
            .subscribe(&stream, &container(), &MediaProperties::default(), None)
            .await
            .unwrap();

        gateway.disconnect();

        let snapshot = gateway.state_snapshot();
        assert!(!snapshot.connected);
        assert!(snapshot.streams.is_empty());
        assert_eq!(snapshot.pub_sub.meta.subscriber.total, 0);
        assert_eq!(sdk.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_subscriber_toggle_lookup() {
        let sdk = Arc::new(MockSdk::default());
        let gateway = connected(Arc::clone(&sdk)).await;
        let stream = TestStream::camera("s-1").build();
        let subscriber = gateway
            .subscribe(&stream, &container(), &MediaProperties::default(), None)
            .await
            .unwrap();

        gateway
            .enable_subscriber_audio(&stream.stream_id, false)
            .unwrap();
        let missing = gateway.enable_subscriber_video(&StreamId::new("nope"), false);

        assert!(matches!(missing, Err(AcceleratorError::NotFound(_))));
        assert_eq!(
            sdk.media_calls().first().unwrap().target,
            MediaTarget::Subscriber(subscriber.id)
        );
    }

    #[tokio::test]
    async fn test_is_me() {
        let sdk = Arc::new(MockSdk::builder().connection_id("me").build());
        let gateway = connected(sdk).await;

        assert!(gateway.is_me(&Connection::new("me", "")));
        assert!(!gateway.is_me(&Connection::new("you", "")));
    }
}
