//! The accelerator facade.
//!
//! [`VideoAccelerator`] is what a host application constructs: one per
//! session. It owns the event bus, the gateway and the call orchestrator
//! and forwards host calls to them.

use crate::communication::{Communication, CommunicationOptions, JoinResult};
use crate::config::DEFAULT_APPLICATION_NAME;
use crate::containers::StreamContainers;
use crate::credential::Credential;
use crate::errors::Result;
use crate::events::{AcceleratorEvent, Callback, EventBus, EventData, EventName};
use crate::gateway::SessionGateway;
use crate::registry::StateSnapshot;
use common::sdk::{SessionEventKind, Subscriber, VideoSdk};
use common::types::{Connection, MediaProperties, Stream, StreamId};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Options for [`VideoAccelerator::new`].
#[derive(Clone)]
pub struct AcceleratorOptions {
    pub credentials: Credential,
    pub communication: CommunicationOptions,
    /// Render target resolver; `#<type><Role>Container` selectors if unset.
    pub stream_containers: Option<Arc<dyn StreamContainers>>,
    pub application_name: String,
}

impl AcceleratorOptions {
    pub fn new(credentials: Credential) -> Self {
        Self {
            credentials,
            communication: CommunicationOptions::default(),
            stream_containers: None,
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
        }
    }
}

impl fmt::Debug for AcceleratorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcceleratorOptions")
            .field("credentials", &self.credentials)
            .field("communication", &self.communication)
            .field("custom_containers", &self.stream_containers.is_some())
            .field("application_name", &self.application_name)
            .finish()
    }
}

/// Video call accelerator for one session.
pub struct VideoAccelerator {
    application_name: String,
    events: EventBus,
    gateway: SessionGateway,
    communication: Arc<Communication>,
}

impl fmt::Debug for VideoAccelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoAccelerator")
            .field("application_name", &self.application_name)
            .field("gateway", &self.gateway)
            .field("communication", &self.communication)
            .finish_non_exhaustive()
    }
}

impl VideoAccelerator {
    /// Build an accelerator around `sdk`. Nothing is sent to the SDK until
    /// [`connect`](Self::connect).
    pub fn new(options: AcceleratorOptions, sdk: Arc<dyn VideoSdk>) -> Result<Self> {
        let events = EventBus::new();
        events.register_events(AcceleratorEvent::ALL);
        events.register_events(SessionEventKind::ALL);

        let gateway = SessionGateway::new(options.credentials, sdk, events.clone());

        let mut builder = Communication::builder()
            .events(events.clone())
            .gateway(gateway.clone())
            .options(options.communication);
        if let Some(containers) = options.stream_containers {
            builder = builder.containers(containers);
        }
        let communication = builder.build()?;

        info!(
            target: "acc.accelerator",
            application = %options.application_name,
            session_id = %gateway.session_id(),
            "Accelerator initialized"
        );

        Ok(Self {
            application_name: options.application_name,
            events,
            gateway,
            communication,
        })
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn gateway(&self) -> &SessionGateway {
        &self.gateway
    }

    pub fn communication(&self) -> &Arc<Communication> {
        &self.communication
    }

    /// Connect to the session. Raises `connected` with the state snapshot.
    #[instrument(skip_all)]
    pub async fn connect(&self) -> Result<StateSnapshot> {
        self.gateway.connect().await?;
        let snapshot = self.gateway.state_snapshot();
        self.events
            .trigger_event(AcceleratorEvent::Connected, &EventData::State(snapshot.clone()));
        Ok(snapshot)
    }

    /// Leave the session and clear all state. Raises `disconnected`.
    pub fn disconnect(&self) {
        if self.communication.is_active() {
            warn!(target: "acc.accelerator", "Disconnecting during an active call");
        }
        self.gateway.disconnect();
        self.events
            .trigger_event(AcceleratorEvent::Disconnected, &EventData::Empty);
    }

    /// Start the call.
    pub async fn join(&self, properties: Option<&MediaProperties>) -> Result<JoinResult> {
        self.communication.start_call(properties).await
    }

    /// End the call.
    pub async fn leave(&self) {
        self.communication.end_call().await;
    }

    pub async fn subscribe(
        &self,
        stream: &Stream,
        properties: Option<&MediaProperties>,
        network_test: bool,
    ) -> Result<Subscriber> {
        self.communication
            .subscribe(stream, properties, network_test)
            .await
    }

    pub async fn unsubscribe(&self, subscriber: &Subscriber) {
        self.communication.unsubscribe(subscriber).await;
    }

    pub async fn force_disconnect(&self, connection: &Connection) -> Result<()> {
        self.gateway.force_disconnect(connection).await
    }

    pub async fn force_unpublish(&self, stream: &Stream) -> Result<()> {
        self.gateway.force_unpublish(stream).await
    }

    /// Send a signal; `to: None` broadcasts to the session.
    pub async fn signal(
        &self,
        signal_type: &str,
        data: &serde_json::Value,
        to: Option<&Connection>,
    ) -> Result<()> {
        self.gateway.signal(signal_type, data, to).await
    }

    /// Current registry snapshot.
    pub fn state(&self) -> StateSnapshot {
        self.gateway.state_snapshot()
    }

    pub fn is_me(&self, connection: &Connection) -> bool {
        self.gateway.is_me(connection)
    }

    pub fn on(&self, event: impl Into<EventName>, callback: Callback) {
        self.events.on(event, callback);
    }

    pub fn on_many<I, E>(&self, listeners: I)
    where
        I: IntoIterator<Item = (E, Callback)>,
        E: Into<EventName>,
    {
        self.events.on_many(listeners);
    }

    pub fn off(&self, event: impl Into<EventName>, callback: &Callback) {
        self.events.off(event, callback);
    }

    /// Remove every callback of one event.
    pub fn off_event(&self, event: impl Into<EventName>) {
        self.events.off_event(event);
    }

    /// Remove every callback of every event.
    pub fn off_all(&self) {
        self.events.off_all();
    }

    pub fn register_events<I, E>(&self, events: I)
    where
        I: IntoIterator<Item = E>,
        E: Into<EventName>,
    {
        self.events.register_events(events);
    }

    pub fn trigger_event(&self, event: impl Into<EventName>, data: &EventData) -> usize {
        self.events.trigger_event(event, data)
    }

    /// Toggle audio on the local camera.
    pub fn toggle_local_audio(&self, enabled: bool) -> Result<()> {
        self.gateway.enable_publisher_audio(enabled)
    }

    /// Toggle video on the local camera.
    pub fn toggle_local_video(&self, enabled: bool) -> Result<()> {
        self.gateway.enable_publisher_video(enabled)
    }

    /// Toggle audio of the subscriber for `stream_id`.
    pub fn toggle_remote_audio(&self, stream_id: &StreamId, enabled: bool) -> Result<()> {
        self.gateway.enable_subscriber_audio(stream_id, enabled)
    }

    /// Toggle video of the subscriber for `stream_id`.
    pub fn toggle_remote_video(&self, stream_id: &StreamId, enabled: bool) -> Result<()> {
        self.gateway.enable_subscriber_video(stream_id, enabled)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::errors::AcceleratorError;
    use crate::events::EventRecorder;
    use accelerator_test_utils::{MediaTarget, MockSdk, TestCredentials, TestStream};
    use common::sdk::{MediaTrack, SessionEvent};

    fn accelerator(sdk: &Arc<MockSdk>) -> VideoAccelerator {
        let creds = TestCredentials::new();
        let options = AcceleratorOptions::new(
            Credential::new(creds.api_key, creds.session_id, creds.token).unwrap(),
        );
        VideoAccelerator::new(options, Arc::clone(sdk) as Arc<dyn VideoSdk>).unwrap()
    }

    #[test]
    fn test_known_vocabulary_is_registered() {
        let sdk = Arc::new(MockSdk::default());
        let acc = accelerator(&sdk);

        for event in AcceleratorEvent::ALL {
            assert!(acc.events().is_registered(event));
        }
        for kind in SessionEventKind::ALL {
            assert!(acc.events().is_registered(kind));
        }
        assert_eq!(acc.application_name(), DEFAULT_APPLICATION_NAME);
    }

    #[tokio::test]
    async fn test_connect_and_disconnect_raise_events() {
        let sdk = Arc::new(MockSdk::default());
        let acc = accelerator(&sdk);
        let recorder = EventRecorder::new();
        recorder.attach(
            acc.events(),
            [AcceleratorEvent::Connected, AcceleratorEvent::Disconnected],
        );

        let snapshot = acc.connect().await.unwrap();
        assert!(snapshot.connected);
        assert!(matches!(
            recorder.last("connected"),
            Some(EventData::State(s)) if s.connected
        ));

        sdk.emit(SessionEvent::StreamCreated(TestStream::camera("s-1").build()));
        assert_eq!(acc.state().streams.len(), 1);

        acc.disconnect();
        assert!(!acc.state().connected);
        assert!(acc.state().streams.is_empty());
        assert_eq!(recorder.names(), vec!["connected", "disconnected"]);
    }

    #[tokio::test]
    async fn test_connect_failure_is_propagated() {
        let sdk = Arc::new(MockSdk::builder().fail_connect(1004, "Authentication error").build());
        let acc = accelerator(&sdk);
        let recorder = EventRecorder::new();
        recorder.attach(acc.events(), [AcceleratorEvent::Connected]);

        let err = acc.connect().await.unwrap_err();

        assert_eq!(err.error_name(), "sdkError");
        assert_eq!(recorder.count("connected"), 0);
    }

    #[tokio::test]
    async fn test_operations_require_a_connection() {
        let sdk = Arc::new(MockSdk::default());
        let acc = accelerator(&sdk);

        let err = acc
            .signal("note", &serde_json::json!({"x": 1}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AcceleratorError::NotConnected(_)));

        let err = acc
            .subscribe(&TestStream::camera("s-1").build(), None, false)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to subscribe to a stream when not connected to a session"
        );
        assert!(sdk.subscribe_calls().is_empty());
    }

    #[tokio::test]
    async fn test_toggles_reach_the_sdk() {
        let sdk = Arc::new(MockSdk::default());
        let acc = accelerator(&sdk);
        acc.connect().await.unwrap();
        sdk.emit(SessionEvent::StreamCreated(TestStream::camera("s-1").build()));
        let result = acc.join(None).await.unwrap();
        let publisher = result.publisher.unwrap();

        acc.toggle_local_audio(false).unwrap();
        acc.toggle_remote_video(&StreamId::new("s-1"), false).unwrap();
        let missing = acc.toggle_remote_audio(&StreamId::new("nope"), true);

        assert!(matches!(missing, Err(AcceleratorError::NotFound(_))));
        let calls = sdk.media_calls();
        assert_eq!(calls.len(), 2);
        let first = calls.first().unwrap();
        assert_eq!(first.target, MediaTarget::Publisher(publisher.id));
        assert_eq!(first.track, MediaTrack::Audio);
        assert!(!first.enabled);
    }

    #[tokio::test]
    async fn test_moderation_calls_forward() {
        let sdk = Arc::new(MockSdk::default());
        let acc = accelerator(&sdk);
        acc.connect().await.unwrap();
        let stream = TestStream::camera("s-1").from_connection("conn-9").build();

        acc.force_unpublish(&stream).await.unwrap();
        acc.force_disconnect(&stream.connection).await.unwrap();

        assert_eq!(sdk.forced_unpublishes(), vec![stream.stream_id.clone()]);
        assert_eq!(sdk.forced_disconnects(), vec![stream.connection.clone()]);
        assert!(!acc.is_me(&stream.connection));
        assert!(acc.is_me(&sdk.own_connection()));
    }
}
