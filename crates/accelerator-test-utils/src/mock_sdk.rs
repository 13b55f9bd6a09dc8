//! Mock video SDK for accelerator testing.
//!
//! Provides an in-memory `VideoSdk` that can be configured to:
//! - Fail any operation with a specific SDK error
//! - Fail subscribing to selected streams only
//! - Hold `subscribe` or `unsubscribe` open until the test releases it
//! - Echo outbound signals back through the event sink
//!
//! Every call is recorded so tests can assert on what the accelerator asked
//! the SDK to do. Session events are injected with [`MockSdk::emit`].
//!
//! # Example
//!
//! ```rust,ignore
//! use accelerator_test_utils::MockSdk;
//!
//! let sdk = MockSdk::builder()
//!     .connection_id("me")
//!     .fail_subscribe_for("stream-2", 1500, "subscribe failed")
//!     .build();
//!
//! // Hand Arc<MockSdk> to the accelerator, then:
//! assert_eq!(sdk.subscribe_calls().len(), 0);
//! ```

use async_trait::async_trait;
use common::error::{Result, SdkError};
use common::sdk::{
    MediaTrack, OutboundSignal, Publisher, SessionEvent, SessionEventSink, Signal, Subscriber,
    VideoSdk,
};
use common::types::{
    Connection, Container, MediaProperties, PublisherId, Stream, StreamId, SubscriberId,
    VideoType,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// A subscribe request as seen by the SDK.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeCall {
    pub stream_id: StreamId,
    pub container: Container,
    pub properties: MediaProperties,
}

/// A publisher creation request as seen by the SDK.
#[derive(Debug, Clone, PartialEq)]
pub struct InitPublisherCall {
    pub container: Container,
    pub properties: MediaProperties,
}

/// Target of a media toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaTarget {
    Publisher(PublisherId),
    Subscriber(SubscriberId),
}

/// A media toggle as seen by the SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCall {
    pub target: MediaTarget,
    pub track: MediaTrack,
    pub enabled: bool,
}

#[derive(Debug, Default)]
struct CallLog {
    tokens: Vec<String>,
    init_publisher: Vec<InitPublisherCall>,
    published: Vec<PublisherId>,
    unpublished: Vec<PublisherId>,
    subscribe: Vec<SubscribeCall>,
    unsubscribed: Vec<SubscriberId>,
    signals: Vec<OutboundSignal>,
    forced_disconnects: Vec<Connection>,
    forced_unpublishes: Vec<StreamId>,
    media: Vec<MediaCall>,
}

#[derive(Debug, Default, Clone)]
struct FailureScript {
    connect: Option<SdkError>,
    init_publisher: Option<SdkError>,
    publish: Option<SdkError>,
    subscribe_all: Option<SdkError>,
    subscribe: HashMap<StreamId, SdkError>,
    unsubscribe: Option<SdkError>,
    signal: Option<SdkError>,
    moderation: Option<SdkError>,
}

/// Mock video SDK session.
pub struct MockSdk {
    connection: Connection,
    connected: AtomicBool,
    sink: Mutex<Option<SessionEventSink>>,
    failures: FailureScript,
    emit_session_connected: bool,
    echo_signals: bool,
    subscribe_gate: Option<Arc<Notify>>,
    unsubscribe_gate: Option<Arc<Notify>>,
    next_id: AtomicUsize,
    disconnect_count: AtomicUsize,
    log: Mutex<CallLog>,
}

impl Default for MockSdk {
    fn default() -> Self {
        MockSdkBuilder::default().build()
    }
}

impl MockSdk {
    /// Create a new MockSdk builder.
    #[must_use]
    pub fn builder() -> MockSdkBuilder {
        MockSdkBuilder::default()
    }

    /// Deliver a session event to the installed sink, if any.
    ///
    /// Returns `false` when no sink is installed.
    pub fn emit(&self, event: SessionEvent) -> bool {
        let sink = self.sink.lock().unwrap().clone();
        match sink {
            Some(sink) => {
                sink(event);
                true
            }
            None => false,
        }
    }

    /// Whether an event sink is currently installed.
    #[must_use]
    pub fn has_event_sink(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }

    /// Own connection assigned to this session.
    #[must_use]
    pub fn own_connection(&self) -> Connection {
        self.connection.clone()
    }

    /// Whether `connect` has succeeded and `disconnect` has not been called since.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Tokens passed to `connect`, in order.
    #[must_use]
    pub fn connect_tokens(&self) -> Vec<String> {
        self.log.lock().unwrap().tokens.clone()
    }

    /// Number of `disconnect` calls.
    #[must_use]
    pub fn disconnect_count(&self) -> usize {
        self.disconnect_count.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn init_publisher_calls(&self) -> Vec<InitPublisherCall> {
        self.log.lock().unwrap().init_publisher.clone()
    }

    #[must_use]
    pub fn published(&self) -> Vec<PublisherId> {
        self.log.lock().unwrap().published.clone()
    }

    #[must_use]
    pub fn unpublished(&self) -> Vec<PublisherId> {
        self.log.lock().unwrap().unpublished.clone()
    }

    #[must_use]
    pub fn subscribe_calls(&self) -> Vec<SubscribeCall> {
        self.log.lock().unwrap().subscribe.clone()
    }

    #[must_use]
    pub fn unsubscribed(&self) -> Vec<SubscriberId> {
        self.log.lock().unwrap().unsubscribed.clone()
    }

    /// Signals sent through the SDK, including ones that were scripted to fail.
    #[must_use]
    pub fn sent_signals(&self) -> Vec<OutboundSignal> {
        self.log.lock().unwrap().signals.clone()
    }

    #[must_use]
    pub fn forced_disconnects(&self) -> Vec<Connection> {
        self.log.lock().unwrap().forced_disconnects.clone()
    }

    #[must_use]
    pub fn forced_unpublishes(&self) -> Vec<StreamId> {
        self.log.lock().unwrap().forced_unpublishes.clone()
    }

    #[must_use]
    pub fn media_calls(&self) -> Vec<MediaCall> {
        self.log.lock().unwrap().media.clone()
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{prefix}-{n}")
    }
}

#[async_trait]
impl VideoSdk for MockSdk {
    fn set_event_sink(&self, sink: Option<SessionEventSink>) {
        *self.sink.lock().unwrap() = sink;
    }

    fn connection(&self) -> Option<Connection> {
        self.is_connected().then(|| self.connection.clone())
    }

    async fn connect(&self, token: &str) -> Result<()> {
        self.log.lock().unwrap().tokens.push(token.to_string());
        if let Some(err) = &self.failures.connect {
            return Err(err.clone());
        }
        self.connected.store(true, Ordering::SeqCst);
        if self.emit_session_connected {
            self.emit(SessionEvent::SessionConnected);
        }
        Ok(())
    }

    fn disconnect(&self) {
        self.disconnect_count.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn init_publisher(
        &self,
        container: &Container,
        properties: &MediaProperties,
    ) -> Result<Publisher> {
        self.log.lock().unwrap().init_publisher.push(InitPublisherCall {
            container: container.clone(),
            properties: properties.clone(),
        });
        if let Some(err) = &self.failures.init_publisher {
            return Err(err.clone());
        }
        Ok(Publisher {
            id: PublisherId::new(self.next_id("publisher")),
            stream: None,
            properties: properties.clone(),
        })
    }

    async fn publish(&self, mut publisher: Publisher) -> Result<Publisher> {
        if let Some(err) = &self.failures.publish {
            return Err(err.clone());
        }
        let video_type = match publisher.properties.video_source {
            Some(source) if source.is_screen_capture() => VideoType::Screen,
            _ => VideoType::Camera,
        };
        publisher.stream = Some(Stream {
            stream_id: StreamId::new(self.next_id("local-stream")),
            video_type: Some(video_type),
            connection: self.connection.clone(),
            name: publisher.properties.name.clone(),
            has_audio: publisher.properties.publish_audio.unwrap_or(true),
            has_video: publisher.properties.publish_video.unwrap_or(true),
        });
        self.log.lock().unwrap().published.push(publisher.id.clone());
        Ok(publisher)
    }

    fn unpublish(&self, publisher: &Publisher) {
        self.log.lock().unwrap().unpublished.push(publisher.id.clone());
    }

    async fn subscribe(
        &self,
        stream: &Stream,
        container: &Container,
        properties: &MediaProperties,
    ) -> Result<Subscriber> {
        self.log.lock().unwrap().subscribe.push(SubscribeCall {
            stream_id: stream.stream_id.clone(),
            container: container.clone(),
            properties: properties.clone(),
        });
        if let Some(gate) = &self.subscribe_gate {
            gate.notified().await;
        }
        if let Some(err) = self
            .failures
            .subscribe
            .get(&stream.stream_id)
            .or(self.failures.subscribe_all.as_ref())
        {
            return Err(err.clone());
        }
        Ok(Subscriber {
            id: SubscriberId::new(self.next_id("subscriber")),
            stream: stream.clone(),
            properties: properties.clone(),
        })
    }

    async fn unsubscribe(&self, subscriber: &Subscriber) -> Result<()> {
        if let Some(gate) = &self.unsubscribe_gate {
            gate.notified().await;
        }
        self.log
            .lock()
            .unwrap()
            .unsubscribed
            .push(subscriber.id.clone());
        match &self.failures.unsubscribe {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn signal(&self, signal: OutboundSignal) -> Result<()> {
        self.log.lock().unwrap().signals.push(signal.clone());
        if let Some(err) = &self.failures.signal {
            return Err(err.clone());
        }
        if self.echo_signals {
            self.emit(SessionEvent::Signal(Signal {
                signal_type: Some(signal.signal_type),
                data: signal.data,
                from: Some(self.connection.clone()),
            }));
        }
        Ok(())
    }

    async fn force_disconnect(&self, connection: &Connection) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .forced_disconnects
            .push(connection.clone());
        match &self.failures.moderation {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn force_unpublish(&self, stream: &Stream) -> Result<()> {
        self.log
            .lock()
            .unwrap()
            .forced_unpublishes
            .push(stream.stream_id.clone());
        match &self.failures.moderation {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn set_publisher_media(
        &self,
        publisher: &PublisherId,
        track: MediaTrack,
        enabled: bool,
    ) -> Result<()> {
        self.log.lock().unwrap().media.push(MediaCall {
            target: MediaTarget::Publisher(publisher.clone()),
            track,
            enabled,
        });
        Ok(())
    }

    fn set_subscriber_media(
        &self,
        subscriber: &SubscriberId,
        track: MediaTrack,
        enabled: bool,
    ) -> Result<()> {
        self.log.lock().unwrap().media.push(MediaCall {
            target: MediaTarget::Subscriber(subscriber.clone()),
            track,
            enabled,
        });
        Ok(())
    }
}

/// Builder for MockSdk configuration.
#[derive(Debug, Default)]
pub struct MockSdkBuilder {
    connection_id: Option<String>,
    connection_data: String,
    failures: FailureScript,
    emit_session_connected: bool,
    echo_signals: bool,
    subscribe_gate: Option<Arc<Notify>>,
    unsubscribe_gate: Option<Arc<Notify>>,
}

impl MockSdkBuilder {
    /// Set the connection ID assigned to the local participant.
    #[must_use]
    pub fn connection_id(mut self, id: impl Into<String>) -> Self {
        self.connection_id = Some(id.into());
        self
    }

    /// Set the local connection metadata.
    #[must_use]
    pub fn connection_data(mut self, data: impl Into<String>) -> Self {
        self.connection_data = data.into();
        self
    }

    /// Fail `connect`.
    #[must_use]
    pub fn fail_connect(mut self, code: i32, message: &str) -> Self {
        self.failures.connect = Some(SdkError::new(code, message));
        self
    }

    /// Fail publisher creation.
    #[must_use]
    pub fn fail_init_publisher(mut self, code: i32, message: &str) -> Self {
        self.failures.init_publisher = Some(SdkError::new(code, message));
        self
    }

    /// Fail `publish` after the publisher has been created.
    #[must_use]
    pub fn fail_publish_with(mut self, code: i32, message: &str) -> Self {
        self.failures.publish = Some(SdkError::new(code, message));
        self
    }

    /// Fail subscribing to one stream.
    #[must_use]
    pub fn fail_subscribe_for(
        mut self,
        stream_id: impl Into<String>,
        code: i32,
        message: &str,
    ) -> Self {
        self.failures
            .subscribe
            .insert(StreamId::new(stream_id), SdkError::new(code, message));
        self
    }

    /// Fail every subscribe.
    #[must_use]
    pub fn fail_subscribe_all(mut self, code: i32, message: &str) -> Self {
        self.failures.subscribe_all = Some(SdkError::new(code, message));
        self
    }

    /// Fail every unsubscribe.
    #[must_use]
    pub fn fail_unsubscribe(mut self, code: i32, message: &str) -> Self {
        self.failures.unsubscribe = Some(SdkError::new(code, message));
        self
    }

    /// Fail every outbound signal.
    #[must_use]
    pub fn fail_signal(mut self, code: i32, message: &str) -> Self {
        self.failures.signal = Some(SdkError::new(code, message));
        self
    }

    /// Fail `force_disconnect` and `force_unpublish`.
    #[must_use]
    pub fn fail_moderation(mut self, code: i32, message: &str) -> Self {
        self.failures.moderation = Some(SdkError::new(code, message));
        self
    }

    /// Emit `sessionConnected` from inside `connect`.
    #[must_use]
    pub fn emit_session_connected(mut self) -> Self {
        self.emit_session_connected = true;
        self
    }

    /// Deliver every successful outbound signal back to the sink, as the
    /// real SDK does for broadcast signals.
    #[must_use]
    pub fn echo_signals(mut self) -> Self {
        self.echo_signals = true;
        self
    }

    /// Block each `subscribe` until `gate` is notified. The call is
    /// recorded before it blocks.
    #[must_use]
    pub fn hold_subscribe(mut self, gate: Arc<Notify>) -> Self {
        self.subscribe_gate = Some(gate);
        self
    }

    /// Block each `unsubscribe` until `gate` is notified.
    #[must_use]
    pub fn hold_unsubscribe(mut self, gate: Arc<Notify>) -> Self {
        self.unsubscribe_gate = Some(gate);
        self
    }

    /// Build the MockSdk.
    #[must_use]
    pub fn build(self) -> MockSdk {
        let connection_id = self
            .connection_id
            .unwrap_or_else(|| "conn-local".to_string());
        MockSdk {
            connection: Connection::new(connection_id, self.connection_data),
            connected: AtomicBool::new(false),
            sink: Mutex::new(None),
            failures: self.failures,
            emit_session_connected: self.emit_session_connected,
            echo_signals: self.echo_signals,
            subscribe_gate: self.subscribe_gate,
            unsubscribe_gate: self.unsubscribe_gate,
            next_id: AtomicUsize::new(0),
            disconnect_count: AtomicUsize::new(0),
            log: Mutex::new(CallLog::default()),
        }
    }
}
