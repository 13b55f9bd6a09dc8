//! The boundary to the external video SDK.
//!
//! The accelerator never talks to a concrete SDK. It drives an
//! implementation of [`VideoSdk`] and receives session-level
//! notifications through a single [`SessionEventSink`] installed on it.
//!
//! Adapters are expected to:
//! - complete each async operation exactly once (the SDK's error-first
//!   callback becomes a `Result`)
//! - invoke the sink outside of any internal lock, because the accelerator
//!   may call back into the adapter from an event handler

use crate::error::Result;
pub use crate::error::SdkError;
use crate::types::{
    Connection, Container, MediaProperties, PublisherId, Stream, StreamId, StreamType,
    SubscriberId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Local outbound media as created by the SDK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Publisher {
    pub id: PublisherId,
    /// Session stream; `None` until the publisher has been published.
    pub stream: Option<Stream>,
    pub properties: MediaProperties,
}

impl Publisher {
    #[must_use]
    pub fn stream_id(&self) -> Option<&StreamId> {
        self.stream.as_ref().map(|s| &s.stream_id)
    }

    /// Type of the published stream. Unpublished previews count as camera.
    #[must_use]
    pub fn stream_type(&self) -> StreamType {
        self.stream
            .as_ref()
            .map_or(StreamType::Camera, Stream::stream_type)
    }
}

/// Remote inbound media bound to one session stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub id: SubscriberId,
    pub stream: Stream,
    pub properties: MediaProperties,
}

impl Subscriber {
    #[must_use]
    pub fn stream_id(&self) -> &StreamId {
        &self.stream.stream_id
    }

    #[must_use]
    pub fn stream_type(&self) -> StreamType {
        self.stream.stream_type()
    }
}

/// Media track selector for enable/disable toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaTrack {
    Audio,
    Video,
}

impl MediaTrack {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MediaTrack::Audio => "audio",
            MediaTrack::Video => "video",
        }
    }
}

/// Signal to send over the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundSignal {
    #[serde(rename = "type")]
    pub signal_type: String,
    /// JSON-encoded payload.
    pub data: String,
    /// Recipient; `None` broadcasts to every connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Connection>,
}

/// Signal received from the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    /// Application-defined type; untyped signals have none.
    #[serde(rename = "type", default)]
    pub signal_type: Option<String>,
    #[serde(default)]
    pub data: String,
    /// Sender; `None` when the signal came from the server.
    #[serde(default)]
    pub from: Option<Connection>,
}

/// Session-level events the SDK can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionEventKind {
    ArchiveStarted,
    ArchiveStopped,
    ConnectionCreated,
    ConnectionDestroyed,
    SessionConnected,
    SessionDisconnected,
    SessionReconnected,
    SessionReconnecting,
    Signal,
    StreamCreated,
    StreamDestroyed,
    StreamPropertyChanged,
}

impl SessionEventKind {
    /// Every session event the accelerator relays.
    pub const ALL: [SessionEventKind; 12] = [
        SessionEventKind::ArchiveStarted,
        SessionEventKind::ArchiveStopped,
        SessionEventKind::ConnectionCreated,
        SessionEventKind::ConnectionDestroyed,
        SessionEventKind::SessionConnected,
        SessionEventKind::SessionDisconnected,
        SessionEventKind::SessionReconnected,
        SessionEventKind::SessionReconnecting,
        SessionEventKind::Signal,
        SessionEventKind::StreamCreated,
        SessionEventKind::StreamDestroyed,
        SessionEventKind::StreamPropertyChanged,
    ];

    /// Event name as used on the event bus.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionEventKind::ArchiveStarted => "archiveStarted",
            SessionEventKind::ArchiveStopped => "archiveStopped",
            SessionEventKind::ConnectionCreated => "connectionCreated",
            SessionEventKind::ConnectionDestroyed => "connectionDestroyed",
            SessionEventKind::SessionConnected => "sessionConnected",
            SessionEventKind::SessionDisconnected => "sessionDisconnected",
            SessionEventKind::SessionReconnected => "sessionReconnected",
            SessionEventKind::SessionReconnecting => "sessionReconnecting",
            SessionEventKind::Signal => "signal",
            SessionEventKind::StreamCreated => "streamCreated",
            SessionEventKind::StreamDestroyed => "streamDestroyed",
            SessionEventKind::StreamPropertyChanged => "streamPropertyChanged",
        }
    }

    /// Look up a session event by its bus name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

/// Notification from the SDK.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SessionEvent {
    StreamCreated(Stream),
    StreamDestroyed(Stream),
    #[serde(rename_all = "camelCase")]
    StreamPropertyChanged {
        stream: Stream,
        property: String,
        old_value: Value,
        new_value: Value,
    },
    ConnectionCreated(Connection),
    ConnectionDestroyed(Connection),
    SessionConnected,
    SessionDisconnected {
        reason: String,
    },
    SessionReconnecting,
    SessionReconnected,
    ArchiveStarted {
        id: String,
        name: String,
    },
    ArchiveStopped {
        id: String,
    },
    Signal(Signal),
    /// Event raised by an individual publisher or subscriber, for example
    /// `videoDisabled` or `audioLevelUpdated`.
    #[serde(rename_all = "camelCase")]
    Media {
        source_id: String,
        name: String,
        payload: Value,
    },
}

impl SessionEvent {
    /// Session-level kind; `None` for per-object media events.
    #[must_use]
    pub fn kind(&self) -> Option<SessionEventKind> {
        let kind = match self {
            SessionEvent::StreamCreated(_) => SessionEventKind::StreamCreated,
            SessionEvent::StreamDestroyed(_) => SessionEventKind::StreamDestroyed,
            SessionEvent::StreamPropertyChanged { .. } => SessionEventKind::StreamPropertyChanged,
            SessionEvent::ConnectionCreated(_) => SessionEventKind::ConnectionCreated,
            SessionEvent::ConnectionDestroyed(_) => SessionEventKind::ConnectionDestroyed,
            SessionEvent::SessionConnected => SessionEventKind::SessionConnected,
            SessionEvent::SessionDisconnected { .. } => SessionEventKind::SessionDisconnected,
            SessionEvent::SessionReconnecting => SessionEventKind::SessionReconnecting,
            SessionEvent::SessionReconnected => SessionEventKind::SessionReconnected,
            SessionEvent::ArchiveStarted { .. } => SessionEventKind::ArchiveStarted,
            SessionEvent::ArchiveStopped { .. } => SessionEventKind::ArchiveStopped,
            SessionEvent::Signal(_) => SessionEventKind::Signal,
            SessionEvent::Media { .. } => return None,
        };
        Some(kind)
    }

    /// Name the event is delivered under on the event bus.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            SessionEvent::Media { name, .. } => name,
            other => other.kind().map_or("", |kind| kind.as_str()),
        }
    }
}

/// Receiver for SDK notifications.
pub type SessionEventSink = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Operations the accelerator needs from a video SDK session.
///
/// One instance represents one session (the credentials' session id).
#[async_trait]
pub trait VideoSdk: Send + Sync {
    /// Install or clear the event sink. Installing replaces any previous sink.
    fn set_event_sink(&self, sink: Option<SessionEventSink>);

    /// Own connection, once connected.
    fn connection(&self) -> Option<Connection>;

    /// Join the session with the given token.
    async fn connect(&self, token: &str) -> Result<()>;

    /// Leave the session. Never fails.
    fn disconnect(&self);

    /// Create a publisher bound to `container` without publishing it.
    async fn init_publisher(
        &self,
        container: &Container,
        properties: &MediaProperties,
    ) -> Result<Publisher>;

    /// Publish a previously created publisher; the returned handle carries
    /// its session stream.
    async fn publish(&self, publisher: Publisher) -> Result<Publisher>;

    /// Stop publishing. Never fails.
    fn unpublish(&self, publisher: &Publisher);

    async fn subscribe(
        &self,
        stream: &Stream,
        container: &Container,
        properties: &MediaProperties,
    ) -> Result<Subscriber>;

    async fn unsubscribe(&self, subscriber: &Subscriber) -> Result<()>;

    async fn signal(&self, signal: OutboundSignal) -> Result<()>;

    /// Moderator-only: disconnect another participant.
    async fn force_disconnect(&self, connection: &Connection) -> Result<()>;

    /// Moderator-only: stop another participant's stream.
    async fn force_unpublish(&self, stream: &Stream) -> Result<()>;

    fn set_publisher_media(
        &self,
        publisher: &PublisherId,
        track: MediaTrack,
        enabled: bool,
    ) -> Result<()>;

    fn set_subscriber_media(
        &self,
        subscriber: &SubscriberId,
        track: MediaTrack,
        enabled: bool,
    ) -> Result<()>;
}
