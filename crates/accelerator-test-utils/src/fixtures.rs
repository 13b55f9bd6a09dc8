//! Pre-configured test data fixtures.
//!
//! Provides builders for:
//! - Remote streams of each type (camera, screen, SIP)
//! - Connections with raw or JSON metadata
//! - Session credentials

use common::types::{Connection, ConnectionId, Stream, StreamId, VideoType};
use uuid::Uuid;

/// Test stream fixture.
#[derive(Debug, Clone)]
pub struct TestStream {
    /// Stream ID.
    pub stream_id: String,
    /// Video type; `None` builds a SIP stream.
    pub video_type: Option<VideoType>,
    /// Owning connection ID.
    pub connection_id: String,
    /// Owning connection metadata.
    pub connection_data: String,
    /// Display name.
    pub name: Option<String>,
}

impl TestStream {
    fn new(stream_id: impl Into<String>, video_type: Option<VideoType>) -> Self {
        let stream_id = stream_id.into();
        Self {
            connection_id: format!("conn-{stream_id}"),
            stream_id,
            video_type,
            connection_data: String::new(),
            name: None,
        }
    }

    /// A remote camera stream.
    #[must_use]
    pub fn camera(stream_id: impl Into<String>) -> Self {
        Self::new(stream_id, Some(VideoType::Camera))
    }

    /// A remote screen-share stream.
    #[must_use]
    pub fn screen(stream_id: impl Into<String>) -> Self {
        Self::new(stream_id, Some(VideoType::Screen))
    }

    /// A SIP stream (no video type).
    #[must_use]
    pub fn sip(stream_id: impl Into<String>) -> Self {
        Self::new(stream_id, None)
    }

    /// A camera stream with a random ID.
    #[must_use]
    pub fn random_camera() -> Self {
        Self::camera(format!("stream-{}", Uuid::new_v4()))
    }

    /// Set the owning connection ID.
    #[must_use]
    pub fn from_connection(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = connection_id.into();
        self
    }

    /// Set the owning connection metadata.
    #[must_use]
    pub fn with_connection_data(mut self, data: impl Into<String>) -> Self {
        self.connection_data = data.into();
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Build the stream.
    #[must_use]
    pub fn build(self) -> Stream {
        Stream {
            stream_id: StreamId::new(self.stream_id),
            video_type: self.video_type,
            connection: Connection {
                connection_id: ConnectionId::new(self.connection_id),
                data: self.connection_data,
            },
            name: self.name,
            has_audio: true,
            has_video: self.video_type.is_some(),
        }
    }
}

/// A remote participant connection.
#[must_use]
pub fn test_connection(connection_id: impl Into<String>) -> Connection {
    Connection::new(connection_id.into(), String::new())
}

/// Test credentials fixture.
#[derive(Debug, Clone)]
pub struct TestCredentials {
    /// API key.
    pub api_key: String,
    /// Session ID.
    pub session_id: String,
    /// Session token.
    pub token: String,
}

impl Default for TestCredentials {
    fn default() -> Self {
        Self {
            api_key: "45678901".to_string(),
            session_id: "1_MX40NTY3ODkwMX5-test-session".to_string(),
            token: "T1==cGFydG5lcl9pZD00NTY3ODkwMQ==".to_string(),
        }
    }
}

impl TestCredentials {
    /// Valid credentials.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Replace the session ID.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Replace the token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }
}
