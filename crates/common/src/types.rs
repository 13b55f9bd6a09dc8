//! Common data types for the video accelerator.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Wrap an SDK-assigned identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Session-level identity of a media stream
    StreamId
);
string_id!(
    /// Identity of a connection (one per participant endpoint)
    ConnectionId
);
string_id!(
    /// Locally assigned identity of a publisher
    PublisherId
);
string_id!(
    /// Locally assigned identity of a subscriber
    SubscriberId
);

/// Kind of stream as seen by the accelerator.
///
/// Selects the render container, the default properties and the
/// `subscribeTo*` / `unsubscribeFrom*` event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    /// Camera feed.
    Camera,
    /// Screen, window or application capture.
    Screen,
    /// Telephony endpoint joined over SIP (no video type).
    Sip,
}

impl StreamType {
    /// Every stream type, in bucket order.
    pub const ALL: [StreamType; 3] = [StreamType::Camera, StreamType::Screen, StreamType::Sip];

    /// Lowercase name used as a collection key.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            StreamType::Camera => "camera",
            StreamType::Screen => "screen",
            StreamType::Sip => "sip",
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Video type the SDK attaches to a stream. SIP streams carry none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoType {
    /// Camera feed.
    Camera,
    /// Screen capture.
    Screen,
}

impl From<VideoType> for StreamType {
    fn from(video_type: VideoType) -> Self {
        match video_type {
            VideoType::Camera => StreamType::Camera,
            VideoType::Screen => StreamType::Screen,
        }
    }
}

/// A participant connection and the metadata attached to it by the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Connection identity.
    pub connection_id: ConnectionId,
    /// Arbitrary payload from the token, often JSON.
    #[serde(default)]
    pub data: String,
}

impl Connection {
    /// Create a connection with the given id and metadata.
    #[must_use]
    pub fn new(connection_id: impl Into<ConnectionId>, data: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            data: data.into(),
        }
    }

    /// Decode the connection metadata.
    ///
    /// Empty metadata decodes to JSON `null`; anything that is not valid
    /// JSON is returned untouched.
    #[must_use]
    pub fn parsed_data(&self) -> ConnectionData {
        if self.data.is_empty() {
            return ConnectionData::Json(Value::Null);
        }
        match serde_json::from_str(&self.data) {
            Ok(value) => ConnectionData::Json(value),
            Err(_) => ConnectionData::Raw(self.data.clone()),
        }
    }
}

/// Connection metadata after a decode attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConnectionData {
    /// Metadata was valid JSON.
    Json(Value),
    /// Metadata was not JSON.
    Raw(String),
}

/// Session-level description of a media source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    /// Stream identity.
    pub stream_id: StreamId,
    /// Video type; `None` for SIP endpoints.
    pub video_type: Option<VideoType>,
    /// Connection that owns the stream.
    pub connection: Connection,
    /// Display name chosen by the publisher.
    #[serde(default)]
    pub name: Option<String>,
    /// Whether the stream currently carries audio.
    #[serde(default = "default_true")]
    pub has_audio: bool,
    /// Whether the stream currently carries video.
    #[serde(default = "default_true")]
    pub has_video: bool,
}

fn default_true() -> bool {
    true
}

impl Stream {
    /// Stream type derived from the video type; no video type means SIP.
    #[must_use]
    pub fn stream_type(&self) -> StreamType {
        self.video_type.map_or(StreamType::Sip, StreamType::from)
    }
}

/// Where a publisher or subscriber sits in a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PubSubRole {
    /// Local outbound media.
    Publisher,
    /// Remote inbound media.
    Subscriber,
}

impl PubSubRole {
    /// Lowercase role name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            PubSubRole::Publisher => "publisher",
            PubSubRole::Subscriber => "subscriber",
        }
    }
}

/// Render target handed to the SDK: a selector or element id chosen by the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Container(pub String);

impl Container {
    /// Create a container reference.
    #[must_use]
    pub fn new(selector: impl Into<String>) -> Self {
        Self(selector.into())
    }

    /// Borrow the selector.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Source captured by a publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoSource {
    /// Default camera.
    Camera,
    /// Whole screen.
    Screen,
    /// Single window.
    Window,
    /// Single application.
    Application,
    /// Browser tab.
    Browser,
}

impl VideoSource {
    /// Whether this source produces a screen-type stream.
    #[must_use]
    pub const fn is_screen_capture(&self) -> bool {
        !matches!(self, VideoSource::Camera)
    }
}

/// Publisher/subscriber properties passed through to the SDK.
///
/// Every field is optional so layers can be merged: configured defaults,
/// then per-call overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_controls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button_display_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_audio: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_video: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe_to_audio: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe_to_video: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_source: Option<VideoSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<u32>,
}

impl MediaProperties {
    /// Layer `overrides` on top of `self`; set fields in `overrides` win.
    #[must_use]
    pub fn merged(&self, overrides: &MediaProperties) -> MediaProperties {
        MediaProperties {
            insert_mode: overrides
                .insert_mode
                .clone()
                .or_else(|| self.insert_mode.clone()),
            width: overrides.width.clone().or_else(|| self.width.clone()),
            height: overrides.height.clone().or_else(|| self.height.clone()),
            show_controls: overrides.show_controls.or(self.show_controls),
            button_display_mode: overrides
                .button_display_mode
                .clone()
                .or_else(|| self.button_display_mode.clone()),
            name: overrides.name.clone().or_else(|| self.name.clone()),
            publish_audio: overrides.publish_audio.or(self.publish_audio),
            publish_video: overrides.publish_video.or(self.publish_video),
            subscribe_to_audio: overrides.subscribe_to_audio.or(self.subscribe_to_audio),
            subscribe_to_video: overrides.subscribe_to_video.or(self.subscribe_to_video),
            video_source: overrides.video_source.or(self.video_source),
            resolution: overrides
                .resolution
                .clone()
                .or_else(|| self.resolution.clone()),
            frame_rate: overrides.frame_rate.or(self.frame_rate),
        }
    }

    /// Layer optional overrides on top of `self`.
    #[must_use]
    pub fn merged_opt(&self, overrides: Option<&MediaProperties>) -> MediaProperties {
        overrides.map_or_else(|| self.clone(), |o| self.merged(o))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn stream(video_type: Option<VideoType>) -> Stream {
        Stream {
            stream_id: StreamId::new("stream-1"),
            video_type,
            connection: Connection::new("conn-1", ""),
            name: None,
            has_audio: true,
            has_video: true,
        }
    }

    #[test]
    fn test_missing_video_type_is_sip() {
        assert_eq!(stream(None).stream_type(), StreamType::Sip);
        assert_eq!(
            stream(Some(VideoType::Camera)).stream_type(),
            StreamType::Camera
        );
        assert_eq!(
            stream(Some(VideoType::Screen)).stream_type(),
            StreamType::Screen
        );
    }

    #[test]
    fn test_connection_data_decoding() {
        let json = Connection::new("c", r#"{"name":"alice"}"#);
        assert_eq!(
            json.parsed_data(),
            ConnectionData::Json(serde_json::json!({"name": "alice"}))
        );

        let raw = Connection::new("c", "name=alice");
        assert_eq!(
            raw.parsed_data(),
            ConnectionData::Raw("name=alice".to_string())
        );

        let empty = Connection::new("c", "");
        assert_eq!(empty.parsed_data(), ConnectionData::Json(Value::Null));
    }

    #[test]
    fn test_properties_merge_prefers_overrides() {
        let defaults = MediaProperties {
            width: Some("100%".to_string()),
            show_controls: Some(false),
            ..MediaProperties::default()
        };
        let overrides = MediaProperties {
            show_controls: Some(true),
            name: Some("alice".to_string()),
            ..MediaProperties::default()
        };

        let merged = defaults.merged(&overrides);
        assert_eq!(merged.width.as_deref(), Some("100%"));
        assert_eq!(merged.show_controls, Some(true));
        assert_eq!(merged.name.as_deref(), Some("alice"));
        assert_eq!(defaults.merged_opt(None), defaults);
    }

    #[test]
    fn test_stream_type_names() {
        assert_eq!(StreamType::Sip.as_str(), "sip");
        assert!(VideoSource::Window.is_screen_capture());
        assert!(!VideoSource::Camera.is_screen_capture());
    }

    #[test]
    fn test_stream_deserializes_from_sdk_json() {
        let json = r#"{
            "streamId": "abc",
            "videoType": "screen",
            "connection": {"connectionId": "c-1", "data": "{}"}
        }"#;
        let stream: Stream = serde_json::from_str(json).unwrap();
        assert_eq!(stream.stream_id.as_str(), "abc");
        assert_eq!(stream.stream_type(), StreamType::Screen);
        assert!(stream.has_audio);
    }
}
