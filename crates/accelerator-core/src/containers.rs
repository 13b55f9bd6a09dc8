//! Render container resolution.
//!
//! The host decides where each publisher and subscriber is rendered. The
//! accelerator asks a [`StreamContainers`] implementation for a
//! [`Container`] every time it creates one.

use common::types::{ConnectionData, Container, PubSubRole, StreamId, StreamType};

/// Resolves the render target for a publisher or subscriber.
pub trait StreamContainers: Send + Sync {
    /// `data` is the owning connection's decoded metadata (subscribers only).
    fn resolve(
        &self,
        role: PubSubRole,
        stream_type: StreamType,
        data: Option<&ConnectionData>,
        stream_id: Option<&StreamId>,
    ) -> Container;
}

impl<F> StreamContainers for F
where
    F: Fn(PubSubRole, StreamType, Option<&ConnectionData>, Option<&StreamId>) -> Container
        + Send
        + Sync,
{
    fn resolve(
        &self,
        role: PubSubRole,
        stream_type: StreamType,
        data: Option<&ConnectionData>,
        stream_id: Option<&StreamId>,
    ) -> Container {
        self(role, stream_type, data, stream_id)
    }
}

/// Fixed per-type selectors such as `#cameraSubscriberContainer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContainers;

impl StreamContainers for DefaultContainers {
    fn resolve(
        &self,
        role: PubSubRole,
        stream_type: StreamType,
        _data: Option<&ConnectionData>,
        _stream_id: Option<&StreamId>,
    ) -> Container {
        let role = match role {
            PubSubRole::Publisher => "Publisher",
            PubSubRole::Subscriber => "Subscriber",
        };
        Container::new(format!("#{}{role}Container", stream_type.as_str()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_selectors() {
        let containers = DefaultContainers;
        assert_eq!(
            containers
                .resolve(PubSubRole::Subscriber, StreamType::Camera, None, None)
                .as_str(),
            "#cameraSubscriberContainer"
        );
        assert_eq!(
            containers
                .resolve(PubSubRole::Publisher, StreamType::Screen, None, None)
                .as_str(),
            "#screenPublisherContainer"
        );
    }

    #[test]
    fn test_closure_resolver_sees_stream_id() {
        let resolver = |_role: PubSubRole,
                        _stream_type: StreamType,
                        _data: Option<&ConnectionData>,
                        stream_id: Option<&StreamId>| {
            Container::new(format!(
                "#tile-{}",
                stream_id.map_or("local", StreamId::as_str)
            ))
        };

        let id = StreamId::new("abc");
        assert_eq!(
            resolver
                .resolve(PubSubRole::Subscriber, StreamType::Sip, None, Some(&id))
                .as_str(),
            "#tile-abc"
        );
    }
}
