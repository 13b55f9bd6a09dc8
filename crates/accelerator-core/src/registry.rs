//! Stream registry.
//!
//! The authoritative record of streams in the session, the local
//! publishers and subscribers, and which local object represents which
//! stream. All methods are synchronous and never touch the SDK.
//!
//! The registry is owned by the [`SessionGateway`](crate::gateway::SessionGateway);
//! everything else reads it through snapshots.

use crate::credential::Credential;
use common::sdk::{Publisher, Subscriber};
use common::types::{PublisherId, Stream, StreamId, StreamType, SubscriberId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// An object stored in a [`StreamCollection`], keyed by its local id.
pub trait LocalEntry {
    type Id: Ord + Clone + std::fmt::Debug;

    fn local_id(&self) -> &Self::Id;
}

impl LocalEntry for Publisher {
    type Id = PublisherId;

    fn local_id(&self) -> &PublisherId {
        &self.id
    }
}

impl LocalEntry for Subscriber {
    type Id = SubscriberId;

    fn local_id(&self) -> &SubscriberId {
        &self.id
    }
}

/// Per-type counts of a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamCounts {
    pub camera: usize,
    pub screen: usize,
    pub sip: usize,
    pub total: usize,
}

/// Local objects grouped by stream type.
///
/// An entry lives in exactly one bucket; adding it again under another
/// type moves it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(bound(serialize = "T: Serialize, T::Id: Serialize"))]
pub struct StreamCollection<T: LocalEntry> {
    camera: BTreeMap<T::Id, T>,
    screen: BTreeMap<T::Id, T>,
    sip: BTreeMap<T::Id, T>,
}

impl<T: LocalEntry> Default for StreamCollection<T> {
    fn default() -> Self {
        Self {
            camera: BTreeMap::new(),
            screen: BTreeMap::new(),
            sip: BTreeMap::new(),
        }
    }
}

impl<T: LocalEntry> StreamCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket_mut(&mut self, stream_type: StreamType) -> &mut BTreeMap<T::Id, T> {
        match stream_type {
            StreamType::Camera => &mut self.camera,
            StreamType::Screen => &mut self.screen,
            StreamType::Sip => &mut self.sip,
        }
    }

    /// Entries of one stream type, ordered by local id.
    pub fn bucket(&self, stream_type: StreamType) -> &BTreeMap<T::Id, T> {
        match stream_type {
            StreamType::Camera => &self.camera,
            StreamType::Screen => &self.screen,
            StreamType::Sip => &self.sip,
        }
    }

    /// Insert under `stream_type`, dropping any entry with the same id from
    /// the other buckets.
    pub fn add(&mut self, stream_type: StreamType, item: T) {
        let id = item.local_id().clone();
        for other in StreamType::ALL {
            if other != stream_type {
                self.bucket_mut(other).remove(&id);
            }
        }
        self.bucket_mut(stream_type).insert(id, item);
    }

    pub fn remove(&mut self, stream_type: StreamType, id: &T::Id) -> Option<T> {
        self.bucket_mut(stream_type).remove(id)
    }

    /// Remove `id` from whichever bucket holds it.
    pub fn remove_any(&mut self, id: &T::Id) -> Option<(StreamType, T)> {
        StreamType::ALL
            .into_iter()
            .find_map(|stream_type| self.remove(stream_type, id).map(|item| (stream_type, item)))
    }

    pub fn get(&self, id: &T::Id) -> Option<&T> {
        StreamType::ALL
            .into_iter()
            .find_map(|stream_type| self.bucket(stream_type).get(id))
    }

    pub fn len(&self, stream_type: StreamType) -> usize {
        self.bucket(stream_type).len()
    }

    pub fn total(&self) -> usize {
        self.camera.len() + self.screen.len() + self.sip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn counts(&self) -> StreamCounts {
        StreamCounts {
            camera: self.camera.len(),
            screen: self.screen.len(),
            sip: self.sip.len(),
            total: self.total(),
        }
    }

    /// Every entry with its type, camera first.
    pub fn iter(&self) -> impl Iterator<Item = (StreamType, &T)> {
        StreamType::ALL.into_iter().flat_map(move |stream_type| {
            self.bucket(stream_type)
                .values()
                .map(move |item| (stream_type, item))
        })
    }

    pub fn reset(&mut self) {
        self.camera.clear();
        self.screen.clear();
        self.sip.clear();
    }
}

/// Publisher and subscriber counts by type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PubSubSummary {
    pub publisher: StreamCounts,
    pub subscriber: StreamCounts,
}

/// Snapshot of local publishers and subscribers with their counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PubSubDetail {
    pub publishers: StreamCollection<Publisher>,
    pub subscribers: StreamCollection<Subscriber>,
    pub meta: PubSubSummary,
}

/// Local object that represents a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role", content = "id", rename_all = "lowercase")]
pub enum LocalId {
    Publisher(PublisherId),
    Subscriber(SubscriberId),
}

/// Full registry snapshot, as delivered with `connected`, `subscribeTo*`
/// and `joinSession` events.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    pub connected: bool,
    pub streams: BTreeMap<StreamId, Stream>,
    pub stream_map: BTreeMap<StreamId, LocalId>,
    pub pub_sub: PubSubDetail,
}

/// Session state owned by the gateway.
#[derive(Debug)]
pub struct State {
    connected: bool,
    credentials: Credential,
    streams: BTreeMap<StreamId, Stream>,
    stream_map: HashMap<StreamId, LocalId>,
    publishers: StreamCollection<Publisher>,
    subscribers: StreamCollection<Subscriber>,
}

impl State {
    pub fn new(credentials: Credential) -> Self {
        Self {
            connected: false,
            credentials,
            streams: BTreeMap::new(),
            stream_map: HashMap::new(),
            publishers: StreamCollection::new(),
            subscribers: StreamCollection::new(),
        }
    }

    pub fn credentials(&self) -> &Credential {
        &self.credentials
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn add_stream(&mut self, stream: Stream) {
        debug!(target: "acc.registry", stream_id = %stream.stream_id, stream_type = %stream.stream_type(), "Stream added");
        self.streams.insert(stream.stream_id.clone(), stream);
    }

    /// Forget a stream and drop the subscriber that represents it.
    ///
    /// Returns the dropped subscriber, if any. A local publisher's mapping
    /// survives the removal of its stream record.
    pub fn remove_stream(&mut self, stream_id: &StreamId) -> Option<Subscriber> {
        self.streams.remove(stream_id);

        let subscriber_id = match self.stream_map.get(stream_id) {
            Some(LocalId::Subscriber(id)) => Some(id.clone()),
            _ => None,
        };
        let removed = subscriber_id.and_then(|id| {
            self.stream_map.remove(stream_id);
            self.subscribers.remove_any(&id).map(|(_, s)| s)
        });

        debug!(
            target: "acc.registry",
            stream_id = %stream_id,
            subscriber_removed = removed.is_some(),
            "Stream removed"
        );
        removed
    }

    pub fn add_publisher(&mut self, stream_type: StreamType, publisher: Publisher) {
        if let Some(stream_id) = publisher.stream_id() {
            self.stream_map
                .insert(stream_id.clone(), LocalId::Publisher(publisher.id.clone()));
        }
        debug!(target: "acc.registry", publisher_id = %publisher.id, stream_type = %stream_type, "Publisher added");
        self.publishers.add(stream_type, publisher);
    }

    /// Remove a publisher. The stream record, if any, is kept.
    pub fn remove_publisher(
        &mut self,
        stream_type: StreamType,
        publisher_id: &PublisherId,
    ) -> Option<Publisher> {
        let removed = self
            .publishers
            .remove(stream_type, publisher_id)
            .or_else(|| self.publishers.remove_any(publisher_id).map(|(_, p)| p))?;

        let target = LocalId::Publisher(publisher_id.clone());
        self.stream_map.retain(|_, local| *local != target);
        debug!(target: "acc.registry", publisher_id = %publisher_id, "Publisher removed");
        Some(removed)
    }

    /// Record `subscriber` as the one representing its stream.
    ///
    /// A stream has at most one subscriber: a different subscriber already
    /// mapped to the stream is dropped from the registry and returned so the
    /// caller can release it.
    pub fn add_subscriber(&mut self, subscriber: Subscriber) -> Option<Subscriber> {
        let previous = self.stream_map.insert(
            subscriber.stream_id().clone(),
            LocalId::Subscriber(subscriber.id.clone()),
        );
        let displaced = match previous {
            Some(LocalId::Subscriber(old)) if old != subscriber.id => {
                self.subscribers.remove_any(&old).map(|(_, s)| s)
            }
            _ => None,
        };
        debug!(
            target: "acc.registry",
            subscriber_id = %subscriber.id,
            stream_id = %subscriber.stream_id(),
            displaced = displaced.is_some(),
            "Subscriber added"
        );
        self.subscribers.add(subscriber.stream_type(), subscriber);
        displaced
    }

    /// Remove a subscriber. Unknown ids are a no-op.
    pub fn remove_subscriber(&mut self, subscriber_id: &SubscriberId) -> Option<Subscriber> {
        let (_, removed) = self.subscribers.remove_any(subscriber_id)?;
        let stream_id = removed.stream_id().clone();

        if self.stream_map.get(&stream_id) == Some(&LocalId::Subscriber(subscriber_id.clone())) {
            self.stream_map.remove(&stream_id);
            // Subscribing to our own stream (network test) shadows the publisher mapping.
            let owner = self
                .publishers
                .iter()
                .find(|(_, p)| p.stream_id() == Some(&stream_id))
                .map(|(_, p)| p.id.clone());
            if let Some(publisher_id) = owner {
                self.stream_map
                    .insert(stream_id.clone(), LocalId::Publisher(publisher_id));
            }
        }

        debug!(target: "acc.registry", subscriber_id = %subscriber_id, stream_id = %stream_id, "Subscriber removed");
        Some(removed)
    }

    pub fn get_subscriber(&self, stream_id: &StreamId) -> Option<&Subscriber> {
        match self.stream_map.get(stream_id)? {
            LocalId::Subscriber(id) => self.subscribers.get(id),
            LocalId::Publisher(_) => None,
        }
    }

    pub fn get_publisher(&self, stream_id: &StreamId) -> Option<&Publisher> {
        match self.stream_map.get(stream_id)? {
            LocalId::Publisher(id) => self.publishers.get(id),
            LocalId::Subscriber(_) => None,
        }
    }

    pub fn get_publishers(&self, stream_type: StreamType) -> impl Iterator<Item = &Publisher> {
        self.publishers.bucket(stream_type).values()
    }

    pub fn get_subscribers(&self, stream_type: StreamType) -> impl Iterator<Item = &Subscriber> {
        self.subscribers.bucket(stream_type).values()
    }

    pub fn publishers(&self) -> &StreamCollection<Publisher> {
        &self.publishers
    }

    pub fn subscribers(&self) -> &StreamCollection<Subscriber> {
        &self.subscribers
    }

    pub fn streams(&self) -> &BTreeMap<StreamId, Stream> {
        &self.streams
    }

    pub fn stream_map(&self) -> &HashMap<StreamId, LocalId> {
        &self.stream_map
    }

    pub fn pub_sub_count(&self) -> PubSubSummary {
        PubSubSummary {
            publisher: self.publishers.counts(),
            subscriber: self.subscribers.counts(),
        }
    }

    /// Copy of the publishers and subscribers with their counts.
    pub fn pub_sub(&self) -> PubSubDetail {
        PubSubDetail {
            publishers: self.publishers.clone(),
            subscribers: self.subscribers.clone(),
            meta: self.pub_sub_count(),
        }
    }

    pub fn all(&self) -> StateSnapshot {
        StateSnapshot {
            connected: self.connected,
            streams: self.streams.clone(),
            stream_map: self
                .stream_map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            pub_sub: self.pub_sub(),
        }
    }

    /// Drop every stream, mapping, publisher and subscriber.
    pub fn reset(&mut self) {
        self.publishers.reset();
        self.subscribers.reset();
        self.stream_map.clear();
        self.streams.clear();
        debug!(target: "acc.registry", "State reset");
    }
}
