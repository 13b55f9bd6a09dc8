//! Call orchestration.
//!
//! `Communication` drives the call lifecycle on top of the gateway:
//! admission control, publishing the local camera, subscribing to remote
//! streams (initially and as they appear), and tearing everything down.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --start_call--> InCall --end_call--> Idle
//!   ^                    |
//!   +-- admission fail --+
//! ```
//!
//! Only one call can be starting or active at a time; a second
//! `start_call` is rejected with `CallInProgress`. `end_call` leaves the
//! active state before tearing down, so streams that appear during
//! teardown are not picked up.
//!
//! # Subscriptions
//!
//! A stream has at most one subscriber. Overlapping `subscribe` calls for
//! the same stream (an auto-subscribe racing a host call, or the join
//! fan-out) share the first caller's SDK subscription and its outcome.

use crate::containers::{DefaultContainers, StreamContainers};
use crate::errors::{AcceleratorError, Result};
use crate::events::{AcceleratorEvent, EventBus, EventData, SubscribedEvent};
use crate::gateway::SessionGateway;
use crate::observability::metrics;
use crate::registry::PubSubDetail;
use common::sdk::{MediaTrack, Publisher, SessionEvent, SessionEventKind, Subscriber};
use common::types::{
    MediaProperties, PubSubRole, PublisherId, Stream, StreamId, StreamType, SubscriberId,
    VideoSource,
};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Call behaviour options.
#[derive(Debug, Clone)]
pub struct CommunicationOptions {
    /// Maximum camera parties (publishers + subscribers). `None` or `Some(0)`
    /// means unlimited.
    pub connection_limit: Option<usize>,
    /// Subscribe to remote streams automatically while a call is active.
    pub auto_subscribe: bool,
    /// Never publish the local camera.
    pub subscribe_only: bool,
    /// Overrides for camera publisher/subscriber properties.
    pub call_properties: Option<MediaProperties>,
    /// Overrides for screen publisher/subscriber properties.
    pub screen_properties: Option<MediaProperties>,
}

impl Default for CommunicationOptions {
    fn default() -> Self {
        Self {
            connection_limit: None,
            auto_subscribe: true,
            subscribe_only: false,
            call_properties: None,
            screen_properties: None,
        }
    }
}

/// Properties applied to every camera publisher and subscriber.
pub fn default_call_properties() -> MediaProperties {
    MediaProperties {
        insert_mode: Some("append".to_string()),
        width: Some("100%".to_string()),
        height: Some("100%".to_string()),
        show_controls: Some(false),
        button_display_mode: Some("off".to_string()),
        ..MediaProperties::default()
    }
}

/// Properties applied to every screen publisher and subscriber.
pub fn default_screen_properties() -> MediaProperties {
    MediaProperties {
        video_source: Some(VideoSource::Window),
        ..default_call_properties()
    }
}

/// Outcome of `start_call`: the pub/sub snapshot plus the local publisher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinResult {
    #[serde(flatten)]
    pub pub_sub: PubSubDetail,
    /// `None` in subscribe-only mode or when publishing failed.
    pub publisher: Option<Publisher>,
}

/// Outcome of an SDK subscription, published to callers waiting on it.
type SubscribeOutcome = Option<Result<Subscriber>>;

/// SDK subscriptions in progress, by stream.
type InFlight = HashMap<StreamId, watch::Receiver<SubscribeOutcome>>;

/// What a `subscribe` caller does for a stream.
enum Claim {
    Existing(Subscriber),
    Wait(watch::Receiver<SubscribeOutcome>),
    Lead(watch::Sender<SubscribeOutcome>),
}

/// Clears a stream's in-flight entry when the leading subscribe finishes or
/// is dropped.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<InFlight>,
    stream_id: StreamId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.stream_id);
    }
}

/// Builder for [`Communication`].
#[derive(Default)]
pub struct CommunicationBuilder {
    events: Option<EventBus>,
    gateway: Option<SessionGateway>,
    containers: Option<Arc<dyn StreamContainers>>,
    options: CommunicationOptions,
}

impl CommunicationBuilder {
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn gateway(mut self, gateway: SessionGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn containers(mut self, containers: Arc<dyn StreamContainers>) -> Self {
        self.containers = Some(containers);
        self
    }

    pub fn options(mut self, options: CommunicationOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate collaborators and register the stream listeners.
    pub fn build(self) -> Result<Arc<Communication>> {
        let events = self.events.ok_or_else(|| {
            AcceleratorError::Configuration("videoAccelerator is a required option.".to_string())
        })?;
        let gateway = self.gateway.ok_or_else(|| {
            AcceleratorError::Configuration("session is a required option.".to_string())
        })?;

        let options = self.options;
        let call_properties = default_call_properties().merged_opt(options.call_properties.as_ref());
        let screen_properties =
            default_screen_properties().merged_opt(options.screen_properties.as_ref());

        let communication = Arc::new(Communication {
            gateway,
            events,
            containers: self
                .containers
                .unwrap_or_else(|| Arc::new(DefaultContainers)),
            active: AtomicBool::new(false),
            in_flight: Mutex::new(HashMap::new()),
            connection_limit: options.connection_limit.filter(|limit| *limit > 0),
            auto_subscribe: options.auto_subscribe,
            subscribe_only: options.subscribe_only,
            call_properties,
            screen_properties,
        });
        Communication::listen(&communication);
        Ok(communication)
    }
}

/// Call orchestrator for one session.
pub struct Communication {
    gateway: SessionGateway,
    events: EventBus,
    containers: Arc<dyn StreamContainers>,
    active: AtomicBool,
    in_flight: Mutex<InFlight>,
    connection_limit: Option<usize>,
    auto_subscribe: bool,
    subscribe_only: bool,
    call_properties: MediaProperties,
    screen_properties: MediaProperties,
}

impl std::fmt::Debug for Communication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Communication")
            .field("active", &self.is_active())
            .field("connection_limit", &self.connection_limit)
            .field("auto_subscribe", &self.auto_subscribe)
            .field("subscribe_only", &self.subscribe_only)
            .finish_non_exhaustive()
    }
}

impl Communication {
    pub fn builder() -> CommunicationBuilder {
        CommunicationBuilder::default()
    }

    fn listen(this: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(this);
        this.events.on(
            SessionEventKind::StreamCreated,
            Arc::new(move |data: &EventData| {
                if let (Some(communication), EventData::Session(SessionEvent::StreamCreated(stream))) =
                    (weak.upgrade(), data)
                {
                    communication.on_stream_created(stream.clone());
                }
            }),
        );

        let weak: Weak<Self> = Arc::downgrade(this);
        this.events.on(
            SessionEventKind::StreamDestroyed,
            Arc::new(move |data: &EventData| {
                if let (Some(communication), EventData::Session(SessionEvent::StreamDestroyed(stream))) =
                    (weak.upgrade(), data)
                {
                    communication.on_stream_destroyed(stream);
                }
            }),
        );
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn gateway(&self) -> &SessionGateway {
        &self.gateway
    }

    pub fn call_properties(&self) -> &MediaProperties {
        &self.call_properties
    }

    pub fn screen_properties(&self) -> &MediaProperties {
        &self.screen_properties
    }

    pub fn containers(&self) -> &Arc<dyn StreamContainers> {
        &self.containers
    }

    fn raise_error(&self, err: &AcceleratorError) {
        self.events
            .trigger_event(AcceleratorEvent::Error, &EventData::Error(err.client_message()));
    }

    /// Whether another camera party may join under the connection limit.
    pub fn able_to_join(&self) -> bool {
        let Some(limit) = self.connection_limit else {
            return true;
        };
        let cameras = self.gateway.with_state(|state| {
            state.publishers().len(StreamType::Camera) + state.subscribers().len(StreamType::Camera)
        });
        cameras < limit
    }

    /// Publish the local camera.
    ///
    /// Failures are raised as an `error` event and yield `None`.
    #[instrument(skip_all)]
    pub async fn publish(&self, properties: Option<&MediaProperties>) -> Option<Publisher> {
        if self.subscribe_only {
            info!(target: "acc.communication", "Subscribe-only instance, not publishing");
            return None;
        }

        let properties = self.call_properties.merged_opt(properties);
        let container =
            self.containers
                .resolve(PubSubRole::Publisher, StreamType::Camera, None, None);

        match self.gateway.publish(&container, &properties, None, false).await {
            Ok(publisher) => {
                metrics::record_publish("success");
                Some(publisher)
            }
            Err(err) => {
                let err = match err {
                    AcceleratorError::Sdk(e) => AcceleratorError::from_publish_error(e),
                    other => other,
                };
                let status = match err {
                    AcceleratorError::Network(_) => "network_error",
                    _ => "error",
                };
                metrics::record_publish(status);
                warn!(target: "acc.communication", error = %err, "Failed to publish");
                self.raise_error(&err);
                None
            }
        }
    }

    /// Subscribe to a stream.
    ///
    /// Returns the existing subscriber if the stream is already subscribed,
    /// and joins a subscription already in progress for it, unless
    /// `network_test` asks for a second subscription (used to subscribe to
    /// our own stream).
    #[instrument(skip_all, fields(stream_id = %stream.stream_id, network_test = network_test))]
    pub async fn subscribe(
        &self,
        stream: &Stream,
        properties: Option<&MediaProperties>,
        network_test: bool,
    ) -> Result<Subscriber> {
        if network_test {
            return self.subscribe_stream(stream, properties).await;
        }

        loop {
            match self.claim(&stream.stream_id) {
                Claim::Existing(existing) => {
                    debug!(target: "acc.communication", "Already subscribed");
                    return Ok(existing);
                }
                Claim::Wait(mut pending) => {
                    debug!(target: "acc.communication", "Subscription in progress, waiting for it");
                    let outcome = pending
                        .wait_for(|outcome| outcome.is_some())
                        .await
                        .ok()
                        .and_then(|outcome| (*outcome).clone());
                    if let Some(result) = outcome {
                        return result;
                    }
                    // The leading call was dropped before finishing; claim again.
                }
                Claim::Lead(outcome) => {
                    let _guard = InFlightGuard {
                        in_flight: &self.in_flight,
                        stream_id: stream.stream_id.clone(),
                    };
                    let result = self.subscribe_stream(stream, properties).await;
                    outcome.send_replace(Some(result.clone()));
                    return result;
                }
            }
        }
    }

    fn in_flight(&self) -> MutexGuard<'_, InFlight> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide, atomically with respect to other callers, whether to reuse a
    /// subscriber, wait for one in progress, or subscribe.
    fn claim(&self, stream_id: &StreamId) -> Claim {
        let mut in_flight = self.in_flight();
        if let Some(existing) = self.gateway.subscriber_for_stream(stream_id) {
            return Claim::Existing(existing);
        }
        if let Some(pending) = in_flight.get(stream_id) {
            return Claim::Wait(pending.clone());
        }
        let (outcome, pending) = watch::channel(None);
        in_flight.insert(stream_id.clone(), pending);
        Claim::Lead(outcome)
    }

    async fn subscribe_stream(
        &self,
        stream: &Stream,
        properties: Option<&MediaProperties>,
    ) -> Result<Subscriber> {
        let stream_type = stream.stream_type();
        let data = stream.connection.parsed_data();
        let container = self.containers.resolve(
            PubSubRole::Subscriber,
            stream_type,
            Some(&data),
            Some(&stream.stream_id),
        );
        let base = match stream_type {
            StreamType::Camera | StreamType::Sip => &self.call_properties,
            StreamType::Screen => &self.screen_properties,
        };
        let properties = base.merged_opt(properties);

        match self
            .gateway
            .subscribe(stream, &container, &properties, None)
            .await
        {
            Ok(subscriber) => {
                metrics::record_subscribe(stream_type, "success");
                self.events.trigger_event(
                    AcceleratorEvent::subscribe_to(stream_type),
                    &EventData::Subscribed(SubscribedEvent {
                        subscriber: subscriber.clone(),
                        state: self.gateway.state_snapshot(),
                    }),
                );
                Ok(subscriber)
            }
            Err(err) => {
                metrics::record_subscribe(stream_type, "error");
                warn!(target: "acc.communication", error = %err, "Failed to subscribe");
                Err(err)
            }
        }
    }

    pub async fn unsubscribe(&self, subscriber: &Subscriber) {
        self.gateway.unsubscribe(subscriber).await;
    }

    fn on_stream_created(self: &Arc<Self>, stream: Stream) {
        if !(self.is_active() && self.auto_subscribe) {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let communication = Arc::clone(self);
                handle.spawn(async move {
                    match communication.subscribe(&stream, None, false).await {
                        // The call ended while the SDK was subscribing.
                        Ok(subscriber) if !communication.is_active() => {
                            debug!(
                                target: "acc.communication",
                                stream_id = %stream.stream_id,
                                "Call ended during auto-subscribe, releasing subscriber"
                            );
                            communication.unsubscribe(&subscriber).await;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(
                                target: "acc.communication",
                                stream_id = %stream.stream_id,
                                error = %e,
                                "Auto-subscribe failed"
                            );
                        }
                    }
                });
            }
            Err(_) => {
                warn!(
                    target: "acc.communication",
                    stream_id = %stream.stream_id,
                    "No async runtime on this thread, stream not auto-subscribed"
                );
            }
        }
    }

    fn on_stream_destroyed(&self, stream: &Stream) {
        self.events.trigger_event(
            AcceleratorEvent::unsubscribe_from(stream.stream_type()),
            &EventData::PubSub(self.gateway.pub_sub()),
        );
    }

    /// Start a call: admission check, publish, then subscribe to every
    /// stream already in the session.
    ///
    /// Subscribe failures are logged and the best-effort snapshot is
    /// returned without `joinSession`.
    #[instrument(skip_all)]
    pub async fn start_call(&self, properties: Option<&MediaProperties>) -> Result<JoinResult> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AcceleratorError::CallInProgress);
        }

        let initial_streams = self.gateway.streams();

        if !self.able_to_join() {
            self.active.store(false, Ordering::SeqCst);
            metrics::record_admission_rejected();
            let err = AcceleratorError::ConnectionLimit;
            warn!(target: "acc.communication", limit = ?self.connection_limit, "Call rejected by connection limit");
            self.raise_error(&err);
            return Err(err);
        }

        metrics::record_call("start");
        let publisher = self.publish(properties).await;

        let mut failures = 0;
        if self.auto_subscribe {
            let results = join_all(
                initial_streams
                    .iter()
                    .map(|stream| self.subscribe(stream, None, false)),
            )
            .await;
            failures = results.iter().filter(|result| result.is_err()).count();
        }

        let result = JoinResult {
            pub_sub: self.gateway.pub_sub(),
            publisher,
        };

        if failures > 0 {
            warn!(
                target: "acc.communication",
                failures = failures,
                streams = initial_streams.len(),
                "Failed to subscribe to all existing streams"
            );
            return Ok(result);
        }

        info!(
            target: "acc.communication",
            subscribers = result.pub_sub.meta.subscriber.total,
            "Call started"
        );
        self.events.trigger_event(
            AcceleratorEvent::JoinSession,
            &EventData::Joined(result.clone()),
        );
        Ok(result)
    }

    /// End the call: unpublish camera and screen publishers and drop every
    /// subscriber.
    ///
    /// The call is inactive from the first step, so a stream created during
    /// teardown is not auto-subscribed.
    #[instrument(skip_all)]
    pub async fn end_call(&self) {
        self.active.store(false, Ordering::SeqCst);
        let pub_sub = self.gateway.pub_sub();

        for (stream_type, publisher) in pub_sub.publishers.iter() {
            if stream_type != StreamType::Sip {
                self.gateway.unpublish(publisher);
            }
        }

        join_all(
            pub_sub
                .subscribers
                .iter()
                .map(|(_, subscriber)| self.gateway.unsubscribe(subscriber)),
        )
        .await;

        metrics::record_call("end");
        info!(target: "acc.communication", "Call ended");
        self.events
            .trigger_event(AcceleratorEvent::LeaveSession, &EventData::Empty);
    }

    /// Toggle a track on a local camera or screen publisher.
    pub fn enable_local_av(
        &self,
        publisher_id: &PublisherId,
        track: MediaTrack,
        enabled: bool,
    ) -> Result<()> {
        let found = self.gateway.with_state(|state| {
            [StreamType::Camera, StreamType::Screen]
                .into_iter()
                .any(|stream_type| state.publishers().bucket(stream_type).contains_key(publisher_id))
        });
        if !found {
            return Err(AcceleratorError::NotFound(format!(
                "No camera or screen publisher {publisher_id}"
            )));
        }
        self.gateway.set_publisher_media(publisher_id, track, enabled)
    }

    /// Toggle a track on a remote camera or SIP subscriber.
    pub fn enable_remote_av(
        &self,
        subscriber_id: &SubscriberId,
        track: MediaTrack,
        enabled: bool,
    ) -> Result<()> {
        let found = self.gateway.with_state(|state| {
            [StreamType::Camera, StreamType::Sip]
                .into_iter()
                .any(|stream_type| state.subscribers().bucket(stream_type).contains_key(subscriber_id))
        });
        if !found {
            return Err(AcceleratorError::NotFound(format!(
                "No camera or SIP subscriber {subscriber_id}"
            )));
        }
        self.gateway.set_subscriber_media(subscriber_id, track, enabled)
    }
}
