//! Named-event bus.
//!
//! Hosts and feature packages register callbacks under event names; the
//! accelerator raises events with [`EventBus::trigger_event`]. Dispatch is
//! synchronous, follows registration order and iterates a snapshot, so
//! callbacks may freely register or remove listeners (including
//! themselves) while an event is being delivered.
//!
//! Callbacks are de-duplicated by `Arc` identity: registering the same
//! `Arc` twice under one event is a no-op.

use crate::communication::JoinResult;
use crate::features::text_chat::ChatMessage;
use crate::observability::metrics;
use crate::registry::{PubSubDetail, StateSnapshot};
use common::sdk::{Publisher, SessionEvent, SessionEventKind, Subscriber};
use common::types::StreamType;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, warn};

/// Event callback.
pub type Callback = Arc<dyn Fn(&EventData) + Send + Sync>;

/// Events raised by the accelerator itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcceleratorEvent {
    Connected,
    Disconnected,
    Error,
    JoinSession,
    LeaveSession,
    SubscribeToCamera,
    SubscribeToScreen,
    SubscribeToSip,
    UnsubscribeFromCamera,
    UnsubscribeFromScreen,
    UnsubscribeFromSip,
    StartScreenShare,
    EndScreenShare,
}

impl AcceleratorEvent {
    pub const ALL: [AcceleratorEvent; 13] = [
        AcceleratorEvent::Connected,
        AcceleratorEvent::Disconnected,
        AcceleratorEvent::Error,
        AcceleratorEvent::JoinSession,
        AcceleratorEvent::LeaveSession,
        AcceleratorEvent::SubscribeToCamera,
        AcceleratorEvent::SubscribeToScreen,
        AcceleratorEvent::SubscribeToSip,
        AcceleratorEvent::UnsubscribeFromCamera,
        AcceleratorEvent::UnsubscribeFromScreen,
        AcceleratorEvent::UnsubscribeFromSip,
        AcceleratorEvent::StartScreenShare,
        AcceleratorEvent::EndScreenShare,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            AcceleratorEvent::Connected => "connected",
            AcceleratorEvent::Disconnected => "disconnected",
            AcceleratorEvent::Error => "error",
            AcceleratorEvent::JoinSession => "joinSession",
            AcceleratorEvent::LeaveSession => "leaveSession",
            AcceleratorEvent::SubscribeToCamera => "subscribeToCamera",
            AcceleratorEvent::SubscribeToScreen => "subscribeToScreen",
            AcceleratorEvent::SubscribeToSip => "subscribeToSip",
            AcceleratorEvent::UnsubscribeFromCamera => "unsubscribeFromCamera",
            AcceleratorEvent::UnsubscribeFromScreen => "unsubscribeFromScreen",
            AcceleratorEvent::UnsubscribeFromSip => "unsubscribeFromSip",
            AcceleratorEvent::StartScreenShare => "startScreenShare",
            AcceleratorEvent::EndScreenShare => "endScreenShare",
        }
    }

    /// `subscribeTo<Type>` for a stream type.
    pub const fn subscribe_to(stream_type: StreamType) -> Self {
        match stream_type {
            StreamType::Camera => AcceleratorEvent::SubscribeToCamera,
            StreamType::Screen => AcceleratorEvent::SubscribeToScreen,
            StreamType::Sip => AcceleratorEvent::SubscribeToSip,
        }
    }

    /// `unsubscribeFrom<Type>` for a stream type.
    pub const fn unsubscribe_from(stream_type: StreamType) -> Self {
        match stream_type {
            StreamType::Camera => AcceleratorEvent::UnsubscribeFromCamera,
            StreamType::Screen => AcceleratorEvent::UnsubscribeFromScreen,
            StreamType::Sip => AcceleratorEvent::UnsubscribeFromSip,
        }
    }
}

/// Name of an event on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventName {
    Accelerator(AcceleratorEvent),
    Session(SessionEventKind),
    /// Feature, per-object SDK or host-defined events.
    Custom(String),
}

impl EventName {
    /// Resolve a name to a known event where possible.
    pub fn parse(name: &str) -> Self {
        if let Some(event) = AcceleratorEvent::ALL
            .into_iter()
            .find(|event| event.as_str() == name)
        {
            return EventName::Accelerator(event);
        }
        match SessionEventKind::from_name(name) {
            Some(kind) => EventName::Session(kind),
            None => EventName::Custom(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventName::Accelerator(event) => event.as_str(),
            EventName::Session(kind) => kind.as_str(),
            EventName::Custom(name) => name,
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AcceleratorEvent> for EventName {
    fn from(event: AcceleratorEvent) -> Self {
        EventName::Accelerator(event)
    }
}

impl From<SessionEventKind> for EventName {
    fn from(kind: SessionEventKind) -> Self {
        EventName::Session(kind)
    }
}

impl From<&str> for EventName {
    fn from(name: &str) -> Self {
        EventName::parse(name)
    }
}

impl From<String> for EventName {
    fn from(name: String) -> Self {
        EventName::parse(&name)
    }
}

impl From<&EventName> for EventName {
    fn from(name: &EventName) -> Self {
        name.clone()
    }
}

/// Payload of a `subscribeTo*` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscribedEvent {
    pub subscriber: Subscriber,
    pub state: StateSnapshot,
}

/// Payload delivered to callbacks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum EventData {
    Empty,
    /// Client message of an error (`error`, `errorSendingMessage`, ...).
    Error(String),
    State(StateSnapshot),
    PubSub(PubSubDetail),
    Joined(JoinResult),
    Subscribed(SubscribedEvent),
    Publisher(Publisher),
    /// Relayed SDK notification.
    Session(SessionEvent),
    Chat(ChatMessage),
    Custom(serde_json::Value),
}

#[derive(Default)]
struct Listeners {
    by_event: HashMap<String, Vec<Callback>>,
}

/// Event registry and dispatcher. Clones share the same listeners.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<Listeners>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.lock();
        f.debug_struct("EventBus")
            .field("events", &listeners.by_event.len())
            .finish()
    }
}

fn same_callback(a: &Callback, b: &Callback) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an event name. Idempotent.
    pub fn register_event(&self, event: impl Into<EventName>) {
        let event = event.into();
        self.lock()
            .by_event
            .entry(event.as_str().to_string())
            .or_default();
    }

    pub fn register_events<I, E>(&self, events: I)
    where
        I: IntoIterator<Item = E>,
        E: Into<EventName>,
    {
        let mut listeners = self.lock();
        for event in events {
            let event = event.into();
            listeners
                .by_event
                .entry(event.as_str().to_string())
                .or_default();
        }
    }

    pub fn is_registered(&self, event: impl Into<EventName>) -> bool {
        self.lock().by_event.contains_key(event.into().as_str())
    }

    /// Add a callback. Unknown events are registered on the fly.
    pub fn on(&self, event: impl Into<EventName>, callback: Callback) {
        let event = event.into();
        let mut listeners = self.lock();
        if !listeners.by_event.contains_key(event.as_str()) {
            warn!(target: "acc.events", event = %event, "Listener added for unregistered event, registering it");
        }
        let callbacks = listeners
            .by_event
            .entry(event.as_str().to_string())
            .or_default();
        if callbacks.iter().any(|cb| same_callback(cb, &callback)) {
            return;
        }
        callbacks.push(callback);
    }

    /// Add several callbacks at once.
    pub fn on_many<I, E>(&self, listeners: I)
    where
        I: IntoIterator<Item = (E, Callback)>,
        E: Into<EventName>,
    {
        for (event, callback) in listeners {
            self.on(event, callback);
        }
    }

    /// Remove one callback from an event.
    pub fn off(&self, event: impl Into<EventName>, callback: &Callback) {
        let event = event.into();
        if let Some(callbacks) = self.lock().by_event.get_mut(event.as_str()) {
            callbacks.retain(|cb| !same_callback(cb, callback));
        }
    }

    /// Remove every callback of one event. The event stays registered.
    pub fn off_event(&self, event: impl Into<EventName>) {
        let event = event.into();
        if let Some(callbacks) = self.lock().by_event.get_mut(event.as_str()) {
            callbacks.clear();
        }
    }

    /// Remove every callback of every event. Names stay registered.
    pub fn off_all(&self) {
        for callbacks in self.lock().by_event.values_mut() {
            callbacks.clear();
        }
    }

    pub fn listener_count(&self, event: impl Into<EventName>) -> usize {
        self.lock()
            .by_event
            .get(event.into().as_str())
            .map_or(0, Vec::len)
    }

    /// Deliver `data` to every callback of `event`, in registration order.
    ///
    /// A panicking callback is logged and skipped; the rest still run.
    /// Returns the number of callbacks invoked.
    pub fn trigger_event(&self, event: impl Into<EventName>, data: &EventData) -> usize {
        let event = event.into();
        let snapshot: Vec<Callback> = match self.lock().by_event.get(event.as_str()) {
            Some(callbacks) => callbacks.clone(),
            None => return 0,
        };

        for callback in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(data))).is_err() {
                error!(target: "acc.events", event = %event, "Event callback panicked");
            }
        }

        if !snapshot.is_empty() {
            debug!(target: "acc.events", event = %event, listeners = snapshot.len(), "Event dispatched");
            metrics::record_events_dispatched(snapshot.len());
        }
        snapshot.len()
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use recording::EventRecorder;

#[cfg(any(test, feature = "test-utils"))]
mod recording {
    use super::{Callback, EventBus, EventData, EventName};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct RecorderInner {
        events: Mutex<Vec<(String, EventData)>>,
        notify: Notify,
    }

    /// Records events delivered on a bus, for assertions and diagnostics.
    #[derive(Clone, Default)]
    pub struct EventRecorder {
        inner: Arc<RecorderInner>,
    }

    impl EventRecorder {
        pub fn new() -> Self {
            Self::default()
        }

        /// Record every event in `names` from `bus`.
        pub fn attach<I, E>(&self, bus: &EventBus, names: I)
        where
            I: IntoIterator<Item = E>,
            E: Into<EventName>,
        {
            for name in names {
                let name = name.into();
                bus.on(name.clone(), self.callback(name.as_str()));
            }
        }

        /// A callback that records under `name`.
        pub fn callback(&self, name: &str) -> Callback {
            let inner = Arc::clone(&self.inner);
            let name = name.to_string();
            Arc::new(move |data: &EventData| {
                inner
                    .events
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push((name.clone(), data.clone()));
                inner.notify.notify_waiters();
            })
        }

        pub fn events(&self) -> Vec<(String, EventData)> {
            self.inner
                .events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Recorded event names in delivery order.
        pub fn names(&self) -> Vec<String> {
            self.events().into_iter().map(|(name, _)| name).collect()
        }

        pub fn count(&self, name: &str) -> usize {
            self.inner
                .events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .filter(|(n, _)| n == name)
                .count()
        }

        pub fn last(&self, name: &str) -> Option<EventData> {
            self.inner
                .events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, data)| data.clone())
        }

        /// Wait until `name` has been recorded at least `count` times.
        ///
        /// Returns `false` if `timeout` elapses first.
        pub async fn wait_for(&self, name: &str, count: usize, timeout: Duration) -> bool {
            let deadline = tokio::time::Instant::now() + timeout;
            loop {
                let notified = self.inner.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if self.count(name) >= count {
                    return true;
                }
                if tokio::time::timeout_at(deadline, notified).await.is_err() {
                    return self.count(name) >= count;
                }
            }
        }
    }
}
