//! Screen sharing.
//!
//! Publishes a second, screen-capture publisher next to the camera. At most
//! one share is active per instance. The share ends when `end` is called,
//! when the SDK reports `mediaStopped` for the publisher (the user stopped
//! the capture), or when the call is left.

use crate::communication::Communication;
use crate::containers::StreamContainers;
use crate::errors::AcceleratorError;
use crate::events::{AcceleratorEvent, EventBus, EventData};
use crate::gateway::SessionGateway;
use common::sdk::{Publisher, SessionEvent};
use common::types::{MediaProperties, PubSubRole, StreamType};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Raised when a screen publisher cannot be started.
pub const SCREEN_SHARING_ERROR_EVENT: &str = "screenSharingError";

/// SDK publisher event fired when the captured source goes away.
pub const MEDIA_STOPPED_EVENT: &str = "mediaStopped";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScreenShareError {
    #[error("Screen sharing is already active")]
    AlreadyActive,

    #[error("Screen sharing is not active")]
    NotActive,

    #[error("Error starting the screen sharing: {0}")]
    Start(#[source] AcceleratorError),
}

/// Screen sharing for one session.
pub struct ScreenSharing {
    gateway: SessionGateway,
    events: EventBus,
    containers: Arc<dyn StreamContainers>,
    properties: MediaProperties,
    starting: AtomicBool,
    publisher: Mutex<Option<Publisher>>,
}

impl std::fmt::Debug for ScreenSharing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScreenSharing")
            .field("publisher", &*self.current())
            .finish_non_exhaustive()
    }
}

impl ScreenSharing {
    /// Share through `communication`'s session, containers and screen
    /// properties.
    pub fn new(communication: &Communication) -> Arc<Self> {
        let gateway = communication.gateway().clone();
        let events = gateway.events().clone();
        events.register_event(SCREEN_SHARING_ERROR_EVENT);

        let sharing = Arc::new(Self {
            gateway,
            events,
            containers: Arc::clone(communication.containers()),
            properties: communication.screen_properties().clone(),
            starting: AtomicBool::new(false),
            publisher: Mutex::new(None),
        });
        Self::listen(&sharing);
        sharing
    }

    fn listen(this: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(this);
        this.events.on(
            MEDIA_STOPPED_EVENT,
            Arc::new(move |data: &EventData| {
                let (Some(sharing), EventData::Session(SessionEvent::Media { source_id, .. })) =
                    (weak.upgrade(), data)
                else {
                    return;
                };
                let ours = sharing
                    .current()
                    .as_ref()
                    .is_some_and(|p| p.id.as_str() == source_id.as_str());
                if ours {
                    info!(target: "acc.screen_sharing", "Captured source stopped");
                    // Only fails if another path ended the share first.
                    let _ = sharing.end();
                }
            }),
        );

        // Leaving the call unpublishes every screen publisher already.
        let weak: Weak<Self> = Arc::downgrade(this);
        this.events.on(
            AcceleratorEvent::LeaveSession,
            Arc::new(move |_: &EventData| {
                if let Some(sharing) = weak.upgrade() {
                    let ended = sharing.current().take();
                    if let Some(publisher) = ended {
                        sharing.events.trigger_event(
                            AcceleratorEvent::EndScreenShare,
                            &EventData::Publisher(publisher),
                        );
                    }
                }
            }),
        );
    }

    fn current(&self) -> MutexGuard<'_, Option<Publisher>> {
        self.publisher.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_active(&self) -> bool {
        self.current().is_some()
    }

    pub fn publisher(&self) -> Option<Publisher> {
        self.current().clone()
    }

    /// Start sharing. Raises `startScreenShare` on success and
    /// `screenSharingError` on failure.
    #[instrument(skip_all)]
    pub async fn start(
        &self,
        properties: Option<&MediaProperties>,
    ) -> Result<Publisher, ScreenShareError> {
        if self.is_active()
            || self
                .starting
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            return Err(ScreenShareError::AlreadyActive);
        }

        let container =
            self.containers
                .resolve(PubSubRole::Publisher, StreamType::Screen, None, None);
        let properties = self.properties.merged_opt(properties);
        let result = self
            .gateway
            .publish(&container, &properties, None, false)
            .await;

        match result {
            Ok(publisher) => {
                *self.current() = Some(publisher.clone());
                self.starting.store(false, Ordering::SeqCst);
                info!(target: "acc.screen_sharing", publisher_id = %publisher.id, "Screen share started");
                self.events.trigger_event(
                    AcceleratorEvent::StartScreenShare,
                    &EventData::Publisher(publisher.clone()),
                );
                Ok(publisher)
            }
            Err(e) => {
                self.starting.store(false, Ordering::SeqCst);
                warn!(target: "acc.screen_sharing", error = %e, "Failed to start screen share");
                self.events.trigger_event(
                    SCREEN_SHARING_ERROR_EVENT,
                    &EventData::Error(e.client_message()),
                );
                Err(ScreenShareError::Start(e))
            }
        }
    }

    /// Stop sharing and raise `endScreenShare`.
    pub fn end(&self) -> Result<(), ScreenShareError> {
        let publisher = self.current().take().ok_or(ScreenShareError::NotActive)?;
        self.gateway.unpublish(&publisher);
        info!(target: "acc.screen_sharing", publisher_id = %publisher.id, "Screen share ended");
        self.events.trigger_event(
            AcceleratorEvent::EndScreenShare,
            &EventData::Publisher(publisher),
        );
        Ok(())
    }
}
