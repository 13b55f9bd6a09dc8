//! Text chat over session signals.
//!
//! Messages travel as `text-chat` signals carrying a JSON [`ChatMessage`].
//! Until a remote participant is connected, outgoing messages are queued
//! and can be flushed with [`TextChat::deliver_unsent_messages`].
//!
//! Events raised on the bus:
//!
//! | Event | Payload |
//! |-------|---------|
//! | `messageSent` | `EventData::Chat` |
//! | `messageReceived` | `EventData::Chat` |
//! | `errorSendingMessage` | `EventData::Custom({error, message})` |
//! | `showTextChat` / `hideTextChat` | `EventData::Empty` |

use crate::errors::AcceleratorError;
use crate::events::{AcceleratorEvent, EventBus, EventData};
use crate::gateway::SessionGateway;
use chrono::{DateTime, Utc};
use common::sdk::{SessionEvent, SessionEventKind, Signal};
use common::types::{Connection, ConnectionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Signal type used for chat messages.
pub const TEXT_CHAT_SIGNAL: &str = "text-chat";

/// Default maximum message length, in characters.
pub const DEFAULT_LIMIT_CHARACTER_MESSAGE: usize = 160;

/// Default notice shown while no one else is connected.
pub const DEFAULT_WAITING_MESSAGE: &str = "Messages will be delivered once your contact arrives";

/// Events raised by the text chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextChatEvent {
    ErrorSendingMessage,
    ShowTextChat,
    HideTextChat,
    MessageReceived,
    MessageSent,
}

impl TextChatEvent {
    pub const ALL: [TextChatEvent; 5] = [
        TextChatEvent::ErrorSendingMessage,
        TextChatEvent::ShowTextChat,
        TextChatEvent::HideTextChat,
        TextChatEvent::MessageReceived,
        TextChatEvent::MessageSent,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            TextChatEvent::ErrorSendingMessage => "errorSendingMessage",
            TextChatEvent::ShowTextChat => "showTextChat",
            TextChatEvent::HideTextChat => "hideTextChat",
            TextChatEvent::MessageReceived => "messageReceived",
            TextChatEvent::MessageSent => "messageSent",
        }
    }
}

/// Local chat identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSender {
    pub id: String,
    pub alias: String,
}

impl ChatSender {
    pub fn new(id: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            alias: alias.into(),
        }
    }
}

/// A chat message as carried in the signal payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender_id: String,
    pub alias: String,
    pub message: String,
    pub sent_on: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TextChatOptions {
    pub sender: ChatSender,
    pub limit_character_message: usize,
    pub waiting_message: String,
    /// Enable and show the chat immediately, and keep it open after the
    /// call ends.
    pub always_open: bool,
}

impl TextChatOptions {
    pub fn new(sender: ChatSender) -> Self {
        Self {
            sender,
            limit_character_message: DEFAULT_LIMIT_CHARACTER_MESSAGE,
            waiting_message: DEFAULT_WAITING_MESSAGE.to_string(),
            always_open: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TextChatError {
    #[error("Message exceeds the {limit} character limit")]
    TooLong { limit: usize, message: ChatMessage },

    #[error("Error sending a message. {source}")]
    Send {
        message: ChatMessage,
        source: AcceleratorError,
    },
}

impl TextChatError {
    /// The message that could not be sent.
    pub fn chat_message(&self) -> &ChatMessage {
        match self {
            TextChatError::TooLong { message, .. } | TextChatError::Send { message, .. } => message,
        }
    }
}

/// Result of [`TextChat::send_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing to send.
    Empty,
    /// No remote participant yet; held for later delivery.
    Queued(ChatMessage),
    Sent(ChatMessage),
}

#[derive(Serialize)]
struct SendFailure<'a> {
    error: String,
    message: &'a ChatMessage,
}

#[derive(Debug, Default)]
struct ChatState {
    participants: BTreeSet<ConnectionId>,
    unsent: Vec<(ChatMessage, Option<Connection>)>,
    enabled: bool,
    displayed: bool,
}

/// Text chat attached to one session.
pub struct TextChat {
    gateway: SessionGateway,
    events: EventBus,
    options: TextChatOptions,
    state: Mutex<ChatState>,
}

impl std::fmt::Debug for TextChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextChat")
            .field("sender", &self.options.sender)
            .field("state", &*self.state())
            .finish_non_exhaustive()
    }
}

impl TextChat {
    /// Attach a chat to `gateway`'s session and register its events.
    pub fn new(gateway: &SessionGateway, options: TextChatOptions) -> Arc<Self> {
        let events = gateway.events().clone();
        events.register_events(TextChatEvent::ALL.iter().map(TextChatEvent::as_str));

        let chat = Arc::new(Self {
            gateway: gateway.clone(),
            events,
            options,
            state: Mutex::new(ChatState::default()),
        });
        Self::listen(&chat);
        if chat.options.always_open {
            chat.show();
        }
        chat
    }

    fn listen(this: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(this);
        this.events.on(
            SessionEventKind::ConnectionCreated,
            Arc::new(move |data: &EventData| {
                if let (Some(chat), EventData::Session(SessionEvent::ConnectionCreated(connection))) =
                    (weak.upgrade(), data)
                {
                    chat.on_connection_created(connection);
                }
            }),
        );

        let weak: Weak<Self> = Arc::downgrade(this);
        this.events.on(
            SessionEventKind::ConnectionDestroyed,
            Arc::new(move |data: &EventData| {
                if let (Some(chat), EventData::Session(SessionEvent::ConnectionDestroyed(connection))) =
                    (weak.upgrade(), data)
                {
                    chat.state().participants.remove(&connection.connection_id);
                }
            }),
        );

        let weak: Weak<Self> = Arc::downgrade(this);
        this.events.on(
            format!("signal:{TEXT_CHAT_SIGNAL}"),
            Arc::new(move |data: &EventData| {
                if let (Some(chat), EventData::Session(SessionEvent::Signal(signal))) =
                    (weak.upgrade(), data)
                {
                    chat.on_incoming(signal);
                }
            }),
        );

        let weak: Weak<Self> = Arc::downgrade(this);
        this.events.on(
            AcceleratorEvent::LeaveSession,
            Arc::new(move |_: &EventData| {
                if let Some(chat) = weak.upgrade() {
                    if !chat.options.always_open && chat.is_displayed() {
                        chat.hide();
                    }
                }
            }),
        );
    }

    fn state(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_connection_created(&self, connection: &Connection) {
        if self.gateway.is_me(connection) {
            return;
        }
        debug!(target: "acc.text_chat", connection_id = %connection.connection_id, "Remote participant joined");
        self.state()
            .participants
            .insert(connection.connection_id.clone());
    }

    fn on_incoming(&self, signal: &Signal) {
        if signal
            .from
            .as_ref()
            .is_some_and(|from| self.gateway.is_me(from))
        {
            return;
        }
        if !self.is_enabled() {
            debug!(target: "acc.text_chat", "Chat not enabled, message dropped");
            return;
        }
        match serde_json::from_str::<ChatMessage>(&signal.data) {
            Ok(message) => {
                self.events.trigger_event(
                    TextChatEvent::MessageReceived.as_str(),
                    &EventData::Chat(message),
                );
            }
            Err(e) => {
                warn!(target: "acc.text_chat", error = %e, "Malformed chat message");
            }
        }
    }

    pub fn sender(&self) -> &ChatSender {
        &self.options.sender
    }

    pub fn waiting_message(&self) -> &str {
        &self.options.waiting_message
    }

    /// Whether outgoing messages are being held for a remote participant.
    pub fn is_waiting(&self) -> bool {
        self.state().participants.is_empty()
    }

    pub fn unsent_count(&self) -> usize {
        self.state().unsent.len()
    }

    pub fn is_enabled(&self) -> bool {
        self.state().enabled
    }

    pub fn is_displayed(&self) -> bool {
        self.state().displayed
    }

    /// Show the chat, enabling it on first use.
    pub fn show(&self) {
        {
            let mut state = self.state();
            state.enabled = true;
            state.displayed = true;
        }
        self.events
            .trigger_event(TextChatEvent::ShowTextChat.as_str(), &EventData::Empty);
    }

    pub fn hide(&self) {
        self.state().displayed = false;
        self.events
            .trigger_event(TextChatEvent::HideTextChat.as_str(), &EventData::Empty);
    }

    fn raise_error(&self, error: &TextChatError) {
        let payload = serde_json::to_value(SendFailure {
            error: error.to_string(),
            message: error.chat_message(),
        })
        .unwrap_or_default();
        self.events.trigger_event(
            TextChatEvent::ErrorSendingMessage.as_str(),
            &EventData::Custom(payload),
        );
    }

    /// Send `text` to everyone, or only to `recipient`.
    #[instrument(skip_all, fields(direct = recipient.is_some()))]
    pub async fn send_message(
        &self,
        text: &str,
        recipient: Option<&Connection>,
    ) -> Result<SendOutcome, TextChatError> {
        if text.is_empty() {
            return Ok(SendOutcome::Empty);
        }

        let message = ChatMessage {
            sender_id: self.options.sender.id.clone(),
            alias: self.options.sender.alias.clone(),
            message: text.to_string(),
            sent_on: Utc::now(),
        };

        let limit = self.options.limit_character_message;
        if text.chars().count() > limit {
            let err = TextChatError::TooLong { limit, message };
            self.raise_error(&err);
            return Err(err);
        }

        self.deliver(message, recipient.cloned()).await
    }

    async fn deliver(
        &self,
        message: ChatMessage,
        recipient: Option<Connection>,
    ) -> Result<SendOutcome, TextChatError> {
        {
            let mut state = self.state();
            if state.participants.is_empty() {
                debug!(target: "acc.text_chat", "No remote participant, message queued");
                state.unsent.push((message.clone(), recipient));
                return Ok(SendOutcome::Queued(message));
            }
        }

        let payload = serde_json::to_value(&message).unwrap_or_default();
        match self
            .gateway
            .signal(TEXT_CHAT_SIGNAL, &payload, recipient.as_ref())
            .await
        {
            Ok(()) => {
                self.events.trigger_event(
                    TextChatEvent::MessageSent.as_str(),
                    &EventData::Chat(message.clone()),
                );
                Ok(SendOutcome::Sent(message))
            }
            Err(source) => {
                warn!(target: "acc.text_chat", error = %source, "Failed to send chat message");
                let err = TextChatError::Send { message, source };
                self.raise_error(&err);
                Err(err)
            }
        }
    }

    /// Retry every queued message. Returns how many were sent.
    ///
    /// Messages that still have no recipient go back on the queue; send
    /// failures are raised as `errorSendingMessage` and dropped.
    pub async fn deliver_unsent_messages(&self) -> usize {
        let queued = std::mem::take(&mut self.state().unsent);
        let mut sent = 0;
        for (message, recipient) in queued {
            if let Ok(SendOutcome::Sent(_)) = self.deliver(message, recipient).await {
                sent += 1;
            }
        }
        sent
    }
}
