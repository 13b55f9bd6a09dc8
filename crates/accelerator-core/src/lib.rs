//! Video Call Accelerator Library
//!
//! This library wraps a video SDK session and provides the building blocks
//! of a multi-party call:
//!
//! - Authoritative registry of streams, publishers and subscribers
//! - Session gateway that relays SDK notifications and serializes SDK calls
//! - Named-event bus for host and feature callbacks
//! - Call orchestration with admission control and auto-subscribe
//! - Optional feature packages (text chat, screen sharing)
//!
//! # Architecture
//!
//! ```text
//! VideoAccelerator (facade, one per session)
//! ├── EventBus (named events -> ordered callbacks)
//! ├── SessionGateway (owns the VideoSdk handle)
//! │   └── State (StreamRegistry: streams, stream map, publishers, subscribers)
//! └── Communication (call lifecycle, listens on the bus)
//!
//! SDK event -> gateway relay -> registry mutation -> bus notification
//! host call -> facade -> communication -> gateway -> SDK
//! ```
//!
//! # Key Design Decisions
//!
//! - **Registry first**: every registry mutation happens before the event that announces it
//! - **Record on success**: publishers and subscribers enter the registry only after the SDK confirms them
//! - **Unsubscribe is optimistic**: registry state is dropped before the SDK call, SDK errors are logged
//! - **Bus dispatch is synchronous**: callbacks run in registration order on a snapshot, each isolated
//!
//! # Modules
//!
//! - [`accelerator`] - Facade owning the bus, gateway and call orchestrator
//! - [`communication`] - Call lifecycle (start/end call, subscribe, admission)
//! - [`gateway`] - SDK session wrapper and event relay
//! - [`registry`] - Stream/publisher/subscriber bookkeeping
//! - [`events`] - Event names and the event bus
//! - [`features`] - Text chat and screen sharing
//! - [`config`] - Configuration from environment
//! - [`errors`] - Error types with stable names and client messages

pub mod accelerator;
pub mod communication;
pub mod config;
pub mod containers;
pub mod credential;
pub mod errors;
pub mod events;
pub mod features;
pub mod gateway;
pub mod observability;
pub mod registry;

pub use accelerator::{AcceleratorOptions, VideoAccelerator};
pub use communication::{Communication, CommunicationOptions, JoinResult};
pub use credential::Credential;
pub use errors::AcceleratorError;
pub use events::{AcceleratorEvent, Callback, EventBus, EventData, EventName};
pub use gateway::SessionGateway;
pub use registry::{State, StateSnapshot, StreamCollection};
