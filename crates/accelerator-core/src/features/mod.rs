//! Optional feature packages.
//!
//! Features attach to a running accelerator through its gateway and event
//! bus only; they never reach into each other.
//!
//! - [`text_chat`] - Chat messages over session signals
//! - [`screen_sharing`] - Publishing a screen capture alongside the camera

pub mod screen_sharing;
pub mod text_chat;

pub use screen_sharing::ScreenSharing;
pub use text_chat::{ChatMessage, ChatSender, TextChat, TextChatError, TextChatOptions};
