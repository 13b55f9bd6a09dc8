//! Accelerator configuration.
//!
//! Configuration is loaded from environment variables. The session token is
//! redacted in Debug output.

use crate::accelerator::AcceleratorOptions;
use crate::communication::CommunicationOptions;
use crate::credential::Credential;
use crate::errors::AcceleratorError;
use crate::features::text_chat::{ChatSender, TextChatOptions};
use common::secret::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default application name reported by the accelerator.
pub const DEFAULT_APPLICATION_NAME: &str = "accelerator-core";

/// Default maximum length of a chat message, in characters.
pub const DEFAULT_CHAT_CHARACTER_LIMIT: usize = 160;

/// Accelerator configuration.
#[derive(Clone)]
pub struct Config {
    /// Video platform API key.
    pub api_key: String,

    /// Session to join.
    pub session_id: String,

    /// Session token.
    /// Protected by `SecretString` to prevent accidental logging.
    pub token: SecretString,

    /// Maximum camera parties in a call. `None` means unlimited.
    pub connection_limit: Option<usize>,

    /// Subscribe to remote streams automatically (default: true).
    pub auto_subscribe: bool,

    /// Never publish the local camera (default: false).
    pub subscribe_only: bool,

    /// Application name (default: "accelerator-core").
    pub application_name: String,

    /// Maximum chat message length (default: 160).
    pub chat_character_limit: usize,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key)
            .field("session_id", &self.session_id)
            .field("token", &"[REDACTED]")
            .field("connection_limit", &self.connection_limit)
            .field("auto_subscribe", &self.auto_subscribe)
            .field("subscribe_only", &self.subscribe_only)
            .field("application_name", &self.application_name)
            .field("chat_character_limit", &self.chat_character_limit)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

fn required(vars: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    vars.get(key)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_or<T: FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}"))),
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let api_key = required(vars, "OT_API_KEY")?;
        let session_id = required(vars, "OT_SESSION_ID")?;
        let token = SecretString::from(required(vars, "OT_TOKEN")?);

        // 0 disables the limit
        let connection_limit = parse_or(vars, "ACC_CONNECTION_LIMIT", 0usize)?;
        let connection_limit = (connection_limit > 0).then_some(connection_limit);

        let auto_subscribe = parse_or(vars, "ACC_AUTO_SUBSCRIBE", true)?;
        let subscribe_only = parse_or(vars, "ACC_SUBSCRIBE_ONLY", false)?;

        let application_name = vars
            .get("ACC_APPLICATION_NAME")
            .cloned()
            .unwrap_or_else(|| DEFAULT_APPLICATION_NAME.to_string());

        let chat_character_limit =
            parse_or(vars, "ACC_CHAT_CHARACTER_LIMIT", DEFAULT_CHAT_CHARACTER_LIMIT)?;
        if chat_character_limit == 0 {
            return Err(ConfigError::InvalidValue(
                "ACC_CHAT_CHARACTER_LIMIT must be positive".to_string(),
            ));
        }

        Ok(Config {
            api_key,
            session_id,
            token,
            connection_limit,
            auto_subscribe,
            subscribe_only,
            application_name,
            chat_character_limit,
        })
    }

    /// Text chat options for `sender`, using the configured character limit.
    pub fn text_chat_options(&self, sender: ChatSender) -> TextChatOptions {
        TextChatOptions {
            limit_character_message: self.chat_character_limit,
            ..TextChatOptions::new(sender)
        }
    }

    /// Build accelerator options. Fails if a credential is empty.
    pub fn into_options(self) -> Result<AcceleratorOptions, AcceleratorError> {
        let credentials = Credential::new(
            self.api_key,
            self.session_id,
            self.token.expose_secret(),
        )?;
        Ok(AcceleratorOptions {
            credentials,
            communication: CommunicationOptions {
                connection_limit: self.connection_limit,
                auto_subscribe: self.auto_subscribe,
                subscribe_only: self.subscribe_only,
                ..CommunicationOptions::default()
            },
            stream_containers: None,
            application_name: self.application_name,
        })
    }
}
