//! Accelerator error types.
//!
//! Every variant carries a stable name (`error_name`) that hosts can match
//! on, and a client message used as the payload of `error` events.

use common::error::SdkError;
use thiserror::Error;

/// Message raised for connectivity failures while publishing.
pub const NETWORK_ERROR_MESSAGE: &str = "Check your network connection";

/// Message raised when admission control rejects a call.
pub const CONNECTION_LIMIT_MESSAGE: &str = "Session has reached its connection limit";

/// Accelerator error type.
///
/// Names:
/// - `Configuration`: `invalidParameters`
/// - `ConnectionLimit`: `connectionLimit`
/// - `Network`: `networkError`
/// - `Sdk`: `sdkError`
/// - `NotConnected`: `notConnected`
/// - `NotFound`: `notFound`
/// - `CallInProgress`: `callInProgress`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcceleratorError {
    /// Missing or invalid credential, option or token.
    #[error("{0}")]
    Configuration(String),

    /// Admission control rejected the call.
    #[error("Session has reached its connection limit")]
    ConnectionLimit,

    /// The SDK reported a network failure (code 1010).
    #[error("Network error: {0}")]
    Network(String),

    /// Any other SDK failure.
    #[error("SDK error: {0}")]
    Sdk(#[from] SdkError),

    /// Operation requires an active session connection.
    #[error("{0}")]
    NotConnected(String),

    /// No publisher or subscriber matches the lookup.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A call is already being started or is active.
    #[error("A call is already in progress")]
    CallInProgress,
}

impl AcceleratorError {
    /// Stable error name.
    pub fn error_name(&self) -> &'static str {
        match self {
            AcceleratorError::Configuration(_) => "invalidParameters",
            AcceleratorError::ConnectionLimit => "connectionLimit",
            AcceleratorError::Network(_) => "networkError",
            AcceleratorError::Sdk(_) => "sdkError",
            AcceleratorError::NotConnected(_) => "notConnected",
            AcceleratorError::NotFound(_) => "notFound",
            AcceleratorError::CallInProgress => "callInProgress",
        }
    }

    /// Message suitable for the `error` event payload.
    pub fn client_message(&self) -> String {
        match self {
            AcceleratorError::Network(_) => NETWORK_ERROR_MESSAGE.to_string(),
            AcceleratorError::ConnectionLimit => CONNECTION_LIMIT_MESSAGE.to_string(),
            AcceleratorError::Sdk(e) => e.message.clone(),
            AcceleratorError::Configuration(msg)
            | AcceleratorError::NotConnected(msg)
            | AcceleratorError::NotFound(msg) => msg.clone(),
            AcceleratorError::CallInProgress => "A call is already in progress".to_string(),
        }
    }

    /// Classify an SDK failure raised while publishing.
    pub fn from_publish_error(err: SdkError) -> Self {
        if err.is_network_error() {
            AcceleratorError::Network(err.message)
        } else {
            AcceleratorError::Sdk(err)
        }
    }
}

/// Result type alias using `AcceleratorError`
pub type Result<T> = std::result::Result<T, AcceleratorError>;
