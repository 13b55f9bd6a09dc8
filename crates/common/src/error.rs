//! Errors reported by the external video SDK.

use thiserror::Error;

/// Error code the SDK uses for connectivity failures while publishing.
pub const NETWORK_ERROR_CODE: i32 = 1010;

/// Failure reported through one of the SDK's error-first callbacks.
///
/// Adapters translate the SDK's native error object into this type; the
/// accelerator never inspects anything beyond `code` and `message`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {code})")]
pub struct SdkError {
    /// Numeric code assigned by the SDK.
    pub code: i32,
    /// Human-readable message from the SDK.
    pub message: String,
}

impl SdkError {
    /// Create a new SDK error.
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Whether the SDK classified this failure as a network problem.
    #[must_use]
    pub fn is_network_error(&self) -> bool {
        self.code == NETWORK_ERROR_CODE
    }
}

/// Result type alias using `SdkError`
pub type Result<T> = std::result::Result<T, SdkError>;
