//! Secret types for session tokens and other credentials.
//!
//! Re-exports [`secrecy`] so adapters and the accelerator share one secret
//! type. Session tokens are bearer credentials: anyone holding one can join
//! the session with the role it grants, so they must never reach logs.
//!
//! `SecretString` implements `Debug` with redaction, so structs that derive
//! `Debug` around a token stay safe to print and to pass to `tracing`.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct Join {
//!     session_id: String,
//!     token: SecretString,
//! }
//!
//! let join = Join {
//!     session_id: "1_MX4xMjM0NX4".to_string(),
//!     token: SecretString::from("T1==cGFydG5lcl9pZD0"),
//! };
//!
//! assert!(!format!("{join:?}").contains("T1=="));
//! let token: &str = join.token.expose_secret();
//! assert!(token.starts_with("T1=="));
//! ```
//!
//! Only the gateway exposes the token, at the moment it is handed to the SDK.

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
