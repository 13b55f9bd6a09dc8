//! Session credentials.

use crate::errors::{AcceleratorError, Result};
use common::secret::SecretString;

/// Credentials for one participant in one session.
///
/// Validated on construction and immutable afterwards. The token is held
/// as a [`SecretString`], so `Debug` output never contains it.
#[derive(Debug, Clone)]
pub struct Credential {
    api_key: String,
    session_id: String,
    token: SecretString,
}

impl Credential {
    /// Validate and build credentials.
    ///
    /// Fields are checked in the order `apiKey`, `sessionId`, `token`; the
    /// first empty one is named in the error.
    pub fn new(
        api_key: impl Into<String>,
        session_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        let session_id = session_id.into();
        let token = token.into();

        for (field, value) in [
            ("apiKey", &api_key),
            ("sessionId", &session_id),
            ("token", &token),
        ] {
            if value.trim().is_empty() {
                return Err(AcceleratorError::Configuration(format!(
                    "{field} is a required credential"
                )));
            }
        }

        Ok(Self {
            api_key,
            session_id,
            token: SecretString::from(token),
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn token(&self) -> &SecretString {
        &self.token
    }
}
