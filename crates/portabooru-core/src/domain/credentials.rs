//! Credentials for the remote board

use std::fmt;

use super::errors::DomainError;

/// Login name and API key used to authenticate every outbound request
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    api_key: String,
}

impl Credentials {
    /// Create a credential pair
    ///
    /// # Errors
    /// Returns [`DomainError::ValidationFailed`] if either part is blank
    pub fn new(
        username: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let username = username.into().trim().to_string();
        let api_key = api_key.into().trim().to_string();

        if username.is_empty() {
            return Err(DomainError::ValidationFailed(
                "username cannot be empty".to_string(),
            ));
        }
        if api_key.is_empty() {
            return Err(DomainError::ValidationFailed(
                "API key cannot be empty".to_string(),
            ));
        }

        Ok(Self { username, api_key })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

// The API key never ends up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("api_key", &"<redacted>")
            .finish()
    }
}
