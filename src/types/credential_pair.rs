use serde::{Deserialize, Serialize};

use crate::Token;

/// The access/refresh credential pair held by a
/// [`CredentialStore`](crate::CredentialStore).
///
/// Created on login, replaced wholesale when a refresh succeeds, and cleared
/// (both fields absent) when the session can no longer be renewed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    /// Short-lived credential attached to ordinary calls.
    #[serde(rename = "access_token", default, skip_serializing_if = "Option::is_none")]
    pub access: Option<Token>,

    /// Longer-lived credential used only to obtain a new access credential.
    #[serde(rename = "refresh_token", default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<Token>,
}

impl CredentialPair {
    /// Creates a pair from a freshly issued access credential.
    pub fn new(access: Token, refresh: Option<Token>) -> Self {
        Self {
            access: Some(access),
            refresh,
        }
    }

    /// A pair with both credentials absent.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the same pair with its access credential replaced.
    pub fn with_access(self, access: Token) -> Self {
        Self {
            access: Some(access),
            refresh: self.refresh,
        }
    }

    /// True when both credentials are absent.
    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }
}
