use serde::Serialize;
use thiserror::Error;

use super::store::StoreError;

/// Failures of the credential lifecycle.
///
/// `Clone` because a single refresh outcome is handed to every caller that
/// was waiting on it.
#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
#[serde(tag = "type", content = "message")]
pub enum AuthError {
    /// No refresh token is stored.
    #[error("User not authenticated")]
    NotAuthenticated,

    /// The redirect arrived without a verifier from `begin_login`.
    #[error("No code verifier found in storage")]
    MissingVerifier,

    /// The authorization redirect carried no usable code.
    #[error("Authorization was not granted: {0}")]
    AuthorizationDenied(String),

    /// The token endpoint refused the authorization code.
    #[error("Token exchange failed ({status}): {message}")]
    CodeRejected { status: u16, message: String },

    /// The refresh token was refused; the stored session has been purged.
    #[error("Token refresh rejected ({status}): {message}")]
    RefreshRejected { status: u16, message: String },

    /// Transport failure, timeout or 5xx from the accounts service.
    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AuthError {
    /// Whether retrying later may succeed without a new login.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::Network(_))
    }

    /// HTTP-like status for display to the user.
    pub fn status(&self) -> u16 {
        match self {
            AuthError::CodeRejected { status, .. } | AuthError::RefreshRejected { status, .. } => {
                *status
            }
            AuthError::Network(_) => 503,
            AuthError::Storage(_) | AuthError::InvalidConfig(_) => 500,
            AuthError::NotAuthenticated
            | AuthError::MissingVerifier
            | AuthError::AuthorizationDenied(_) => 401,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Storage(e.to_string())
    }
}
