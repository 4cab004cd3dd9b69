use serde::Serialize;
use thiserror::Error;

use crate::auth::{AuthError, StoreError};

/// Error types for Spotify Web API operations
#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
#[serde(tag = "type", content = "message")]
pub enum SpotifyError {
    /// No valid access token could be obtained.
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Network error: {0}")]
    Network(String),

    /// The API answered with a non-2xx status.
    #[error("Spotify returned HTTP {status} for {path}")]
    Status { status: u16, path: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl SpotifyError {
    pub fn status(&self) -> u16 {
        match self {
            SpotifyError::Auth(e) => e.status(),
            SpotifyError::Network(_) => 503,
            SpotifyError::Status { status, .. } => *status,
            SpotifyError::Parse(_) => 502,
            SpotifyError::InvalidUrl(_) => 400,
        }
    }
}

impl From<reqwest::Error> for SpotifyError {
    fn from(e: reqwest::Error) -> Self {
        SpotifyError::Network(e.to_string())
    }
}

impl From<StoreError> for SpotifyError {
    fn from(e: StoreError) -> Self {
        SpotifyError::Auth(AuthError::from(e))
    }
}

impl From<serde_json::Error> for SpotifyError {
    fn from(e: serde_json::Error) -> Self {
        SpotifyError::Parse(e.to_string())
    }
}
