//! Typed errors for the recommendation system.
//!
//! Each variant maps onto the `{status, message}` descriptor returned to
//! callers alongside an empty track list.

use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::spotify::SpotifyError;

#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
#[serde(tag = "type", content = "message")]
pub enum RecommendationError {
    /// Request carried no seeds; rejected before any network call.
    #[error("at least one seed required")]
    NoSeeds,

    #[error("at most 5 seeds allowed, got {0}")]
    TooManySeeds(usize),

    /// Every seed expanded to nothing.
    #[error("no tracks found")]
    NoCandidates,

    /// The session could not produce an access token.
    #[error("{0}")]
    Auth(AuthError),

    /// A lookup failed while expanding a seed.
    #[error("Provider error ({status}): {message}")]
    Provider { status: u16, message: String },
}

impl RecommendationError {
    pub fn status(&self) -> u16 {
        match self {
            RecommendationError::NoSeeds | RecommendationError::TooManySeeds(_) => 400,
            RecommendationError::NoCandidates => 404,
            RecommendationError::Auth(e) => e.status(),
            RecommendationError::Provider { status, .. } => *status,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// Rejections when editing a [`SeedList`](super::types::SeedList).
#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
#[serde(tag = "type", content = "message")]
pub enum SeedError {
    #[error("at most {0} seeds allowed")]
    Full(usize),

    #[error("seed '{0}' is already selected")]
    Duplicate(String),
}

impl From<SpotifyError> for RecommendationError {
    fn from(e: SpotifyError) -> Self {
        match e {
            SpotifyError::Auth(auth) => RecommendationError::Auth(auth),
            other => RecommendationError::Provider {
                status: other.status(),
                message: other.to_string(),
            },
        }
    }
}
