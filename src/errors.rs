use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::recommendations::{RecommendationError, SeedError};
use crate::spotify::SpotifyError;

#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "message")]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Internal(format!("Serialization error: {}", e))
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Storage(msg) => AppError::Storage(msg),
            AuthError::InvalidConfig(msg) => AppError::Config(msg),
            e if e.is_transient() => AppError::Network(e.to_string()),
            e => AppError::Auth(e.to_string()),
        }
    }
}

impl From<SpotifyError> for AppError {
    fn from(e: SpotifyError) -> Self {
        match e {
            SpotifyError::Auth(auth) => auth.into(),
            SpotifyError::Network(msg) => AppError::Network(msg),
            SpotifyError::InvalidUrl(msg) => AppError::Validation(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<RecommendationError> for AppError {
    fn from(e: RecommendationError) -> Self {
        match e {
            RecommendationError::NoSeeds | RecommendationError::TooManySeeds(_) => {
                AppError::Validation(e.to_string())
            }
            RecommendationError::NoCandidates => AppError::NotFound(e.to_string()),
            RecommendationError::Auth(auth) => auth.into(),
            RecommendationError::Provider { .. } => AppError::Network(e.to_string()),
        }
    }
}

impl From<SeedError> for AppError {
    fn from(e: SeedError) -> Self {
        AppError::Validation(e.to_string())
    }
}
