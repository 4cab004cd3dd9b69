//! Spotify Web API integration: an OAuth2 PKCE session with refresh-before-expiry
//! and a seed-based track recommendation engine.

pub mod auth;
pub mod config;
pub mod errors;
pub mod recommendations;
pub mod spotify;

#[cfg(test)]
mod test_support;

pub use auth::{AuthError, SessionManager};
pub use config::SpotifyConfig;
pub use errors::AppError;
pub use recommendations::{RecommendationEngine, RecommendationRequest, RecommendationResult};
pub use spotify::SpotifyClient;
