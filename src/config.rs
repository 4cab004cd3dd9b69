use std::path::PathBuf;
use std::time::Duration;

use crate::errors::AppError;

pub const APP_NAME: &str = "spotifusion";
pub const ACCOUNTS_BASE_URL: &str = "https://accounts.spotify.com";
pub const API_BASE_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_MARKET: &str = "US";
pub const REQUEST_TIMEOUT_SECONDS: u64 = 10;
pub const TOKEN_EXPIRY_BUFFER_SECONDS: i64 = 5 * 60;
pub const REFRESH_ATTEMPTS: u32 = 3;
pub const REFRESH_RETRY_DELAY_MS: u64 = 500;

pub const DEFAULT_SCOPES: &[&str] = &[
    "playlist-read-private",
    "playlist-read-collaborative",
    "user-top-read",
    "user-read-recently-played",
];

pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

pub fn get_session_file_path() -> PathBuf {
    get_config_dir().join("session.json")
}

/// Client registration and endpoint settings shared by the session manager
/// and the API client.
#[derive(Clone, Debug)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub accounts_url: String,
    pub api_url: String,
    pub market: String,
    pub request_timeout: Duration,
    /// Safety margin subtracted from the expiry before a token counts as stale.
    pub expiry_buffer: chrono::Duration,
    pub refresh_attempts: u32,
    pub refresh_retry_delay: Duration,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            redirect_uri: String::new(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            accounts_url: ACCOUNTS_BASE_URL.to_string(),
            api_url: API_BASE_URL.to_string(),
            market: DEFAULT_MARKET.to_string(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECONDS),
            expiry_buffer: chrono::Duration::seconds(TOKEN_EXPIRY_BUFFER_SECONDS),
            refresh_attempts: REFRESH_ATTEMPTS,
            refresh_retry_delay: Duration::from_millis(REFRESH_RETRY_DELAY_MS),
        }
    }
}

impl SpotifyConfig {
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            ..Self::default()
        }
    }

    /// Build a config from `SPOTIFY_*` environment variables.
    ///
    /// `SPOTIFY_CLIENT_ID` and `SPOTIFY_REDIRECT_URI` are required, everything
    /// else falls back to the defaults.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AppError::Config(format!("{} is not set", key)))
        };

        let mut config = Self::new(
            required("SPOTIFY_CLIENT_ID")?,
            required("SPOTIFY_REDIRECT_URI")?,
        );

        if let Some(scopes) = lookup("SPOTIFY_SCOPES") {
            config.scopes = scopes
                .split([' ', ','])
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(market) = lookup("SPOTIFY_MARKET") {
            config.market = market;
        }
        if let Some(url) = lookup("SPOTIFY_ACCOUNTS_URL") {
            config.accounts_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = lookup("SPOTIFY_API_URL") {
            config.api_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = lookup("SPOTIFUSION_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                AppError::Config(format!("SPOTIFUSION_TIMEOUT_SECS is not a number: {}", secs))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn authorize_endpoint(&self) -> String {
        format!("{}/authorize", self.accounts_url)
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/api/token", self.accounts_url)
    }

    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}
