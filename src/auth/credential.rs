use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::error::AuthError;
use super::store::{
    CredentialStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, TOKEN_EXPIRY_KEY,
};

/// Body returned by the token endpoint for both grant types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    /// Omitted by the provider when a refresh keeps the old refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
}

/// A 2xx token response that cannot become a credential.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidTokenResponse {
    #[error("token response carried no refresh token")]
    MissingRefreshToken,

    #[error("token lifetime out of range: {0}s")]
    LifetimeOutOfRange(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Build a credential from a token response issued at `issued_at`.
    ///
    /// `previous_refresh` is used when the response carries no refresh token.
    /// A negative lifetime, or one that overflows the calendar, is rejected.
    pub fn from_response(
        response: &TokenResponse,
        issued_at: DateTime<Utc>,
        previous_refresh: Option<&str>,
    ) -> Result<Self, InvalidTokenResponse> {
        let refresh_token = response
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(previous_refresh)
            .ok_or(InvalidTokenResponse::MissingRefreshToken)?
            .to_string();

        let expires_at = Some(response.expires_in)
            .filter(|secs| *secs >= 0)
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or(InvalidTokenResponse::LifetimeOutOfRange(response.expires_in))?;

        Ok(Self {
            access_token: response.access_token.clone(),
            refresh_token,
            expires_at,
        })
    }

    /// A token counts as expired once `now` enters the buffer window before
    /// the real expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        is_expired(self.expires_at, now, buffer)
    }

    pub(crate) fn load(store: &dyn CredentialStore) -> Result<Option<Self>, AuthError> {
        let refresh_token = match store.get(REFRESH_TOKEN_KEY)? {
            Some(token) => token,
            None => return Ok(None),
        };
        let access_token = store.get(ACCESS_TOKEN_KEY)?;
        let expires_at = store
            .get(TOKEN_EXPIRY_KEY)?
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single());

        // An access token without a readable expiry is unusable; keep the
        // refresh token and let the caller refresh.
        let (access_token, expires_at) = match (access_token, expires_at) {
            (Some(token), Some(at)) => (token, at),
            _ => (String::new(), DateTime::<Utc>::UNIX_EPOCH),
        };

        Ok(Some(Self {
            access_token,
            refresh_token,
            expires_at,
        }))
    }

    pub(crate) fn save(&self, store: &dyn CredentialStore) -> Result<(), AuthError> {
        store.set(
            TOKEN_EXPIRY_KEY,
            &self.expires_at.timestamp_millis().to_string(),
        )?;
        store.set(ACCESS_TOKEN_KEY, &self.access_token)?;
        store.set(REFRESH_TOKEN_KEY, &self.refresh_token)?;
        Ok(())
    }
}

pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>, buffer: Duration) -> bool {
    now >= expires_at - buffer
}
