//! Display profile shown next to the logged-in user, cached in the session store.

use serde::{Deserialize, Serialize};

use super::client::SpotifyClient;
use super::error::SpotifyError;
use super::models::UserProfile;
use crate::auth::store::DISPLAY_PROFILE_KEY;

pub const DEFAULT_DISPLAY_NAME: &str = "Spotify user";
pub const DEFAULT_AVATAR_URL: &str = "/default-avatar.png";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DisplayProfile {
    pub name: String,
    pub avatar_url: String,
    pub is_premium: bool,
}

impl From<&UserProfile> for DisplayProfile {
    fn from(profile: &UserProfile) -> Self {
        let name = profile
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_DISPLAY_NAME)
            .to_string();

        let avatar_url = profile
            .images
            .as_ref()
            .and_then(|images| images.first())
            .map(|i| i.url.clone())
            .unwrap_or_else(|| DEFAULT_AVATAR_URL.to_string());

        Self {
            name,
            avatar_url,
            is_premium: profile.product.as_deref() == Some("premium"),
        }
    }
}

impl SpotifyClient {
    /// Profile from the session store, if one was cached. A corrupt entry is dropped.
    pub fn cached_display_profile(&self) -> Result<Option<DisplayProfile>, SpotifyError> {
        let store = self.session().store();
        let Some(raw) = store.get(DISPLAY_PROFILE_KEY)? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(profile) => Ok(Some(profile)),
            Err(e) => {
                log::warn!("Discarding unreadable cached profile: {}", e);
                store.delete(DISPLAY_PROFILE_KEY)?;
                Ok(None)
            }
        }
    }

    /// Cached profile, or `/me` on a cache miss.
    ///
    /// A 401 from `/me` means the session is no longer usable and logs the user out.
    pub async fn display_profile(&self) -> Result<DisplayProfile, SpotifyError> {
        if let Some(profile) = self.cached_display_profile()? {
            return Ok(profile);
        }

        let response = self.fetch("/me", &[]).await?;
        if response.status == 401 {
            log::warn!("Profile request unauthorized, logging out");
            self.session().logout()?;
            return Err(SpotifyError::Status {
                status: 401,
                path: "/me".to_string(),
            });
        }
        if !(200..300).contains(&response.status) {
            return Err(SpotifyError::Status {
                status: response.status,
                path: "/me".to_string(),
            });
        }

        let raw: UserProfile =
            serde_json::from_value(response.body.unwrap_or(serde_json::Value::Null))?;
        let profile = DisplayProfile::from(&raw);

        let cached = self
            .session()
            .store_if_authenticated(DISPLAY_PROFILE_KEY, &serde_json::to_string(&profile)?)?;
        if cached {
            log::info!("Cached display profile for {}", profile.name);
        } else {
            log::debug!("Session ended during profile request, not caching");
        }

        Ok(profile)
    }
}
