use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::SpotifyError;
use super::models::{
    Artist, Paging, PlayHistory, PlaylistSummary, SearchResponse, TimeRange, TopTracksResponse,
    Track, UserProfile,
};
use crate::auth::SessionManager;

/// Status plus decoded body of one Web API call.
#[derive(Debug, Clone)]
pub(crate) struct ApiResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl ApiResponse {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Authenticated wrapper around the Spotify Web API.
///
/// Every request asks the session for a valid access token first, so a
/// token inside the expiry buffer is refreshed before the call goes out.
#[derive(Clone)]
pub struct SpotifyClient {
    http: Client,
    session: SessionManager,
    api_url: String,
    market: String,
}

impl SpotifyClient {
    pub fn new(session: SessionManager) -> Result<Self, SpotifyError> {
        let config = session.config();
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("spotifusion/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            market: config.market.clone(),
            session,
        })
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    pub(crate) async fn fetch(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<ApiResponse, SpotifyError> {
        let token = self.session.get_valid_access_token().await?;
        let url = format!("{}{}", self.api_url, path);

        log::debug!("GET {} {:?}", path, query);

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Ok(ApiResponse { status, body: None });
        }

        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(&text)?)
        };

        Ok(ApiResponse { status, body })
    }

    /// GET `path` with the bearer token. Any non-2xx status yields `Ok(None)`.
    ///
    /// No retries: the caller decides what a missing body means.
    pub async fn authorized_get(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<Value>, SpotifyError> {
        let response = self.fetch(path, query).await?;
        if !response.is_success() {
            log::warn!("Spotify API {} returned HTTP {}", path, response.status);
            return Ok(None);
        }
        Ok(response.body)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SpotifyError> {
        let response = self.fetch(path, query).await?;
        if !response.is_success() {
            log::warn!("Spotify API {} returned HTTP {}", path, response.status);
            return Err(SpotifyError::Status {
                status: response.status,
                path: path.to_string(),
            });
        }

        let body = response.body.unwrap_or(Value::Null);
        Ok(serde_json::from_value(body)?)
    }

    pub async fn top_artists(
        &self,
        limit: u32,
        offset: u32,
        time_range: TimeRange,
    ) -> Result<Vec<Artist>, SpotifyError> {
        let page: Paging<Artist> = self
            .get_json("/me/top/artists", &top_query(limit, offset, time_range))
            .await?;
        Ok(page.items)
    }

    pub async fn top_tracks(
        &self,
        limit: u32,
        offset: u32,
        time_range: TimeRange,
    ) -> Result<Vec<Track>, SpotifyError> {
        let page: Paging<Track> = self
            .get_json("/me/top/tracks", &top_query(limit, offset, time_range))
            .await?;
        Ok(page.items)
    }

    pub async fn recently_played(&self, limit: u32) -> Result<Vec<PlayHistory>, SpotifyError> {
        let page: Paging<PlayHistory> = self
            .get_json(
                "/me/player/recently-played",
                &[("limit", clamp_limit(limit).to_string())],
            )
            .await?;
        Ok(page.items)
    }

    pub async fn playlists(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<PlaylistSummary>, SpotifyError> {
        let page: Paging<PlaylistSummary> = self
            .get_json(
                "/me/playlists",
                &[
                    ("limit", clamp_limit(limit).to_string()),
                    ("offset", offset.to_string()),
                ],
            )
            .await?;
        Ok(page.items)
    }

    /// Full-text track search, also used to expand genre seeds.
    pub async fn search_tracks(&self, q: &str, limit: u32) -> Result<Vec<Track>, SpotifyError> {
        let response: SearchResponse = self
            .get_json(
                "/search",
                &[
                    ("q", q.to_string()),
                    ("type", "track".to_string()),
                    ("limit", clamp_limit(limit).to_string()),
                ],
            )
            .await?;
        Ok(response.tracks.map(|p| p.items).unwrap_or_default())
    }

    /// Artists and tracks matching free text, for seed pickers.
    pub async fn search_suggestions(
        &self,
        q: &str,
        limit: u32,
    ) -> Result<SearchResponse, SpotifyError> {
        self.get_json(
            "/search",
            &[
                ("q", q.to_string()),
                ("type", "artist,track".to_string()),
                ("limit", clamp_limit(limit).to_string()),
            ],
        )
        .await
    }

    pub async fn artist_top_tracks(&self, artist_id: &str) -> Result<Vec<Track>, SpotifyError> {
        let response: TopTracksResponse = self
            .get_json(
                &resource_path("artists", artist_id, Some("top-tracks")),
                &[("market", self.market.clone())],
            )
            .await?;
        Ok(response.tracks)
    }

    pub async fn track(&self, track_id: &str) -> Result<Track, SpotifyError> {
        self.get_json(&resource_path("tracks", track_id, None), &[])
            .await
    }

    pub async fn current_user_profile(&self) -> Result<UserProfile, SpotifyError> {
        self.get_json("/me", &[]).await
    }
}

/// The Web API caps page sizes at 50.
fn clamp_limit(limit: u32) -> u32 {
    limit.clamp(1, 50)
}

fn top_query(limit: u32, offset: u32, time_range: TimeRange) -> Vec<(&'static str, String)> {
    vec![
        ("offset", offset.to_string()),
        ("limit", clamp_limit(limit).to_string()),
        ("time_range", time_range.as_str().to_string()),
    ]
}

/// `/{collection}/{id}[/{suffix}]` with the id percent-encoded.
fn resource_path(collection: &str, id: &str, suffix: Option<&str>) -> String {
    let id = urlencoding::encode(id);
    match suffix {
        Some(suffix) => format!("/{}/{}/{}", collection, id, suffix),
        None => format!("/{}/{}", collection, id),
    }
}
