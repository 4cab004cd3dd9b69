use async_trait::async_trait;

use super::types::Seed;
use crate::spotify::{SpotifyClient, SpotifyError, Track};

/// Lookups the engine needs to expand seeds into candidate tracks.
#[async_trait]
pub trait TrackSource: Send + Sync {
    /// Full-text track search for the genre string.
    async fn genre_tracks(&self, genre: &str, limit: u32) -> Result<Vec<Track>, SpotifyError>;

    async fn artist_top_tracks(&self, artist_id: &str) -> Result<Vec<Track>, SpotifyError>;

    async fn track(&self, track_id: &str) -> Result<Track, SpotifyError>;

    /// Artist and track seeds matching free text.
    async fn suggest_seeds(&self, query: &str, limit: u32) -> Result<Vec<Seed>, SpotifyError>;
}

#[async_trait]
impl TrackSource for SpotifyClient {
    async fn genre_tracks(&self, genre: &str, limit: u32) -> Result<Vec<Track>, SpotifyError> {
        self.search_tracks(genre, limit).await
    }

    async fn artist_top_tracks(&self, artist_id: &str) -> Result<Vec<Track>, SpotifyError> {
        SpotifyClient::artist_top_tracks(self, artist_id).await
    }

    async fn track(&self, track_id: &str) -> Result<Track, SpotifyError> {
        SpotifyClient::track(self, track_id).await
    }

    async fn suggest_seeds(&self, query: &str, limit: u32) -> Result<Vec<Seed>, SpotifyError> {
        let response = self.search_suggestions(query, limit).await?;

        let artists = response
            .artists
            .map(|p| p.items)
            .unwrap_or_default()
            .into_iter()
            .map(|a| Seed::artist(a.id, a.name));
        let tracks = response
            .tracks
            .map(|p| p.items)
            .unwrap_or_default()
            .into_iter()
            .map(|t| {
                let label = match t.primary_artist() {
                    Some(artist) => format!("{} - {}", t.name, artist.name),
                    None => t.name.clone(),
                };
                Seed::track(t.id, label)
            });

        Ok(artists.chain(tracks).collect())
    }
}
