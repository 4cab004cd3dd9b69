use super::error::SpotifyError;

/// Resource kinds that can appear in a Spotify link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Artist,
    Track,
    Album,
    Playlist,
}

impl LinkKind {
    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "artist" => Some(LinkKind::Artist),
            "track" => Some(LinkKind::Track),
            "album" => Some(LinkKind::Album),
            "playlist" => Some(LinkKind::Playlist),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyLink {
    pub kind: LinkKind,
    pub id: String,
}

/// Spotify ids are 22 base-62 characters.
pub fn is_spotify_id(candidate: &str) -> bool {
    candidate.len() == 22 && candidate.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Extract kind and id from the various Spotify link formats:
///
/// - `spotify:track:{id}`
/// - `https://open.spotify.com/track/{id}?si=...`
/// - `https://open.spotify.com/intl-fr/artist/{id}`
pub fn parse_link(input: &str) -> Result<SpotifyLink, SpotifyError> {
    let trimmed = input.trim();

    if let Some(rest) = trimmed.strip_prefix("spotify:") {
        let mut parts = rest.splitn(2, ':');
        if let (Some(kind), Some(id)) = (parts.next(), parts.next()) {
            if let Some(kind) = LinkKind::from_segment(kind) {
                if is_spotify_id(id) {
                    return Ok(SpotifyLink {
                        kind,
                        id: id.to_string(),
                    });
                }
            }
        }
    }

    if trimmed.contains("spotify.link/") {
        return Err(SpotifyError::InvalidUrl(
            "Share links are not supported. Please use the full open.spotify.com URL.".to_string(),
        ));
    }

    if let Some(path) = trimmed.split("open.spotify.com/").nth(1) {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        // Localised URLs carry an `intl-xx` prefix before the kind.
        for pair in segments.windows(2) {
            if let Some(kind) = LinkKind::from_segment(pair[0]) {
                if is_spotify_id(pair[1]) {
                    return Ok(SpotifyLink {
                        kind,
                        id: pair[1].to_string(),
                    });
                }
            }
        }
    }

    Err(SpotifyError::InvalidUrl(format!(
        "Could not extract a Spotify id from: {}",
        input
    )))
}
