//! Data types for the recommendation system.

use serde::{Deserialize, Serialize};

use super::errors::{RecommendationError, SeedError};
use crate::spotify::{parse_link, LinkKind, SpotifyError, Track};

/// Upper bound on seeds per request.
pub const MAX_SEEDS: usize = 5;

/// Tracks returned when the request does not say otherwise.
pub const DEFAULT_LIMIT: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedKind {
    Genre,
    Artist,
    Track,
}

/// A user-chosen starting point for recommendations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seed {
    pub id: String,
    pub label: String,
    pub kind: SeedKind,
}

impl Seed {
    pub fn new(kind: SeedKind, id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind,
        }
    }

    pub fn genre(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(SeedKind::Genre, id.clone(), id)
    }

    pub fn artist(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(SeedKind::Artist, id, label)
    }

    pub fn track(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(SeedKind::Track, id, label)
    }

    /// Build an artist or track seed from a `spotify:` URI or open.spotify.com URL.
    /// The label defaults to the id.
    pub fn from_link(input: &str) -> Result<Self, SpotifyError> {
        let link = parse_link(input)?;
        let kind = match link.kind {
            LinkKind::Artist => SeedKind::Artist,
            LinkKind::Track => SeedKind::Track,
            other => {
                return Err(SpotifyError::InvalidUrl(format!(
                    "{:?} links cannot be used as seeds",
                    other
                )))
            }
        };
        Ok(Self::new(kind, link.id.clone(), link.id))
    }
}

/// Genre shortcut offered by seed pickers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Genre {
    pub id: &'static str,
    pub label: &'static str,
}

impl Genre {
    pub fn seed(&self) -> Seed {
        Seed::new(SeedKind::Genre, self.id, self.label)
    }
}

pub const POPULAR_GENRES: &[Genre] = &[
    Genre { id: "pop", label: "Pop" },
    Genre { id: "rock", label: "Rock" },
    Genre { id: "hip-hop", label: "Hip-Hop" },
    Genre { id: "electronic", label: "Electronic" },
    Genre { id: "jazz", label: "Jazz" },
    Genre { id: "classical", label: "Classical" },
    Genre { id: "r-n-b", label: "R&B" },
    Genre { id: "country", label: "Country" },
];

/// Ordered, bounded, id-unique seed collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Seed>", into = "Vec<Seed>")]
pub struct SeedList {
    seeds: Vec<Seed>,
}

impl SeedList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, seed: Seed) -> Result<(), SeedError> {
        if self.contains(&seed.id) {
            return Err(SeedError::Duplicate(seed.id));
        }
        if self.seeds.len() >= MAX_SEEDS {
            return Err(SeedError::Full(MAX_SEEDS));
        }
        self.seeds.push(seed);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<Seed> {
        let index = self.seeds.iter().position(|s| s.id == id)?;
        Some(self.seeds.remove(index))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seeds.iter().any(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.seeds.len() >= MAX_SEEDS
    }

    pub fn iter(&self) -> impl Iterator<Item = &Seed> {
        self.seeds.iter()
    }

    pub fn as_slice(&self) -> &[Seed] {
        &self.seeds
    }

    pub fn ids_of(&self, kind: SeedKind) -> Vec<&str> {
        self.seeds
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.id.as_str())
            .collect()
    }

    pub fn genre_ids(&self) -> Vec<&str> {
        self.ids_of(SeedKind::Genre)
    }

    pub fn artist_ids(&self) -> Vec<&str> {
        self.ids_of(SeedKind::Artist)
    }

    pub fn track_ids(&self) -> Vec<&str> {
        self.ids_of(SeedKind::Track)
    }
}

impl TryFrom<Vec<Seed>> for SeedList {
    type Error = SeedError;

    fn try_from(seeds: Vec<Seed>) -> Result<Self, Self::Error> {
        let mut list = SeedList::new();
        for seed in seeds {
            list.push(seed)?;
        }
        Ok(list)
    }
}

impl From<SeedList> for Vec<Seed> {
    fn from(list: SeedList) -> Self {
        list.seeds
    }
}

/// Synthetic {danceability, energy, valence} triple, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub danceability: f64,
    pub energy: f64,
    pub valence: f64,
}

impl FeatureVector {
    /// Euclidean distance.
    pub fn distance(&self, other: &FeatureVector) -> f64 {
        let d = self.danceability - other.danceability;
        let e = self.energy - other.energy;
        let v = self.valence - other.valence;
        (d * d + e * e + v * v).sqrt()
    }
}

/// Desired feature values; each defaults to 0.5.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetVector {
    pub danceability: f64,
    pub energy: f64,
    pub valence: f64,
}

impl Default for TargetVector {
    fn default() -> Self {
        Self::new(0.5, 0.5, 0.5)
    }
}

impl TargetVector {
    /// Values are clamped into [0, 1]; NaN becomes 0.5.
    pub fn new(danceability: f64, energy: f64, valence: f64) -> Self {
        let clamp = |x: f64| if x.is_nan() { 0.5 } else { x.clamp(0.0, 1.0) };
        Self {
            danceability: clamp(danceability),
            energy: clamp(energy),
            valence: clamp(valence),
        }
    }

    pub fn as_features(&self) -> FeatureVector {
        FeatureVector {
            danceability: self.danceability,
            energy: self.energy,
            valence: self.valence,
        }
    }
}

/// A track in the candidate pool, without any score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTrack {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub duration_ms: u64,
    pub cover_url: Option<String>,
    pub uri: String,
}

impl From<Track> for CandidateTrack {
    fn from(track: Track) -> Self {
        let cover_url = track.cover_url().map(String::from);
        Self {
            artists: track.artists.into_iter().map(|a| a.name).collect(),
            album: track.album.map(|a| a.name),
            id: track.id,
            name: track.name,
            duration_ms: track.duration_ms,
            cover_url,
            uri: track.uri,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub seeds: Vec<Seed>,
    #[serde(default)]
    pub target: TargetVector,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

impl RecommendationRequest {
    pub fn new(seeds: impl Into<Vec<Seed>>) -> Self {
        Self {
            seeds: seeds.into(),
            target: TargetVector::default(),
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_target(mut self, target: TargetVector) -> Self {
        self.target = target;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// A zero limit falls back to the default.
    pub fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            DEFAULT_LIMIT
        } else {
            self.limit
        }
    }
}

impl From<SeedList> for RecommendationRequest {
    fn from(seeds: SeedList) -> Self {
        Self::new(Vec::from(seeds))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub status: u16,
    pub message: String,
}

impl From<&RecommendationError> for ErrorDescriptor {
    fn from(e: &RecommendationError) -> Self {
        Self {
            status: e.status(),
            message: e.message(),
        }
    }
}

/// Ranked tracks, or an empty list plus the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub tracks: Vec<CandidateTrack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,
}

impl RecommendationResult {
    pub fn ok(tracks: Vec<CandidateTrack>) -> Self {
        Self {
            tracks,
            error: None,
        }
    }

    pub fn failed(error: &RecommendationError) -> Self {
        Self {
            tracks: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
