//! Recommendation engine implementation.
//!
//! Generates a ranked track list by:
//! 1. Expanding each seed into tracks (genre search, artist top tracks,
//!    track -> primary artist -> top tracks)
//! 2. Merging everything into one pool, first occurrence of an id wins
//! 3. Scoring each candidate against the target with synthetic features
//! 4. Returning the closest `limit` tracks

use futures_util::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;

use super::errors::RecommendationError;
use super::features::estimate_features;
use super::source::TrackSource;
use super::types::{
    CandidateTrack, RecommendationRequest, RecommendationResult, Seed, SeedKind, SeedList,
    TargetVector, MAX_SEEDS, POPULAR_GENRES,
};
use crate::spotify::Track;

/// Tracks requested per genre search.
pub const GENRE_SEARCH_LIMIT: u32 = 50;

/// Maximum number of seed suggestions returned to a picker.
pub const MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExpansionMode {
    /// One seed at a time, in order.
    #[default]
    Sequential,
    /// All seeds at once; results are merged back in seed order.
    Concurrent,
}

pub struct RecommendationEngine {
    source: Arc<dyn TrackSource>,
    mode: ExpansionMode,
}

impl RecommendationEngine {
    pub fn new(source: Arc<dyn TrackSource>) -> Self {
        Self {
            source,
            mode: ExpansionMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: ExpansionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Generate recommendations, folding any failure into the result's
    /// error descriptor.
    pub async fn generate(&self, request: &RecommendationRequest) -> RecommendationResult {
        match self.recommend(request).await {
            Ok(tracks) => RecommendationResult::ok(tracks),
            Err(e) => {
                log::warn!("Recommendation failed ({}): {}", e.status(), e);
                RecommendationResult::failed(&e)
            }
        }
    }

    pub async fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> Result<Vec<CandidateTrack>, RecommendationError> {
        let seeds = validate_seeds(&request.seeds)?;

        log::info!(
            "Generating recommendations from {} seeds ({:?} expansion)",
            seeds.len(),
            self.mode
        );

        let batches = self.expand_all(&seeds).await?;

        let excluded: HashSet<&str> = seeds
            .iter()
            .filter(|s| s.kind == SeedKind::Track)
            .map(|s| s.id.as_str())
            .collect();
        let pool = merge_candidates(batches, &excluded);

        log::info!("Candidate pool: {} unique tracks", pool.len());

        if pool.is_empty() {
            return Err(RecommendationError::NoCandidates);
        }

        let ranked = rank(pool, &request.target, request.effective_limit());
        log::info!("Recommendations ready: {} tracks", ranked.len());

        Ok(ranked)
    }

    async fn expand_all(&self, seeds: &[&Seed]) -> Result<Vec<Vec<Track>>, RecommendationError> {
        match self.mode {
            ExpansionMode::Sequential => {
                let mut batches = Vec::with_capacity(seeds.len());
                for seed in seeds {
                    batches.push(self.expand_seed(seed).await?);
                }
                Ok(batches)
            }
            ExpansionMode::Concurrent => {
                try_join_all(seeds.iter().map(|seed| self.expand_seed(seed))).await
            }
        }
    }

    async fn expand_seed(&self, seed: &Seed) -> Result<Vec<Track>, RecommendationError> {
        let tracks = match seed.kind {
            SeedKind::Genre => {
                self.source
                    .genre_tracks(&seed.id, GENRE_SEARCH_LIMIT)
                    .await?
            }
            SeedKind::Artist => self.source.artist_top_tracks(&seed.id).await?,
            SeedKind::Track => {
                let track = self.source.track(&seed.id).await?;
                match track.primary_artist() {
                    Some(artist) => {
                        let artist_id = artist.id.clone();
                        self.source
                            .artist_top_tracks(&artist_id)
                            .await?
                            .into_iter()
                            .filter(|t| t.id != seed.id)
                            .collect()
                    }
                    None => {
                        log::warn!("Track seed {} has no artist, skipping", seed.id);
                        Vec::new()
                    }
                }
            }
        };

        log::debug!(
            "Expanded {:?} seed '{}' into {} tracks",
            seed.kind,
            seed.label,
            tracks.len()
        );

        Ok(tracks)
    }

    /// Seed suggestions for free text: matching popular genres first, then
    /// artists and tracks from the API. Already selected seeds are left out.
    ///
    /// A failed API lookup falls back to genre matches alone.
    pub async fn suggest_seeds(&self, query: &str, selected: &SeedList) -> Vec<Seed> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }
        let needle = query.to_lowercase();

        let mut suggestions: Vec<Seed> = POPULAR_GENRES
            .iter()
            .filter(|g| {
                g.id.contains(&needle) || g.label.to_lowercase().contains(&needle)
            })
            .map(|g| g.seed())
            .filter(|s| !selected.contains(&s.id))
            .collect();

        match self
            .source
            .suggest_seeds(query, MAX_SUGGESTIONS as u32)
            .await
        {
            Ok(found) => suggestions.extend(
                found
                    .into_iter()
                    .filter(|s| !selected.contains(&s.id)),
            ),
            Err(e) => log::warn!("Seed search failed for '{}': {}", query, e),
        }

        suggestions.truncate(MAX_SUGGESTIONS);
        suggestions
    }
}

/// Reject empty and oversized seed lists, and drop repeated ids.
fn validate_seeds(seeds: &[Seed]) -> Result<Vec<&Seed>, RecommendationError> {
    if seeds.is_empty() {
        return Err(RecommendationError::NoSeeds);
    }
    if seeds.len() > MAX_SEEDS {
        return Err(RecommendationError::TooManySeeds(seeds.len()));
    }

    let mut seen = HashSet::new();
    Ok(seeds
        .iter()
        .filter(|s| {
            let fresh = seen.insert(s.id.as_str());
            if !fresh {
                log::debug!("Ignoring repeated seed {}", s.id);
            }
            fresh
        })
        .collect())
}

/// Flatten per-seed batches in order, keeping the first track seen per id.
fn merge_candidates(batches: Vec<Vec<Track>>, excluded: &HashSet<&str>) -> Vec<CandidateTrack> {
    let mut seen = HashSet::new();
    let mut pool = Vec::new();

    for track in batches.into_iter().flatten() {
        if track.id.is_empty() || excluded.contains(track.id.as_str()) {
            continue;
        }
        if seen.insert(track.id.clone()) {
            pool.push(CandidateTrack::from(track));
        }
    }

    pool
}

/// Stable ascending sort by distance to `target`, truncated to `limit`.
pub fn rank(
    candidates: Vec<CandidateTrack>,
    target: &TargetVector,
    limit: usize,
) -> Vec<CandidateTrack> {
    let target = target.as_features();

    let mut scored: Vec<(f64, CandidateTrack)> = candidates
        .into_iter()
        .map(|c| (estimate_features(&c.id).distance(&target), c))
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));

    scored
        .into_iter()
        .take(limit)
        .map(|(_, candidate)| candidate)
        .collect()
}
