//! Recommendation engine for music discovery.
//!
//! Expands user-chosen seeds into candidate tracks through the Spotify Web
//! API, then ranks them against target feature values.

pub mod engine;
pub mod errors;
pub mod features;
pub mod source;
pub mod types;

pub use engine::{ExpansionMode, RecommendationEngine};
pub use errors::{RecommendationError, SeedError};
pub use features::estimate_features;
pub use source::TrackSource;
pub use types::{
    CandidateTrack, ErrorDescriptor, FeatureVector, RecommendationRequest, RecommendationResult,
    Seed, SeedKind, SeedList, TargetVector, DEFAULT_LIMIT, MAX_SEEDS, POPULAR_GENRES,
};
