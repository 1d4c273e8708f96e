//! Recommendation engine: similarity scoring, tiering and album selection.

mod engine;
pub mod normalize;
mod scoring;

pub use engine::{RecommendationEngine, RecommendedAlbum};
pub use scoring::{
    allocate_quotas, score_candidates, tier_for_score, ScoredCandidate, TierAvailability,
    TierQuotas, DEFAULT_SIMILARITY,
};
