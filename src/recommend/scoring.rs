//! Cross-seed candidate scoring, tier thresholds and quota allocation.

use crate::discovery_store::Tier;
use crate::services::SimilarArtist;
use std::collections::HashMap;

/// Tier thresholds on the average match score.
const HIGH_THRESHOLD: f64 = 0.65;
const MEDIUM_THRESHOLD: f64 = 0.50;
const EXPLORE_THRESHOLD: f64 = 0.35;

/// Target tier distribution of the requested count.
const HIGH_SHARE: f64 = 0.30;
const MEDIUM_SHARE: f64 = 0.40;
const WILDCARD_SHARE: f64 = 0.10;

/// Fallback score for candidates with a missing or unusable match value.
pub const DEFAULT_SIMILARITY: f64 = 0.5;

/// A candidate artist aggregated across all seeds that surfaced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub name: String,
    pub mbid: Option<String>,
    pub avg_match: f64,
    pub max_match: f64,
    /// Number of distinct seeds that produced this artist.
    pub cross_seed_count: u32,
}

fn sanitize_score(score: f64) -> f64 {
    if !score.is_finite() {
        return DEFAULT_SIMILARITY;
    }
    score.clamp(0.0, 1.0)
}

/// Aggregate per-seed similar-artist lists into a ranked candidate list.
///
/// An artist corroborated by multiple seeds ranks above one with a single
/// high score: sort is cross-seed count descending, then average match
/// descending.
pub fn score_candidates(similar_by_seed: &[Vec<SimilarArtist>]) -> Vec<ScoredCandidate> {
    struct Accumulator {
        name: String,
        mbid: Option<String>,
        sum: f64,
        max: f64,
        seeds: u32,
    }

    let mut by_key: HashMap<String, Accumulator> = HashMap::new();

    for seed_results in similar_by_seed {
        for artist in seed_results {
            let key = artist
                .mbid
                .clone()
                .unwrap_or_else(|| artist.name.to_lowercase());
            let score = sanitize_score(artist.match_score);
            let entry = by_key.entry(key).or_insert_with(|| Accumulator {
                name: artist.name.clone(),
                mbid: artist.mbid.clone(),
                sum: 0.0,
                max: 0.0,
                seeds: 0,
            });
            entry.sum += score;
            entry.max = entry.max.max(score);
            entry.seeds += 1;
            if entry.mbid.is_none() {
                entry.mbid = artist.mbid.clone();
            }
        }
    }

    let mut candidates: Vec<ScoredCandidate> = by_key
        .into_values()
        .map(|acc| ScoredCandidate {
            avg_match: acc.sum / acc.seeds as f64,
            max_match: acc.max,
            cross_seed_count: acc.seeds,
            name: acc.name,
            mbid: acc.mbid,
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.cross_seed_count
            .cmp(&a.cross_seed_count)
            .then(
                b.avg_match
                    .partial_cmp(&a.avg_match)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then_with(|| a.name.cmp(&b.name))
    });

    candidates
}

/// Tier for an average match score. Below the explore threshold the
/// candidate is reserved for wildcard selection only.
pub fn tier_for_score(avg_match: f64) -> Option<Tier> {
    let score = sanitize_score(avg_match);
    if score >= HIGH_THRESHOLD {
        Some(Tier::High)
    } else if score >= MEDIUM_THRESHOLD {
        Some(Tier::Medium)
    } else if score >= EXPLORE_THRESHOLD {
        Some(Tier::Explore)
    } else {
        None
    }
}

/// How many distinct candidate artists each tier has to offer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TierAvailability {
    pub high: usize,
    pub medium: usize,
    pub explore: usize,
}

/// Allocated per-tier quotas for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierQuotas {
    pub high: usize,
    pub medium: usize,
    pub explore: usize,
    pub wildcard: usize,
}

impl TierQuotas {
    pub fn total(&self) -> usize {
        self.high + self.medium + self.explore + self.wildcard
    }
}

/// Allocate tier quotas for `target` albums: 30% high / 40% medium /
/// 20% explore / 10% wildcard, with shortfall cascading down.
///
/// High-tier shortfall redistributes 60% to medium and 40% to explore;
/// medium-tier shortfall goes fully to explore. The wildcard quota is
/// fixed and filled independently of the similarity graph. The result
/// never exceeds `target`; it falls short only when overall supply does.
pub fn allocate_quotas(target: usize, available: TierAvailability) -> TierQuotas {
    let t = target as f64;
    let mut high = (t * HIGH_SHARE).round() as usize;
    let mut medium = (t * MEDIUM_SHARE).round() as usize;
    let wildcard = (t * WILDCARD_SHARE).round() as usize;
    // Explore absorbs the rounding remainder.
    let mut explore = target.saturating_sub(high + medium + wildcard);

    if available.high < high {
        let deficit = high - available.high;
        high = available.high;
        let to_medium = (deficit as f64 * 0.6).round() as usize;
        medium += to_medium;
        explore += deficit - to_medium;
    }

    if available.medium < medium {
        let deficit = medium - available.medium;
        medium = available.medium;
        explore += deficit;
    }

    if available.explore < explore {
        explore = available.explore;
    }

    TierQuotas {
        high,
        medium,
        explore,
        wildcard,
    }
}
