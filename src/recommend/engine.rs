//! Recommendation engine.
//!
//! Turns listening-history seeds plus similarity data into a tiered,
//! deduplicated, artist-diverse list of album recommendations. External
//! lookups are unreliable by contract: any single failure is swallowed at
//! the per-candidate level and never aborts the pass.

use super::normalize;
use super::scoring::{self, allocate_quotas, tier_for_score, ScoredCandidate, TierAvailability};
use crate::config::DiscoverySettings;
use crate::discovery_store::{DiscoveryStore, Tier};
use crate::library_store::{LibraryStore, SeedArtist};
use crate::services::{
    retry_with_backoff, BackoffPolicy, MetadataResolver, SimilarityService, TopAlbum,
};
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How many similar artists to pull per seed.
const SIMILAR_PER_SEED: usize = 50;
/// How many albums to pull per wildcard genre.
const ALBUMS_PER_TAG: usize = 20;
/// Genres used for wildcard fill when listening history is empty.
const FALLBACK_GENRES: &[&str] = &["electronic", "indie", "rock", "jazz", "ambient", "hip-hop"];
/// Score bonus for releases within the configured recency window.
const RECENCY_BONUS: f64 = 2.0;

/// One recommended album, ready to become a download job.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendedAlbum {
    pub artist_name: String,
    pub album_name: String,
    /// Canonical external album identifier.
    pub album_mbid: String,
    pub similarity: f64,
    pub tier: Tier,
}

impl RecommendedAlbum {
    pub fn into_metadata(self) -> crate::discovery_store::AcquisitionMetadata {
        crate::discovery_store::AcquisitionMetadata {
            artist_name: self.artist_name,
            album_name: self.album_name,
            album_mbid: self.album_mbid,
            similarity: self.similarity,
            tier: self.tier,
            library_anchor: false,
        }
    }
}

/// Mutable selection state threaded through the passes.
struct SelectionContext {
    /// Album mbids already chosen this run.
    seen_albums: HashSet<String>,
    /// Normalized artist names already contributing an album.
    used_artists: HashSet<String>,
    /// Active exclusion windows for the user.
    excluded_albums: HashSet<String>,
}

impl SelectionContext {
    fn artist_used(&self, name: &str) -> bool {
        self.used_artists.contains(&normalize::normalize_name(name))
    }

    fn mark_artist_used(&mut self, name: &str) {
        self.used_artists.insert(normalize::normalize_name(name));
    }
}

pub struct RecommendationEngine {
    similarity: Arc<dyn SimilarityService>,
    resolver: Arc<dyn MetadataResolver>,
    library: Arc<dyn LibraryStore>,
    store: Arc<dyn DiscoveryStore>,
    settings: DiscoverySettings,
    backoff: BackoffPolicy,
}

impl RecommendationEngine {
    pub fn new(
        similarity: Arc<dyn SimilarityService>,
        resolver: Arc<dyn MetadataResolver>,
        library: Arc<dyn LibraryStore>,
        store: Arc<dyn DiscoveryStore>,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            similarity,
            resolver,
            library,
            store,
            settings,
            backoff: BackoffPolicy::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Produce up to `target` recommended albums for a user.
    ///
    /// Returning fewer than requested is a valid, reported outcome - the
    /// caller decides what to do with a shortfall.
    pub async fn recommend(&self, user_id: &str, target: usize) -> Result<Vec<RecommendedAlbum>> {
        if target == 0 {
            return Ok(vec![]);
        }

        let seeds = self
            .library
            .get_seed_artists(user_id, self.settings.seed_artist_limit)?;
        if seeds.is_empty() {
            warn!("User {} has no listening history seeds", user_id);
        }

        let similar_by_seed = self.fetch_similarity(&seeds).await;
        let candidates = scoring::score_candidates(&similar_by_seed);

        let mut by_tier: HashMap<Tier, Vec<&ScoredCandidate>> = HashMap::new();
        for candidate in &candidates {
            if let Some(tier) = tier_for_score(candidate.avg_match) {
                by_tier.entry(tier).or_default().push(candidate);
            }
        }

        let availability = TierAvailability {
            high: by_tier.get(&Tier::High).map_or(0, Vec::len),
            medium: by_tier.get(&Tier::Medium).map_or(0, Vec::len),
            explore: by_tier.get(&Tier::Explore).map_or(0, Vec::len),
        };
        let quotas = allocate_quotas(target, availability);
        debug!(
            "Quota allocation for target {}: high={} medium={} explore={} wildcard={}",
            target, quotas.high, quotas.medium, quotas.explore, quotas.wildcard
        );

        let now = chrono::Utc::now().timestamp();
        let mut ctx = SelectionContext {
            seen_albums: HashSet::new(),
            used_artists: HashSet::new(),
            excluded_albums: self
                .store
                .get_active_exclusions(user_id, now)?
                .into_iter()
                .collect(),
        };

        let mut picks: Vec<RecommendedAlbum> = Vec::new();

        // Tiered selection up to each tier's quota.
        for (tier, quota) in [
            (Tier::High, quotas.high),
            (Tier::Medium, quotas.medium),
            (Tier::Explore, quotas.explore),
        ] {
            let mut filled = 0;
            for candidate in by_tier.get(&tier).map_or(&[][..], Vec::as_slice) {
                if filled >= quota {
                    break;
                }
                if ctx.artist_used(&candidate.name) {
                    continue;
                }
                if let Some(album) = self
                    .pick_album_for_candidate(candidate, tier, &mut ctx, false)
                    .await
                {
                    picks.push(album);
                    filled += 1;
                }
            }
        }

        let tiered_target = target - quotas.wildcard;

        // Fill pass: any unused candidate across all tiers, same diversity
        // rule, quota planning ignored.
        if picks.len() < tiered_target {
            self.fill_from_candidates(&candidates, tiered_target, &mut ctx, &mut picks, false)
                .await;
        }

        // Last resort: allow artists already in the library (new-artist rule
        // relaxed, one-album-per-artist kept) so diversity alone can never
        // starve a batch.
        if picks.len() < tiered_target {
            self.fill_from_candidates(&candidates, tiered_target, &mut ctx, &mut picks, true)
                .await;
        }

        // Wildcard fill via genre exploration, independent of the
        // similarity graph.
        if quotas.wildcard > 0 {
            self.fill_wildcards(user_id, quotas.wildcard, &mut ctx, &mut picks)
                .await?;
        }

        picks.truncate(target);
        if picks.len() < target {
            info!(
                "Recommendation shortfall for user {}: {} of {} requested",
                user_id,
                picks.len(),
                target
            );
        }
        Ok(picks)
    }

    /// Fetch similar artists per seed, skipping seeds whose lookup fails.
    async fn fetch_similarity(
        &self,
        seeds: &[SeedArtist],
    ) -> Vec<Vec<crate::services::SimilarArtist>> {
        let mut results = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let lookup = retry_with_backoff(self.backoff, "get_similar_artists", || {
                self.similarity
                    .get_similar_artists(seed.mbid.as_deref(), &seed.name, SIMILAR_PER_SEED)
            })
            .await;
            match lookup {
                Ok(similar) => results.push(similar),
                Err(e) => {
                    debug!("Skipping seed '{}': similarity lookup failed ({})", seed.name, e);
                }
            }
        }
        results
    }

    async fn fill_from_candidates(
        &self,
        candidates: &[ScoredCandidate],
        tiered_target: usize,
        ctx: &mut SelectionContext,
        picks: &mut Vec<RecommendedAlbum>,
        allow_library_artists: bool,
    ) {
        for candidate in candidates {
            if picks.len() >= tiered_target {
                break;
            }
            // Below the explore threshold stays wildcard-only.
            let Some(tier) = tier_for_score(candidate.avg_match) else {
                continue;
            };
            if ctx.artist_used(&candidate.name) {
                continue;
            }
            if let Some(album) = self
                .pick_album_for_candidate(candidate, tier, ctx, allow_library_artists)
                .await
            {
                picks.push(album);
            }
        }
    }

    /// Choose the best album for one candidate artist, or None if every
    /// album fails the filters. Marks the artist used on success.
    async fn pick_album_for_candidate(
        &self,
        candidate: &ScoredCandidate,
        tier: Tier,
        ctx: &mut SelectionContext,
        allow_library_artists: bool,
    ) -> Option<RecommendedAlbum> {
        self.pick_album_for_artist(
            &candidate.name,
            candidate.mbid.as_deref(),
            candidate.avg_match,
            tier,
            ctx,
            allow_library_artists,
        )
        .await
    }

    async fn pick_album_for_artist(
        &self,
        artist_name: &str,
        artist_mbid: Option<&str>,
        similarity_score: f64,
        tier: Tier,
        ctx: &mut SelectionContext,
        allow_library_artists: bool,
    ) -> Option<RecommendedAlbum> {
        if !allow_library_artists {
            match self.library.is_artist_in_library(artist_name) {
                Ok(true) => return None,
                Ok(false) => {}
                Err(e) => {
                    warn!("Library lookup failed for '{}': {}", artist_name, e);
                    return None;
                }
            }
        }

        let albums = retry_with_backoff(self.backoff, "get_artist_top_albums", || {
            self.similarity.get_artist_top_albums(
                artist_mbid,
                artist_name,
                self.settings.top_albums_per_artist,
            )
        })
        .await
        .map_err(|e| debug!("Top-albums lookup failed for '{}': {}", artist_name, e))
        .ok()?;

        let mut best: Option<(f64, RecommendedAlbum)> = None;
        for album in &albums {
            let Some((album_ref, score)) = self.validate_album(album, artist_name, ctx).await
            else {
                continue;
            };
            let recommended = RecommendedAlbum {
                artist_name: album_ref.artist,
                album_name: album_ref.title,
                album_mbid: album_ref.id,
                similarity: similarity_score,
                tier,
            };
            match &best {
                Some((best_score, _)) if *best_score >= score => {}
                _ => best = Some((score, recommended)),
            }
        }

        let (_, chosen) = best?;
        ctx.seen_albums.insert(chosen.album_mbid.clone());
        ctx.mark_artist_used(artist_name);
        Some(chosen)
    }

    /// Resolve and filter one album. Returns the canonical reference and
    /// its selection score, or None if any filter rejects it.
    async fn validate_album(
        &self,
        album: &TopAlbum,
        artist_name: &str,
        ctx: &SelectionContext,
    ) -> Option<(crate::services::AlbumRef, f64)> {
        let album_ref = retry_with_backoff(self.backoff, "search_album", || {
            self.resolver.search_album(&album.name, artist_name)
        })
        .await
        .map_err(|e| debug!("Album search failed for '{}': {}", album.name, e))
        .ok()??;

        if ctx.seen_albums.contains(&album_ref.id) {
            return None;
        }
        if ctx.excluded_albums.contains(&album_ref.id) {
            return None;
        }

        // Ownership: canonical id first, then the normalized name key.
        if self.library.owns_album_mbid(&album_ref.id).ok()? {
            return None;
        }
        let (artist_key, title_key) = normalize::ownership_key(artist_name, &album.name);
        if self.library.owns_album_key(&artist_key, &title_key).ok()? {
            return None;
        }

        let details = retry_with_backoff(self.backoff, "get_album_details", || {
            self.resolver.get_album_details(&album_ref.id)
        })
        .await
        .map_err(|e| debug!("Album details failed for '{}': {}", album.name, e))
        .ok()??;

        if !details.is_studio_album() {
            return None;
        }
        if details.track_count < self.settings.min_album_tracks {
            return None;
        }

        let popularity = (album.playcount.unwrap_or(0) as f64 + 1.0).ln();
        let recency = details
            .release_date
            .map(|date| {
                let cutoff = chrono::Utc::now().date_naive()
                    - chrono::Duration::days(365 * self.settings.recent_release_years);
                if date >= cutoff {
                    RECENCY_BONUS
                } else {
                    0.0
                }
            })
            .unwrap_or(0.0);

        Some((album_ref, popularity + recency))
    }

    /// Wildcard fill: genre/tag exploration, excluding artists already in
    /// the library.
    async fn fill_wildcards(
        &self,
        user_id: &str,
        quota: usize,
        ctx: &mut SelectionContext,
        picks: &mut Vec<RecommendedAlbum>,
    ) -> Result<()> {
        let mut genres = self.library.get_top_genres(user_id, 5)?;
        if genres.is_empty() {
            genres = FALLBACK_GENRES.iter().map(|g| g.to_string()).collect();
        }

        let mut filled = 0;
        'genres: for genre in &genres {
            let albums = match retry_with_backoff(self.backoff, "get_top_albums_by_tag", || {
                self.similarity.get_top_albums_by_tag(genre, ALBUMS_PER_TAG)
            })
            .await
            {
                Ok(albums) => albums,
                Err(e) => {
                    debug!("Tag exploration failed for '{}': {}", genre, e);
                    continue;
                }
            };

            for tagged in albums {
                if filled >= quota {
                    break 'genres;
                }
                if ctx.artist_used(&tagged.artist) {
                    continue;
                }
                if self.library.is_artist_in_library(&tagged.artist)? {
                    continue;
                }
                let top_album = TopAlbum {
                    name: tagged.name.clone(),
                    playcount: None,
                };
                let Some((album_ref, _)) =
                    self.validate_album(&top_album, &tagged.artist, ctx).await
                else {
                    continue;
                };
                ctx.seen_albums.insert(album_ref.id.clone());
                ctx.mark_artist_used(&tagged.artist);
                picks.push(RecommendedAlbum {
                    artist_name: album_ref.artist,
                    album_name: album_ref.title,
                    album_mbid: album_ref.id,
                    similarity: scoring::DEFAULT_SIMILARITY,
                    tier: Tier::Wildcard,
                });
                filled += 1;
            }
        }

        Ok(())
    }

    /// Replacement search used when a batch job fails: pick an album from
    /// an artist not in `attempted_artists`, searching the seeds' extended
    /// similarity lists.
    pub async fn find_substitute(
        &self,
        user_id: &str,
        attempted_artists: &[String],
        tier: Tier,
    ) -> Result<Option<RecommendedAlbum>> {
        let seeds = self
            .library
            .get_seed_artists(user_id, self.settings.seed_artist_limit)?;
        let similar_by_seed = self.fetch_similarity(&seeds).await;
        let candidates = scoring::score_candidates(&similar_by_seed);

        let now = chrono::Utc::now().timestamp();
        let mut ctx = SelectionContext {
            seen_albums: HashSet::new(),
            used_artists: attempted_artists
                .iter()
                .map(|a| normalize::normalize_name(a))
                .collect(),
            excluded_albums: self
                .store
                .get_active_exclusions(user_id, now)?
                .into_iter()
                .collect(),
        };

        for candidate in &candidates {
            if ctx.artist_used(&candidate.name) {
                continue;
            }
            if let Some(album) = self
                .pick_album_for_candidate(candidate, tier, &mut ctx, false)
                .await
            {
                return Ok(Some(album));
            }
        }

        Ok(None)
    }
}
