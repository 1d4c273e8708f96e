//! The four enrichment phases.
//!
//! Artists and track moods run in-process with bounded concurrency and
//! per-item timeouts; audio and vibe are non-blocking hand-offs to
//! external work queues. Every per-item outcome is independent: one
//! timeout never aborts its siblings.

use super::controller::EnrichmentController;
use super::moods;
use crate::enrichment_store::{
    error_codes, EnrichmentFailure, EnrichmentPhase, FailureKind, ItemStatus, PendingArtist,
    PendingTrack, NOT_FOUND_TAGS, NO_MOOD_TAGS,
};
use crate::services::{retry_with_backoff, QueueName, ServiceError};
use anyhow::Result;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Outcome of one unit of phase work. Halting returns a typed skip - no
/// control flow via thrown errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Done,
    Failed,
    SkippedPaused,
}

impl EnrichmentController {
    // =========================================================================
    // Phase 1: artists
    // =========================================================================

    /// Enrich a batch of pending/failed artists. Returns the number of
    /// failures recorded.
    pub(super) async fn phase_artists(&self) -> Result<u32> {
        let artists = self
            .store
            .select_artists_for_enrichment(self.settings.artist_batch_size)?;
        if artists.is_empty() {
            return Ok(0);
        }
        debug!("Artist phase: {} candidates", artists.len());

        let limiter = Arc::new(Semaphore::new(self.settings.artist_concurrency));
        let timeout = Duration::from_secs(self.settings.artist_timeout_secs);

        let outcomes = join_all(artists.iter().map(|artist| {
            let limiter = Arc::clone(&limiter);
            async move {
                let _permit = limiter.acquire_owned().await.expect("limiter closed");
                if self.should_halt() {
                    return ItemOutcome::SkippedPaused;
                }
                self.set_current_item(EnrichmentPhase::Artists, Some(artist.name.clone()));

                match tokio::time::timeout(timeout, self.enrich_artist(artist)).await {
                    Ok(Ok(())) => ItemOutcome::Done,
                    Ok(Err(e)) => {
                        self.record_artist_failure(artist, Self::code_for(&e), &e.to_string());
                        ItemOutcome::Failed
                    }
                    Err(_) => {
                        self.record_artist_failure(
                            artist,
                            error_codes::TIMEOUT_ERROR,
                            &format!(
                                "enrichment timed out after {}s",
                                self.settings.artist_timeout_secs
                            ),
                        );
                        ItemOutcome::Failed
                    }
                }
            }
        }))
        .await;

        self.set_current_item(EnrichmentPhase::Artists, None);
        let failed = outcomes
            .iter()
            .filter(|o| **o == ItemOutcome::Failed)
            .count() as u32;
        let done = outcomes
            .iter()
            .filter(|o| **o == ItemOutcome::Done)
            .count();
        info!("Artist phase done: {} enriched, {} failed", done, failed);
        Ok(failed)
    }

    async fn enrich_artist(&self, artist: &PendingArtist) -> Result<(), ServiceError> {
        let related = retry_with_backoff(self.backoff, "get_similar_artists", || {
            self.similarity
                .get_similar_artists(artist.mbid.as_deref(), &artist.name, 20)
        })
        .await?;

        let profile = serde_json::json!({
            "related_artists": related
                .iter()
                .map(|r| serde_json::json!({
                    "name": r.name,
                    "mbid": r.mbid,
                    "match": r.match_score,
                }))
                .collect::<Vec<_>>(),
            "enriched_at": chrono::Utc::now().timestamp(),
        });

        self.store
            .set_artist_profile(&artist.id, &profile)
            .map_err(|e| ServiceError::Other(e.to_string()))?;
        Ok(())
    }

    fn record_artist_failure(&self, artist: &PendingArtist, code: &str, message: &str) {
        if let Err(e) = self.store.set_artist_status(&artist.id, ItemStatus::Failed) {
            warn!("Could not mark artist {} failed: {}", artist.id, e);
        }
        let failure =
            EnrichmentFailure::new(FailureKind::Artist, &artist.id, &artist.name, code, message);
        if let Err(e) = self.store.append_failure(&failure) {
            warn!("Could not record artist failure: {}", e);
        }
    }

    // =========================================================================
    // Phase 2: track moods
    // =========================================================================

    /// Tag a batch of tracks lacking mood tags. Returns the number of
    /// failures recorded.
    pub(super) async fn phase_track_moods(&self) -> Result<u32> {
        let tracks = self
            .store
            .select_tracks_missing_moods(self.settings.track_batch_size)?;
        if tracks.is_empty() {
            return Ok(0);
        }
        debug!("Track mood phase: {} candidates", tracks.len());

        let limiter = Arc::new(Semaphore::new(self.settings.artist_concurrency));
        let timeout = Duration::from_secs(self.settings.track_timeout_secs);

        let outcomes = join_all(tracks.iter().map(|track| {
            let limiter = Arc::clone(&limiter);
            async move {
                let _permit = limiter.acquire_owned().await.expect("limiter closed");
                if self.should_halt() {
                    return ItemOutcome::SkippedPaused;
                }
                self.set_current_item(EnrichmentPhase::Tracks, Some(track.title.clone()));

                match tokio::time::timeout(timeout, self.tag_track(track)).await {
                    Ok(Ok(())) => ItemOutcome::Done,
                    Ok(Err(e)) => {
                        self.record_track_failure(track, Self::code_for(&e), &e.to_string());
                        ItemOutcome::Failed
                    }
                    Err(_) => {
                        self.record_track_failure(
                            track,
                            error_codes::TIMEOUT_ERROR,
                            &format!(
                                "tag lookup timed out after {}s",
                                self.settings.track_timeout_secs
                            ),
                        );
                        ItemOutcome::Failed
                    }
                }
            }
        }))
        .await;

        self.set_current_item(EnrichmentPhase::Tracks, None);
        let failed = outcomes
            .iter()
            .filter(|o| **o == ItemOutcome::Failed)
            .count() as u32;
        let done = outcomes
            .iter()
            .filter(|o| **o == ItemOutcome::Done)
            .count();
        info!("Track mood phase done: {} tagged, {} failed", done, failed);
        Ok(failed)
    }

    async fn tag_track(&self, track: &PendingTrack) -> Result<(), ServiceError> {
        let tags = match retry_with_backoff(self.backoff, "get_track_tags", || {
            self.similarity.get_track_tags(&track.artist_name, &track.title)
        })
        .await
        {
            Ok(tags) => tags,
            Err(ServiceError::NotFound) => {
                // Checked, the service has no entry: a sentinel stops this
                // track from being selected forever.
                self.store
                    .set_track_moods(&track.id, &[NOT_FOUND_TAGS.to_string()])
                    .map_err(|e| ServiceError::Other(e.to_string()))?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let moods = moods::filter_moods(&tags, self.settings.max_moods_per_track);
        let stored = if moods.is_empty() {
            vec![NO_MOOD_TAGS.to_string()]
        } else {
            moods
        };
        self.store
            .set_track_moods(&track.id, &stored)
            .map_err(|e| ServiceError::Other(e.to_string()))?;
        Ok(())
    }

    fn record_track_failure(&self, track: &PendingTrack, code: &str, message: &str) {
        let failure =
            EnrichmentFailure::new(FailureKind::Track, &track.id, &track.title, code, message);
        if let Err(e) = self.store.append_failure(&failure) {
            warn!("Could not record track failure: {}", e);
        }
    }

    fn code_for(error: &ServiceError) -> &'static str {
        match error {
            ServiceError::Timeout => error_codes::TIMEOUT_ERROR,
            ServiceError::NotFound => error_codes::NOT_FOUND,
            _ => error_codes::API_ERROR,
        }
    }

    // =========================================================================
    // Phase 3: audio analysis hand-off
    // =========================================================================

    /// Queue pending tracks for external audio analysis, guarded by the
    /// progress-evidence circuit breaker.
    pub(super) async fn phase_audio(&self) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let stale = self
            .store
            .reset_stale_audio(now - self.settings.audio_stale_secs)?;
        if stale > 0 {
            info!("Reset {} stale audio analysis jobs", stale);
        }

        // Evidence since the last observation feeds the breaker.
        let watermark = self
            .last_audio_observed_at
            .swap(now, std::sync::atomic::Ordering::SeqCst);
        let completed_since = self.store.count_audio_completed_since(watermark)?;
        let had_outstanding = self.store.audio_counts()?.processing > 0;

        let mut breaker = self.audio_breaker.lock().unwrap();
        breaker.record_cycle(had_outstanding, completed_since);
        if breaker.is_open() {
            warn!("Audio analyzer circuit breaker open; skipping queueing this cycle");
            return Ok(());
        }
        drop(breaker);

        let pending = self
            .store
            .select_audio_pending(self.settings.audio_batch_size)?;
        if pending.is_empty() {
            return Ok(());
        }

        for track_id in &pending {
            self.work_queue.enqueue(
                QueueName::AudioAnalysis,
                serde_json::json!({ "track_id": track_id }),
            )?;
        }
        self.store.mark_audio_queued(&pending, now)?;
        info!("Queued {} tracks for audio analysis", pending.len());

        Ok(())
    }

    // =========================================================================
    // Phase 4: vibe embeddings
    // =========================================================================

    /// Queue pending tracks for external vibe embedding (feature-gated by
    /// the caller).
    pub(super) async fn phase_vibe(&self) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let stale = self
            .store
            .reset_stale_vibe(now - self.settings.audio_stale_secs)?;
        if stale > 0 {
            info!("Reset {} stale vibe embedding jobs", stale);
        }

        let pending = self
            .store
            .select_vibe_pending(self.settings.vibe_batch_size)?;
        if pending.is_empty() {
            return Ok(());
        }

        for track_id in &pending {
            self.work_queue.enqueue(
                QueueName::VibeEmbedding,
                serde_json::json!({ "track_id": track_id }),
            )?;
        }
        self.store.mark_vibe_queued(&pending, now)?;
        info!("Queued {} tracks for vibe embedding", pending.len());

        Ok(())
    }
}
