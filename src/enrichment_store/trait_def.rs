//! EnrichmentStore trait definition.

use super::models::*;
use anyhow::Result;

/// Storage backend for enrichment state, per-entity statuses and failures.
pub trait EnrichmentStore: Send + Sync {
    // === Controller state ===

    /// Load the single process-wide state record (default if never saved).
    fn get_state(&self) -> Result<EnrichmentState>;

    fn save_state(&self, state: &EnrichmentState) -> Result<()>;

    // === Entity registration (called by the ingest/scan boundary) ===

    /// Register an artist for enrichment (no-op if already known).
    fn register_artist(&self, id: &str, name: &str, mbid: Option<&str>) -> Result<()>;

    /// Register a track for mood tagging, audio analysis and vibe
    /// embedding (no-op if already known).
    fn register_track(&self, id: &str, title: &str, artist_name: &str) -> Result<()>;

    // === Artists ===

    /// Artists in pending or failed status, pending first, up to `limit`.
    fn select_artists_for_enrichment(&self, limit: usize) -> Result<Vec<PendingArtist>>;

    fn set_artist_status(&self, id: &str, status: ItemStatus) -> Result<()>;

    /// Store the enriched profile and mark the artist done.
    fn set_artist_profile(&self, id: &str, profile: &serde_json::Value) -> Result<()>;

    fn artist_counts(&self) -> Result<PhaseCounts>;

    /// Targeted retry: reset the given artists back to pending.
    fn reset_artists_to_pending(&self, ids: &[String]) -> Result<usize>;

    // === Track moods ===

    /// Tracks whose moods column is NULL or an empty array, up to `limit`.
    /// Sentinel-tagged tracks are naturally excluded.
    fn select_tracks_missing_moods(&self, limit: usize) -> Result<Vec<PendingTrack>>;

    fn set_track_moods(&self, id: &str, moods: &[String]) -> Result<()>;

    fn get_track_moods(&self, id: &str) -> Result<Option<Vec<String>>>;

    fn track_counts(&self) -> Result<PhaseCounts>;

    // === Audio analysis ===

    fn select_audio_pending(&self, limit: usize) -> Result<Vec<String>>;

    /// Flip the given tracks to processing with a queue timestamp.
    fn mark_audio_queued(&self, track_ids: &[String], now: i64) -> Result<()>;

    /// Reset jobs stuck in processing since before `cutoff`. Returns the
    /// number of jobs reset.
    fn reset_stale_audio(&self, cutoff: i64) -> Result<usize>;

    /// Recorded by the external analyzer when a job finishes.
    fn mark_audio_done(&self, track_id: &str, completed_at: i64) -> Result<()>;

    fn mark_audio_failed(&self, track_id: &str) -> Result<()>;

    /// Number of jobs completed at or after `since` (analyzer liveness
    /// evidence for the circuit breaker).
    fn count_audio_completed_since(&self, since: i64) -> Result<usize>;

    fn audio_counts(&self) -> Result<PhaseCounts>;

    // === Vibe embeddings ===

    fn select_vibe_pending(&self, limit: usize) -> Result<Vec<String>>;

    fn mark_vibe_queued(&self, track_ids: &[String], now: i64) -> Result<()>;

    fn reset_stale_vibe(&self, cutoff: i64) -> Result<usize>;

    fn mark_vibe_done(&self, track_id: &str, completed_at: i64) -> Result<()>;

    fn vibe_counts(&self) -> Result<PhaseCounts>;

    // === Failures ===

    fn append_failure(&self, failure: &EnrichmentFailure) -> Result<()>;

    fn list_failures(&self, limit: usize, offset: usize) -> Result<Vec<EnrichmentFailure>>;

    fn count_failures(&self) -> Result<usize>;

    // === Resets (each touches only its own phase) ===

    /// Full re-enrichment: everything back to pending, moods cleared,
    /// one-shot state flags rearmed.
    fn reset_all(&self) -> Result<()>;

    fn reset_artists_only(&self) -> Result<()>;

    fn reset_moods_only(&self) -> Result<()>;

    fn reset_audio_only(&self) -> Result<()>;
}
