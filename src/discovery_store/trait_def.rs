//! DiscoveryStore trait definition.

use super::models::*;
use anyhow::Result;
use chrono::NaiveDate;

/// Storage backend for discovery batches, jobs and results.
///
/// All multi-row mutations that must be atomic (batch+jobs creation, the
/// completion transition with its unavailable-album writes, playlist
/// persistence) run inside a single transaction. Batch transitions are
/// guarded by the optimistic-concurrency `version` column so concurrent
/// sweep/webhook triggers cannot double-transition.
pub trait DiscoveryStore: Send + Sync {
    // === Batches ===

    /// Atomically create a batch together with its download jobs.
    fn create_batch_with_jobs(&self, batch: &DiscoveryBatch, jobs: &[DownloadJob]) -> Result<()>;

    fn get_batch(&self, id: &str) -> Result<Option<DiscoveryBatch>>;

    /// Batches in a non-terminal state.
    fn get_active_batches(&self) -> Result<Vec<DiscoveryBatch>>;

    /// Completed batches with `completed_at >= since`.
    fn get_completed_batches_since(&self, since: i64) -> Result<Vec<DiscoveryBatch>>;

    /// Version-guarded batch transition.
    ///
    /// Applies only when the stored version matches `expected_version` AND
    /// the stored status is still non-terminal; bumps the version. Any
    /// `unavailable` rows are recorded in the same transaction. Returns
    /// false (with no side effects) if the guard failed.
    fn transition_batch(
        &self,
        id: &str,
        expected_version: i64,
        transition: &BatchTransition,
        unavailable: &[UnavailableAlbum],
    ) -> Result<bool>;

    /// Append a structured log line to a batch.
    fn append_batch_log(&self, batch_id: &str, message: &str) -> Result<()>;

    fn get_batch_log(&self, batch_id: &str) -> Result<Vec<BatchLogEntry>>;

    // === Jobs ===

    fn get_job(&self, id: &str) -> Result<Option<DownloadJob>>;

    /// Add a single job to an existing batch (replacement-search flow).
    fn add_job(&self, job: &DownloadJob) -> Result<()>;

    fn get_jobs_for_batch(&self, batch_id: &str) -> Result<Vec<DownloadJob>>;

    fn count_jobs_for_batch(&self, batch_id: &str) -> Result<BatchJobCounts>;

    /// True if a pending/processing job already targets this album.
    fn has_active_job_for_target(&self, target_mbid: &str) -> Result<bool>;

    /// Set a job's status. Terminal states are never reopened: the update
    /// applies only while the stored status is non-terminal. Returns true
    /// if a row changed.
    fn set_job_status(&self, id: &str, status: JobStatus, error: Option<&str>) -> Result<bool>;

    /// Attach the external correlation id to a job.
    fn set_job_external_ref(&self, id: &str, external_ref: &str) -> Result<()>;

    /// Mark every non-terminal job of a batch failed with the given reason.
    /// Returns the number of jobs affected.
    fn fail_open_jobs_for_batch(&self, batch_id: &str, reason: &str) -> Result<usize>;

    // === Discovery results ===

    /// Idempotent upsert of a discovery album and its tracks, keyed by
    /// (user_id, week_start, album_mbid). Existing tracks for the key are
    /// replaced, not duplicated.
    fn upsert_discovery_album(
        &self,
        album: &DiscoveryAlbumRecord,
        tracks: &[DiscoveryTrackRecord],
    ) -> Result<()>;

    fn get_discovery_albums(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Vec<DiscoveryAlbumRecord>>;

    fn get_discovery_tracks(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        album_mbid: &str,
    ) -> Result<Vec<DiscoveryTrackRecord>>;

    fn has_discovery_album(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        album_mbid: &str,
    ) -> Result<bool>;

    // === Unavailable albums ===

    fn get_unavailable_albums(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Vec<UnavailableAlbum>>;

    // === Exclusions ===

    /// Insert or refresh an exclusion window (never duplicates).
    fn refresh_exclusion(&self, user_id: &str, album_mbid: &str, expires_at: i64) -> Result<()>;

    /// Album mbids with an exclusion active at `now`.
    fn get_active_exclusions(&self, user_id: &str, now: i64) -> Result<Vec<String>>;

    // === User settings ===

    fn get_user_discovery_settings(&self, user_id: &str) -> Result<Option<UserDiscoverySettings>>;

    fn set_user_discovery_settings(&self, settings: &UserDiscoverySettings) -> Result<()>;
}
