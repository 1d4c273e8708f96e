//! Periodic recovery sweeps.
//!
//! Batch timeouts are sweep-driven from persisted timestamps, not timers
//! owned by the batch - a crashed process leaves nothing in limbo because
//! the next sweep re-evaluates elapsed time.

use super::orchestrator::DiscoveryOrchestrator;
use crate::discovery_store::{BatchStatus, BatchTransition};
use anyhow::Result;
use tracing::{info, warn};

impl DiscoveryOrchestrator {
    /// Time out stuck batches.
    ///
    /// Batches older than the absolute ceiling are force-failed regardless
    /// of state. Below that, batches with zero completions get the longer
    /// no-progress timeout and batches with some completions the shorter
    /// one - partial progress is worth waiting longer for.
    pub async fn check_stuck_batches(&self) -> Result<usize> {
        let now = chrono::Utc::now().timestamp();
        let mut touched = 0;

        for batch in self.store.get_active_batches()? {
            let age_minutes = batch.age_minutes(now);

            if age_minutes >= self.settings.batch_max_age_hours * 60 {
                let failed_jobs = self
                    .store
                    .fail_open_jobs_for_batch(&batch.id, "timeout")?;
                let counts = self.store.count_jobs_for_batch(&batch.id)?;
                let transition = BatchTransition {
                    status: BatchStatus::Failed,
                    completed_albums: counts.completed,
                    failed_albums: counts.unsuccessful(),
                    error_message: Some(format!(
                        "batch timed out after {} hours",
                        self.settings.batch_max_age_hours
                    )),
                    final_song_count: None,
                };
                let unavailable = self.unavailable_from_jobs(&batch)?;
                if self.store.transition_batch(
                    &batch.id,
                    batch.version,
                    &transition,
                    &unavailable,
                )? {
                    warn!(
                        "Force-failed batch {} (age {} min, {} jobs timed out)",
                        batch.id, age_minutes, failed_jobs
                    );
                    self.store
                        .append_batch_log(&batch.id, "force-failed by stuck-batch sweep")?;
                    let mut failed = batch.clone();
                    failed.status = BatchStatus::Failed;
                    self.emit_complete(&failed, &counts, Some("batch timed out"));
                    touched += 1;
                }
                continue;
            }

            if batch.status != BatchStatus::Downloading {
                continue;
            }

            let counts = self.store.count_jobs_for_batch(&batch.id)?;
            if counts.pending + counts.processing == 0 {
                continue;
            }

            let threshold = if counts.completed == 0 {
                self.settings.stuck_no_progress_mins
            } else {
                self.settings.stuck_some_progress_mins
            };

            if age_minutes >= threshold {
                let failed_jobs = self
                    .store
                    .fail_open_jobs_for_batch(&batch.id, "timeout")?;
                if failed_jobs > 0 {
                    info!(
                        "Timed out {} stuck jobs in batch {} (age {} min, {} completed)",
                        failed_jobs, batch.id, age_minutes, counts.completed
                    );
                    self.store.append_batch_log(
                        &batch.id,
                        &format!("{} stuck jobs timed out", failed_jobs),
                    )?;
                    touched += 1;
                }
                self.check_batch_completion(&batch.id).await?;
            }
        }

        Ok(touched)
    }

    /// Backfill discovery rows for completed batches whose scan raced the
    /// playlist build.
    pub async fn reconcile_discovery_tracks(&self) -> Result<usize> {
        let since = chrono::Utc::now().timestamp()
            - self.settings.reconcile_lookback_days * 24 * 3600;
        let mut backfilled = 0;

        for batch in self.store.get_completed_batches_since(since)? {
            for job in self.store.get_jobs_for_batch(&batch.id)? {
                if job.status != crate::discovery_store::JobStatus::Completed
                    || job.metadata.library_anchor
                {
                    continue;
                }
                if self.store.has_discovery_album(
                    &batch.user_id,
                    batch.week_start,
                    &job.metadata.album_mbid,
                )? {
                    continue;
                }

                let tracks = self.resolve_album_tracks(&job.metadata)?;
                let Some(track) = tracks.first() else {
                    continue;
                };

                self.store.upsert_discovery_album(
                    &crate::discovery_store::DiscoveryAlbumRecord {
                        user_id: batch.user_id.clone(),
                        week_start: batch.week_start,
                        album_mbid: job.metadata.album_mbid.clone(),
                        artist_name: job.metadata.artist_name.clone(),
                        album_name: job.metadata.album_name.clone(),
                        similarity: job.metadata.similarity,
                        tier: job.metadata.tier,
                        created_at: chrono::Utc::now().timestamp(),
                    },
                    &[crate::discovery_store::DiscoveryTrackRecord {
                        track_id: track.id.clone(),
                        title: track.title.clone(),
                        artist_name: track.artist_name.clone(),
                        is_anchor: false,
                    }],
                )?;
                info!(
                    "Reconciled missing discovery album '{}' for batch {}",
                    job.metadata.album_name, batch.id
                );
                backfilled += 1;
            }
        }

        Ok(backfilled)
    }
}
