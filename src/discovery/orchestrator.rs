//! Discovery batch orchestrator.
//!
//! Owns the `DiscoveryBatch` state machine: creation, concurrent
//! acquisition dispatch, completion detection and the terminal
//! transitions. Stuck-batch recovery and playlist assembly live in the
//! sibling modules, implemented on the same struct.

use crate::config::DiscoverySettings;
use crate::discovery_store::{
    BatchJobCounts, BatchStatus, BatchTransition, DiscoveryBatch, DiscoveryStore, DownloadJob,
    JobStatus, UnavailableAlbum,
};
use crate::library_store::LibraryStore;
use crate::recommend::RecommendationEngine;
use crate::services::{
    AcquisitionRequest, AcquisitionService, BatchProgress, DiscoveryEvent, EventSink, QueueName,
    WorkQueue,
};
use anyhow::{anyhow, bail, Result};
use chrono::{Datelike, NaiveDate};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct DiscoveryOrchestrator {
    pub(super) store: Arc<dyn DiscoveryStore>,
    pub(super) library: Arc<dyn LibraryStore>,
    pub(super) engine: Arc<RecommendationEngine>,
    pub(super) acquisition: Arc<dyn AcquisitionService>,
    pub(super) work_queue: Arc<dyn WorkQueue>,
    pub(super) events: Arc<dyn EventSink>,
    pub(super) settings: DiscoverySettings,
}

/// Monday of the week containing `date`.
pub fn week_start_for(date: NaiveDate) -> NaiveDate {
    date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64)
}

impl DiscoveryOrchestrator {
    pub fn new(
        store: Arc<dyn DiscoveryStore>,
        library: Arc<dyn LibraryStore>,
        engine: Arc<RecommendationEngine>,
        acquisition: Arc<dyn AcquisitionService>,
        work_queue: Arc<dyn WorkQueue>,
        events: Arc<dyn EventSink>,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            store,
            library,
            engine,
            acquisition,
            work_queue,
            events,
            settings,
        }
    }

    /// Tag applied to acquisition-manager entries created for a batch.
    pub fn discovery_tag(batch_id: &str) -> String {
        format!("discovery-{}", batch_id)
    }

    // =========================================================================
    // Generation and dispatch
    // =========================================================================

    /// Generate a new discovery batch for a user and dispatch its jobs.
    ///
    /// Fails fast (no batch created) when the user has discovery disabled,
    /// has no playlist size configured, or zero recommendations survive
    /// the duplicate-job filter.
    pub async fn generate(&self, user_id: &str) -> Result<DiscoveryBatch> {
        let user_settings = self
            .store
            .get_user_discovery_settings(user_id)?
            .ok_or_else(|| anyhow!("User {} has no discovery settings", user_id))?;
        if !user_settings.enabled {
            bail!("Discovery is not enabled for user {}", user_id);
        }
        let target = user_settings.target_song_count;
        if target == 0 {
            bail!("User {} has no discovery playlist size configured", user_id);
        }

        // Over-request to absorb acquisition failures.
        let albums_to_request =
            (target as f64 * self.settings.download_ratio).ceil() as usize;
        info!(
            "Generating discovery batch for user {}: {} songs, requesting {} albums",
            user_id, target, albums_to_request
        );

        let recommendations = self.engine.recommend(user_id, albums_to_request).await?;
        if recommendations.is_empty() {
            bail!("No recommendations produced for user {}", user_id);
        }

        let week_start = week_start_for(chrono::Utc::now().date_naive());
        let batch = DiscoveryBatch::new(user_id, week_start, target);

        let mut jobs = Vec::with_capacity(recommendations.len());
        for recommendation in recommendations {
            // Skip targets another batch is already acquiring.
            if self
                .store
                .has_active_job_for_target(&recommendation.album_mbid)?
            {
                debug!(
                    "Skipping '{}' - already has an active download job",
                    recommendation.album_mbid
                );
                continue;
            }
            jobs.push(DownloadJob::new(
                user_id,
                &batch.id,
                recommendation.into_metadata(),
            ));
        }
        if jobs.is_empty() {
            bail!(
                "All recommendations for user {} already have active jobs",
                user_id
            );
        }

        self.store.create_batch_with_jobs(&batch, &jobs)?;
        self.store.append_batch_log(
            &batch.id,
            &format!("created with {} download jobs", jobs.len()),
        )?;

        self.dispatch(&batch.id).await?;

        self.store
            .get_batch(&batch.id)?
            .ok_or_else(|| anyhow!("Batch {} vanished after creation", batch.id))
    }

    /// Submit every pending job of a batch to the acquisition service.
    ///
    /// All jobs are fired concurrently - the acquisition boundary throttles
    /// itself. A single completion check runs after the all-settled join,
    /// not per job.
    pub async fn dispatch(&self, batch_id: &str) -> Result<()> {
        let jobs: Vec<DownloadJob> = self
            .store
            .get_jobs_for_batch(batch_id)?
            .into_iter()
            .filter(|j| j.status == JobStatus::Pending)
            .collect();

        if jobs.is_empty() {
            return self.check_batch_completion(batch_id).await;
        }

        let tag = Self::discovery_tag(batch_id);
        let outcomes = join_all(jobs.iter().map(|job| {
            let request = AcquisitionRequest {
                album_mbid: job.metadata.album_mbid.clone(),
                artist_name: job.metadata.artist_name.clone(),
                album_name: job.metadata.album_name.clone(),
                tag: tag.clone(),
            };
            async move { (job, self.acquisition.acquire_album(&request).await) }
        }))
        .await;

        for (job, outcome) in outcomes {
            match outcome {
                Ok(result) if result.success => {
                    self.store
                        .set_job_status(&job.id, JobStatus::Processing, None)?;
                    if let Some(correlation_id) = &result.correlation_id {
                        self.store.set_job_external_ref(&job.id, correlation_id)?;
                    }
                    debug!("Acquisition started for '{}'", job.subject);
                }
                Ok(result) => {
                    let reason = result
                        .error
                        .unwrap_or_else(|| "no release found".to_string());
                    self.store
                        .set_job_status(&job.id, JobStatus::Exhausted, Some(&reason))?;
                    info!("Acquisition exhausted for '{}': {}", job.subject, reason);
                }
                Err(e) => {
                    self.store
                        .set_job_status(&job.id, JobStatus::Failed, Some(&e.to_string()))?;
                    warn!("Acquisition failed for '{}': {}", job.subject, e);
                }
            }
        }

        self.store
            .append_batch_log(batch_id, &format!("dispatched {} jobs", jobs.len()))?;

        // Single synchronous completion check after all dispatches settled.
        self.check_batch_completion(batch_id).await
    }

    // =========================================================================
    // Acquisition result handlers
    // =========================================================================

    /// External import signalled success for a job.
    pub async fn handle_job_completed(&self, job_id: &str) -> Result<()> {
        let Some(job) = self.store.get_job(job_id)? else {
            bail!("Unknown download job {}", job_id);
        };
        if self
            .store
            .set_job_status(job_id, JobStatus::Completed, None)?
        {
            info!("Download job completed: {}", job.subject);
        }
        if let Some(batch_id) = &job.batch_id {
            self.check_batch_completion(batch_id).await?;
        }
        Ok(())
    }

    /// External download/import signalled failure for a job.
    pub async fn handle_job_failed(&self, job_id: &str, error: &str) -> Result<()> {
        let Some(job) = self.store.get_job(job_id)? else {
            bail!("Unknown download job {}", job_id);
        };
        if self
            .store
            .set_job_status(job_id, JobStatus::Failed, Some(error))?
        {
            info!("Download job failed: {} ({})", job.subject, error);
        }
        if let Some(batch_id) = &job.batch_id {
            self.check_batch_completion(batch_id).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Completion detection
    // =========================================================================

    /// Check whether a batch has finished downloading and advance it.
    ///
    /// Idempotent and reentrant-safe: the terminal/`scanning` guard runs
    /// before any counting or mutation, and the actual transition is
    /// version-guarded so concurrent triggers (webhook + sweep) cannot
    /// double-apply side effects.
    pub async fn check_batch_completion(&self, batch_id: &str) -> Result<()> {
        let Some(batch) = self.store.get_batch(batch_id)? else {
            return Ok(());
        };
        if batch.status != BatchStatus::Downloading {
            return Ok(());
        }

        let counts = self.store.count_jobs_for_batch(batch_id)?;
        if !counts.all_terminal() {
            // Still in flight - observers get a progress snapshot.
            self.emit_progress(&batch, &counts);
            return Ok(());
        }

        // Give the external import a moment to settle before deciding.
        if self.settings.import_grace_secs > 0 {
            tokio::time::sleep(Duration::from_secs(self.settings.import_grace_secs)).await;
        }

        let unavailable = self.unavailable_from_jobs(&batch)?;
        let new_status = if counts.completed == 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::Scanning
        };
        let transition = BatchTransition {
            status: new_status,
            completed_albums: counts.completed,
            failed_albums: counts.unsuccessful(),
            error_message: (new_status == BatchStatus::Failed)
                .then(|| "zero successful downloads".to_string()),
            final_song_count: None,
        };

        if !self
            .store
            .transition_batch(batch_id, batch.version, &transition, &unavailable)?
        {
            debug!("Batch {} completion check lost the transition race", batch_id);
            return Ok(());
        }

        let mut batch = batch;
        batch.status = new_status;
        batch.completed_albums = counts.completed;
        batch.failed_albums = counts.unsuccessful();

        match new_status {
            BatchStatus::Failed => {
                self.store
                    .append_batch_log(batch_id, "failed: zero successful downloads")?;
                warn!("Discovery batch {} failed: zero successful downloads", batch_id);
                // Partially-acquired resources are cleaned up best-effort.
                self.cleanup_failed_artists(&batch).await;
                self.cleanup_orphaned_queue(&batch).await;
                self.emit_complete(&batch, &counts, Some("zero successful downloads"));
            }
            BatchStatus::Scanning => {
                self.store.append_batch_log(
                    batch_id,
                    &format!(
                        "entering scan: {} completed, {} failed",
                        counts.completed,
                        counts.unsuccessful()
                    ),
                )?;
                // Exactly one scan job, tagged with the batch id. Playlist
                // assembly waits for the external scan-complete signal.
                self.work_queue.enqueue(
                    QueueName::LibraryScan,
                    serde_json::json!({ "batch_id": batch_id }),
                )?;
                self.emit_progress(&batch, &counts);
            }
            _ => {}
        }

        Ok(())
    }

    /// Unavailable-album rows for every unsuccessful job of a batch.
    pub(super) fn unavailable_from_jobs(
        &self,
        batch: &DiscoveryBatch,
    ) -> Result<Vec<UnavailableAlbum>> {
        let now = chrono::Utc::now().timestamp();
        Ok(self
            .store
            .get_jobs_for_batch(&batch.id)?
            .into_iter()
            .filter(|j| matches!(j.status, JobStatus::Failed | JobStatus::Exhausted))
            .map(|j| UnavailableAlbum {
                user_id: batch.user_id.clone(),
                week_start: batch.week_start,
                album_mbid: j.metadata.album_mbid,
                artist_name: j.metadata.artist_name,
                album_name: j.metadata.album_name,
                attempts: 1,
                last_failed_at: now,
            })
            .collect())
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub(super) fn progress_snapshot(
        batch: &DiscoveryBatch,
        counts: &BatchJobCounts,
    ) -> BatchProgress {
        BatchProgress {
            batch_id: batch.id.clone(),
            status: batch.status,
            completed: counts.completed,
            failed: counts.unsuccessful(),
            total: counts.total,
            progress: counts.progress_percent(),
        }
    }

    pub(super) fn emit_progress(&self, batch: &DiscoveryBatch, counts: &BatchJobCounts) {
        self.events.emit(DiscoveryEvent::Progress {
            user_id: batch.user_id.clone(),
            progress: Self::progress_snapshot(batch, counts),
        });
    }

    pub(super) fn emit_complete(
        &self,
        batch: &DiscoveryBatch,
        counts: &BatchJobCounts,
        error_message: Option<&str>,
    ) {
        self.events.emit(DiscoveryEvent::Complete {
            user_id: batch.user_id.clone(),
            progress: Self::progress_snapshot(batch, counts),
            error_message: error_message.map(String::from),
        });
    }
}
