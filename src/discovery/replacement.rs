//! On-demand substitution search for failed jobs.

use super::orchestrator::DiscoveryOrchestrator;
use crate::discovery_store::{AcquisitionMetadata, DownloadJob};
use crate::recommend::{RecommendedAlbum, DEFAULT_SIMILARITY};
use anyhow::{bail, Result};
use rand::seq::IndexedRandom;
use tracing::info;

/// Result of a replacement search.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplacementAlbum {
    pub album: RecommendedAlbum,
    /// True when the substitute is an already-owned library album to blend
    /// in, not something to download.
    pub library_anchor: bool,
}

impl DiscoveryOrchestrator {
    /// Find a substitute for a failed job.
    ///
    /// Tier 2 searches the seeds' extended similarity lists for an artist
    /// not yet represented in the batch - diversity is enforced strictly,
    /// including against the artist that just failed. Tier 3, only if no
    /// new artist is found, falls back to a random already-owned album
    /// from a seed artist, flagged as a library anchor.
    pub async fn find_replacement_album(
        &self,
        failed_job: &DownloadJob,
    ) -> Result<Option<ReplacementAlbum>> {
        let Some(batch_id) = &failed_job.batch_id else {
            bail!("Job {} belongs to no batch", failed_job.id);
        };

        // Every artist the batch already attempted is off the table.
        let attempted: Vec<String> = self
            .store
            .get_jobs_for_batch(batch_id)?
            .into_iter()
            .map(|j| j.metadata.artist_name)
            .collect();

        if let Some(album) = self
            .engine
            .find_substitute(&failed_job.user_id, &attempted, failed_job.metadata.tier)
            .await?
        {
            info!(
                "Replacement for '{}': '{}' by {}",
                failed_job.subject, album.album_name, album.artist_name
            );
            return Ok(Some(ReplacementAlbum {
                album,
                library_anchor: false,
            }));
        }

        // No fresh artist anywhere - hand back something already owned.
        let seeds = self
            .library
            .get_seed_artists(&failed_job.user_id, self.settings.seed_artist_limit)?;
        let mut rng = rand::rng();
        for seed in &seeds {
            let albums = self.library.albums_by_artist(&seed.name)?;
            let candidates: Vec<_> = albums
                .iter()
                .filter(|a| !attempted.iter().any(|name| name.eq_ignore_ascii_case(&a.artist_name)))
                .collect();
            if let Some(album) = candidates.choose(&mut rng) {
                info!(
                    "Replacement for '{}': library anchor '{}' by {}",
                    failed_job.subject, album.title, album.artist_name
                );
                return Ok(Some(ReplacementAlbum {
                    album: RecommendedAlbum {
                        artist_name: album.artist_name.clone(),
                        album_name: album.title.clone(),
                        album_mbid: album
                            .mbid
                            .clone()
                            .unwrap_or_else(|| format!("library:{}", album.id)),
                        similarity: DEFAULT_SIMILARITY,
                        tier: failed_job.metadata.tier,
                    },
                    library_anchor: true,
                }));
            }
        }

        Ok(None)
    }

    /// Run the replacement search for a failed job and, when the
    /// substitute needs downloading, create and dispatch a fresh job in
    /// the same batch. The failed job itself is never reopened.
    pub async fn queue_replacement_job(
        &self,
        failed_job: &DownloadJob,
    ) -> Result<Option<DownloadJob>> {
        let Some(replacement) = self.find_replacement_album(failed_job).await? else {
            return Ok(None);
        };
        let Some(batch_id) = &failed_job.batch_id else {
            return Ok(None);
        };

        let metadata = AcquisitionMetadata {
            artist_name: replacement.album.artist_name,
            album_name: replacement.album.album_name,
            album_mbid: replacement.album.album_mbid,
            similarity: replacement.album.similarity,
            tier: replacement.album.tier,
            library_anchor: replacement.library_anchor,
        };
        let job = DownloadJob::replacement(&failed_job.user_id, batch_id, metadata);
        self.store.add_job(&job)?;
        self.store.append_batch_log(
            batch_id,
            &format!("replacement job created: {}", job.subject),
        )?;

        if replacement.library_anchor {
            // Nothing to download for an owned album; the job just marks
            // the substitution for playlist assembly.
            self.store.set_job_status(
                &job.id,
                crate::discovery_store::JobStatus::Completed,
                None,
            )?;
        } else {
            self.dispatch(batch_id).await?;
        }

        self.store
            .get_job(&job.id)?
            .ok_or_else(|| anyhow::anyhow!("Replacement job {} vanished", job.id))
            .map(Some)
    }
}
