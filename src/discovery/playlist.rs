//! Final playlist assembly.
//!
//! Triggered externally once the library scan for a batch completes.
//! Resolves each completed job's album to actual library tracks, blends in
//! anchor tracks from the user's own collection and persists the result
//! idempotently.

use super::orchestrator::DiscoveryOrchestrator;
use crate::discovery_store::{
    AcquisitionMetadata, BatchStatus, BatchTransition, DiscoveryAlbumRecord, DiscoveryBatch,
    DiscoveryTrackRecord, DownloadJob, JobStatus, Tier,
};
use crate::library_store::LibraryTrack;
use crate::recommend::normalize;
use anyhow::{bail, Result};
use rand::seq::{IndexedRandom, SliceRandom};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// One track of the assembled weekly playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistTrack {
    pub track_id: String,
    pub title: String,
    pub artist_name: String,
    /// Tier copied from the originating job; None for anchor tracks.
    pub tier: Option<Tier>,
    pub is_anchor: bool,
}

impl DiscoveryOrchestrator {
    /// Assemble and persist the final playlist for a scanned batch.
    ///
    /// Safe to call again for regeneration: discovery rows are upserted by
    /// their natural key, so counts stay stable.
    pub async fn build_final_playlist(&self, batch_id: &str) -> Result<Vec<PlaylistTrack>> {
        let Some(batch) = self.store.get_batch(batch_id)? else {
            bail!("Unknown batch {}", batch_id);
        };
        match batch.status {
            BatchStatus::Scanning | BatchStatus::Completed => {}
            other => bail!(
                "Batch {} is {}, not ready for playlist assembly",
                batch_id,
                other.as_str()
            ),
        }

        let jobs = self.store.get_jobs_for_batch(batch_id)?;
        let completed: Vec<&DownloadJob> = jobs
            .iter()
            .filter(|j| j.status == JobStatus::Completed && !j.metadata.library_anchor)
            .collect();

        // Discovery set: one random track per successfully imported album,
        // uncapped - every import gets representation.
        let mut seen_track_ids: HashSet<String> = HashSet::new();
        let mut discovery: Vec<PlaylistTrack> = Vec::new();
        let now = chrono::Utc::now().timestamp();
        let mut rng = rand::rng();

        for job in &completed {
            let tracks = self.resolve_album_tracks(&job.metadata)?;
            if tracks.is_empty() {
                // Unmatched jobs are logged, never fatal.
                warn!(
                    "No library tracks resolved for '{}' (batch {})",
                    job.subject, batch_id
                );
                continue;
            }

            let fresh: Vec<&LibraryTrack> = tracks
                .iter()
                .filter(|t| !seen_track_ids.contains(&t.id))
                .collect();
            let Some(chosen) = fresh.choose(&mut rng) else {
                debug!("All tracks of '{}' already represented", job.subject);
                continue;
            };
            seen_track_ids.insert(chosen.id.clone());

            // Tier and similarity come from job metadata verbatim - a
            // wildcard stays a wildcard even if its score says otherwise.
            self.store.upsert_discovery_album(
                &DiscoveryAlbumRecord {
                    user_id: batch.user_id.clone(),
                    week_start: batch.week_start,
                    album_mbid: job.metadata.album_mbid.clone(),
                    artist_name: job.metadata.artist_name.clone(),
                    album_name: job.metadata.album_name.clone(),
                    similarity: job.metadata.similarity,
                    tier: job.metadata.tier,
                    created_at: now,
                },
                &[DiscoveryTrackRecord {
                    track_id: chosen.id.clone(),
                    title: chosen.title.clone(),
                    artist_name: chosen.artist_name.clone(),
                    is_anchor: false,
                }],
            )?;

            discovery.push(PlaylistTrack {
                track_id: chosen.id.clone(),
                title: chosen.title.clone(),
                artist_name: chosen.artist_name.clone(),
                tier: Some(job.metadata.tier),
                is_anchor: false,
            });
        }

        let counts = self.store.count_jobs_for_batch(batch_id)?;

        if discovery.is_empty() {
            let message = "zero resolvable tracks after scan";
            if batch.status == BatchStatus::Scanning {
                let transition = BatchTransition {
                    status: BatchStatus::Failed,
                    completed_albums: counts.completed,
                    failed_albums: counts.unsuccessful(),
                    error_message: Some(message.to_string()),
                    final_song_count: Some(0),
                };
                if self
                    .store
                    .transition_batch(batch_id, batch.version, &transition, &[])?
                {
                    self.store.append_batch_log(batch_id, message)?;
                    let mut failed = batch.clone();
                    failed.status = BatchStatus::Failed;
                    self.emit_complete(&failed, &counts, Some(message));
                }
            }
            warn!(
                "Batch {}: {} (scan may not have imported yet)",
                batch_id, message
            );
            return Ok(vec![]);
        }

        // Anchors: familiar material, 20% of the discovery set, one per
        // album, seed artists first.
        let anchor_count =
            (discovery.len() as f64 * self.settings.anchor_ratio).ceil() as usize;
        let anchors = self.select_anchor_tracks(&batch, anchor_count, &mut seen_track_ids)?;

        // Refresh the suppression window for every surfaced album.
        let expires_at = now + self.settings.exclusion_window_days * 24 * 3600;
        for job in &completed {
            self.store
                .refresh_exclusion(&batch.user_id, &job.metadata.album_mbid, expires_at)?;
        }

        let mut playlist = discovery;
        playlist.extend(anchors);
        playlist.shuffle(&mut rng);

        let final_count = playlist.len() as u32;
        if batch.status == BatchStatus::Scanning {
            let transition = BatchTransition {
                status: BatchStatus::Completed,
                completed_albums: counts.completed,
                failed_albums: counts.unsuccessful(),
                error_message: None,
                final_song_count: Some(final_count),
            };
            if self
                .store
                .transition_batch(batch_id, batch.version, &transition, &[])?
            {
                self.store.append_batch_log(
                    batch_id,
                    &format!("completed with {} tracks", final_count),
                )?;
                info!(
                    "Discovery batch {} completed with {} tracks",
                    batch_id, final_count
                );
                let mut done = batch.clone();
                done.status = BatchStatus::Completed;
                self.emit_complete(&done, &counts, None);
            }
        }

        Ok(playlist)
    }

    /// Three-tier album-to-library-tracks resolution: exact canonical id,
    /// then case-insensitive artist+title, then normalized fuzzy key.
    pub(super) fn resolve_album_tracks(
        &self,
        metadata: &AcquisitionMetadata,
    ) -> Result<Vec<LibraryTrack>> {
        let by_mbid = self.library.tracks_for_album_mbid(&metadata.album_mbid)?;
        if !by_mbid.is_empty() {
            return Ok(by_mbid);
        }

        let by_name = self
            .library
            .tracks_for_album_named(&metadata.artist_name, &metadata.album_name)?;
        if !by_name.is_empty() {
            return Ok(by_name);
        }

        let (artist_key, title_key) =
            normalize::ownership_key(&metadata.artist_name, &metadata.album_name);
        self.library.tracks_for_album_key(&artist_key, &title_key)
    }

    /// Anchor selection: one track per album, drawn first from seed
    /// artists' library albums, backfilled from any library album.
    fn select_anchor_tracks(
        &self,
        batch: &DiscoveryBatch,
        anchor_count: usize,
        seen_track_ids: &mut HashSet<String>,
    ) -> Result<Vec<PlaylistTrack>> {
        let mut anchors: Vec<PlaylistTrack> = Vec::new();
        let mut used_album_ids: Vec<String> = Vec::new();
        let mut rng = rand::rng();

        let seeds = self
            .library
            .get_seed_artists(&batch.user_id, self.settings.seed_artist_limit)?;

        'seeds: for seed in &seeds {
            if anchors.len() >= anchor_count {
                break 'seeds;
            }
            for album in self.library.albums_by_artist(&seed.name)? {
                if anchors.len() >= anchor_count {
                    break 'seeds;
                }
                if used_album_ids.contains(&album.id) {
                    continue;
                }
                if let Some(track) =
                    self.pick_anchor_from_album(&album.id, seen_track_ids, &mut rng)?
                {
                    used_album_ids.push(album.id.clone());
                    anchors.push(track);
                }
            }
        }

        // Backfill from anywhere in the library if seed-artist supply ran
        // out.
        while anchors.len() < anchor_count {
            let Some(album) = self.library.random_album_excluding(&used_album_ids)? else {
                break;
            };
            used_album_ids.push(album.id.clone());
            if let Some(track) =
                self.pick_anchor_from_album(&album.id, seen_track_ids, &mut rng)?
            {
                anchors.push(track);
            }
        }

        Ok(anchors)
    }

    fn pick_anchor_from_album(
        &self,
        album_id: &str,
        seen_track_ids: &mut HashSet<String>,
        rng: &mut impl rand::Rng,
    ) -> Result<Option<PlaylistTrack>> {
        let tracks = self.library.tracks_for_album_id(album_id)?;
        let fresh: Vec<&LibraryTrack> = tracks
            .iter()
            .filter(|t| !seen_track_ids.contains(&t.id))
            .collect();
        let Some(chosen) = fresh.choose(rng) else {
            return Ok(None);
        };
        seen_track_ids.insert(chosen.id.clone());
        Ok(Some(PlaylistTrack {
            track_id: chosen.id.clone(),
            title: chosen.title.clone(),
            artist_name: chosen.artist_name.clone(),
            tier: None,
            is_anchor: true,
        }))
    }
}
