//! SQLite-backed discovery store.

use super::models::*;
use super::schema::DISCOVERY_VERSIONED_SCHEMAS;
use super::trait_def::DiscoveryStore;
use crate::sqlite_persistence;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

const DATE_FMT: &str = "%Y-%m-%d";

fn date_to_db(date: NaiveDate) -> String {
    date.format(DATE_FMT).to_string()
}

fn date_from_db(raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

/// SQLite-backed implementation of [`DiscoveryStore`].
pub struct SqliteDiscoveryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDiscoveryStore {
    /// Open an existing database or create a new one with the current schema.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn =
            sqlite_persistence::open_versioned(db_path, DISCOVERY_VERSIONED_SCHEMAS, "discovery")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    pub fn in_memory() -> Result<Self> {
        let conn = sqlite_persistence::open_in_memory(DISCOVERY_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_batch(row: &rusqlite::Row) -> rusqlite::Result<DiscoveryBatch> {
        Ok(DiscoveryBatch {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            week_start: date_from_db(&row.get::<_, String>("week_start")?)?,
            status: BatchStatus::from_str(&row.get::<_, String>("status")?)
                .unwrap_or(BatchStatus::Failed),
            target_song_count: row.get("target_song_count")?,
            total_albums: row.get("total_albums")?,
            completed_albums: row.get("completed_albums")?,
            failed_albums: row.get("failed_albums")?,
            error_message: row.get("error_message")?,
            final_song_count: row.get("final_song_count")?,
            created_at: row.get("created_at")?,
            completed_at: row.get("completed_at")?,
            version: row.get("version")?,
        })
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<DownloadJob> {
        let raw_metadata: String = row.get("metadata")?;
        let metadata = AcquisitionMetadata::parse(&raw_metadata).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
        })?;
        Ok(DownloadJob {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            subject: row.get("subject")?,
            kind: JobKind::from_str(&row.get::<_, String>("kind")?)
                .unwrap_or(JobKind::Discovery),
            target_mbid: row.get("target_mbid")?,
            status: JobStatus::from_str(&row.get::<_, String>("status")?)
                .unwrap_or(JobStatus::Failed),
            batch_id: row.get("batch_id")?,
            metadata,
            external_ref: row.get("external_ref")?,
            error: row.get("error")?,
            created_at: row.get("created_at")?,
            completed_at: row.get("completed_at")?,
        })
    }

    fn insert_job(tx: &rusqlite::Transaction, job: &DownloadJob) -> Result<()> {
        let metadata =
            serde_json::to_string(&job.metadata).context("Failed to serialize job metadata")?;
        tx.execute(
            "INSERT INTO download_job (
                id, user_id, subject, kind, target_mbid, status, batch_id,
                metadata, external_ref, error, created_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            rusqlite::params![
                job.id,
                job.user_id,
                job.subject,
                job.kind.as_str(),
                job.target_mbid,
                job.status.as_str(),
                job.batch_id,
                metadata,
                job.external_ref,
                job.error,
                job.created_at,
                job.completed_at,
            ],
        )?;
        Ok(())
    }

    fn record_unavailable(tx: &rusqlite::Transaction, album: &UnavailableAlbum) -> Result<()> {
        tx.execute(
            "INSERT INTO unavailable_album (
                user_id, week_start, album_mbid, artist_name, album_name,
                attempts, last_failed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (user_id, week_start, album_mbid) DO UPDATE SET
                attempts = attempts + 1,
                last_failed_at = excluded.last_failed_at",
            rusqlite::params![
                album.user_id,
                date_to_db(album.week_start),
                album.album_mbid,
                album.artist_name,
                album.album_name,
                album.attempts,
                album.last_failed_at,
            ],
        )?;
        Ok(())
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

impl DiscoveryStore for SqliteDiscoveryStore {
    // === Batches ===

    fn create_batch_with_jobs(&self, batch: &DiscoveryBatch, jobs: &[DownloadJob]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO discovery_batch (
                id, user_id, week_start, status, target_song_count,
                total_albums, completed_albums, failed_albums, error_message,
                final_song_count, created_at, completed_at, version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            rusqlite::params![
                batch.id,
                batch.user_id,
                date_to_db(batch.week_start),
                batch.status.as_str(),
                batch.target_song_count,
                jobs.len() as u32,
                batch.completed_albums,
                batch.failed_albums,
                batch.error_message,
                batch.final_song_count,
                batch.created_at,
                batch.completed_at,
                batch.version,
            ],
        )?;

        for job in jobs {
            Self::insert_job(&tx, job)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn get_batch(&self, id: &str) -> Result<Option<DiscoveryBatch>> {
        let conn = self.conn.lock().unwrap();
        let batch = conn
            .query_row(
                "SELECT * FROM discovery_batch WHERE id = ?1",
                [id],
                Self::row_to_batch,
            )
            .optional()?;
        Ok(batch)
    }

    fn get_active_batches(&self) -> Result<Vec<DiscoveryBatch>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM discovery_batch
             WHERE status IN ('DOWNLOADING', 'SCANNING')
             ORDER BY created_at ASC",
        )?;
        let batches = stmt
            .query_map([], Self::row_to_batch)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(batches)
    }

    fn get_completed_batches_since(&self, since: i64) -> Result<Vec<DiscoveryBatch>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM discovery_batch
             WHERE status = 'COMPLETED' AND completed_at >= ?1
             ORDER BY completed_at ASC",
        )?;
        let batches = stmt
            .query_map([since], Self::row_to_batch)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(batches)
    }

    fn transition_batch(
        &self,
        id: &str,
        expected_version: i64,
        transition: &BatchTransition,
        unavailable: &[UnavailableAlbum],
    ) -> Result<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let completed_at = transition.status.is_terminal().then(Self::now);

        // The version + non-terminal guard makes this safe against
        // concurrent sweep/webhook triggers and keeps status monotonic.
        let changed = tx.execute(
            "UPDATE discovery_batch SET
                status = ?1,
                completed_albums = ?2,
                failed_albums = ?3,
                error_message = ?4,
                final_song_count = ?5,
                completed_at = COALESCE(?6, completed_at),
                version = version + 1
             WHERE id = ?7
               AND version = ?8
               AND status IN ('DOWNLOADING', 'SCANNING')",
            rusqlite::params![
                transition.status.as_str(),
                transition.completed_albums,
                transition.failed_albums,
                transition.error_message,
                transition.final_song_count,
                completed_at,
                id,
                expected_version,
            ],
        )?;

        if changed == 0 {
            return Ok(false);
        }

        for album in unavailable {
            Self::record_unavailable(&tx, album)?;
        }

        tx.commit()?;
        Ok(true)
    }

    fn append_batch_log(&self, batch_id: &str, message: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO discovery_batch_log (batch_id, timestamp, message)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![batch_id, Self::now(), message],
        )?;
        Ok(())
    }

    fn get_batch_log(&self, batch_id: &str) -> Result<Vec<BatchLogEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT seq, batch_id, timestamp, message
             FROM discovery_batch_log WHERE batch_id = ?1 ORDER BY seq ASC",
        )?;
        let entries = stmt
            .query_map([batch_id], |row| {
                Ok(BatchLogEntry {
                    seq: row.get(0)?,
                    batch_id: row.get(1)?,
                    timestamp: row.get(2)?,
                    message: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    // === Jobs ===

    fn get_job(&self, id: &str) -> Result<Option<DownloadJob>> {
        let conn = self.conn.lock().unwrap();
        let job = conn
            .query_row(
                "SELECT * FROM download_job WHERE id = ?1",
                [id],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    fn add_job(&self, job: &DownloadJob) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        Self::insert_job(&tx, job)?;
        tx.commit()?;
        Ok(())
    }

    fn get_jobs_for_batch(&self, batch_id: &str) -> Result<Vec<DownloadJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM download_job WHERE batch_id = ?1 ORDER BY created_at ASC, id ASC",
        )?;
        let jobs = stmt
            .query_map([batch_id], Self::row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn count_jobs_for_batch(&self, batch_id: &str) -> Result<BatchJobCounts> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM download_job WHERE batch_id = ?1 GROUP BY status",
        )?;
        let mut counts = BatchJobCounts::default();
        let rows = stmt.query_map([batch_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            counts.total += count;
            match JobStatus::from_str(&status) {
                Some(JobStatus::Pending) => counts.pending += count,
                Some(JobStatus::Processing) => counts.processing += count,
                Some(JobStatus::Completed) => counts.completed += count,
                Some(JobStatus::Failed) => counts.failed += count,
                Some(JobStatus::Exhausted) => counts.exhausted += count,
                None => {}
            }
        }
        Ok(counts)
    }

    fn has_active_job_for_target(&self, target_mbid: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM download_job
             WHERE target_mbid = ?1 AND status IN ('PENDING', 'PROCESSING')",
            [target_mbid],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn set_job_status(&self, id: &str, status: JobStatus, error: Option<&str>) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let completed_at = status.is_terminal().then(Self::now);
        let changed = conn.execute(
            "UPDATE download_job SET
                status = ?1,
                error = COALESCE(?2, error),
                completed_at = COALESCE(?3, completed_at)
             WHERE id = ?4
               AND status IN ('PENDING', 'PROCESSING')",
            rusqlite::params![status.as_str(), error, completed_at, id],
        )?;
        Ok(changed > 0)
    }

    fn set_job_external_ref(&self, id: &str, external_ref: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE download_job SET external_ref = ?1 WHERE id = ?2",
            rusqlite::params![external_ref, id],
        )?;
        Ok(())
    }

    fn fail_open_jobs_for_batch(&self, batch_id: &str, reason: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE download_job SET
                status = 'FAILED',
                error = ?1,
                completed_at = ?2
             WHERE batch_id = ?3
               AND status IN ('PENDING', 'PROCESSING')",
            rusqlite::params![reason, Self::now(), batch_id],
        )?;
        Ok(changed)
    }

    // === Discovery results ===

    fn upsert_discovery_album(
        &self,
        album: &DiscoveryAlbumRecord,
        tracks: &[DiscoveryTrackRecord],
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let week = date_to_db(album.week_start);

        tx.execute(
            "INSERT INTO discovery_album (
                user_id, week_start, album_mbid, artist_name, album_name,
                similarity, tier, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (user_id, week_start, album_mbid) DO UPDATE SET
                artist_name = excluded.artist_name,
                album_name = excluded.album_name,
                similarity = excluded.similarity,
                tier = excluded.tier",
            rusqlite::params![
                album.user_id,
                week,
                album.album_mbid,
                album.artist_name,
                album.album_name,
                album.similarity,
                album.tier.as_str(),
                album.created_at,
            ],
        )?;

        // Replace the track set wholesale so regeneration stays idempotent.
        tx.execute(
            "DELETE FROM discovery_track
             WHERE user_id = ?1 AND week_start = ?2 AND album_mbid = ?3",
            rusqlite::params![album.user_id, week, album.album_mbid],
        )?;
        for track in tracks {
            tx.execute(
                "INSERT INTO discovery_track (
                    user_id, week_start, album_mbid, track_id, title,
                    artist_name, is_anchor
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    album.user_id,
                    week,
                    album.album_mbid,
                    track.track_id,
                    track.title,
                    track.artist_name,
                    track.is_anchor,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn get_discovery_albums(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Vec<DiscoveryAlbumRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT user_id, week_start, album_mbid, artist_name, album_name,
                    similarity, tier, created_at
             FROM discovery_album
             WHERE user_id = ?1 AND week_start = ?2
             ORDER BY album_mbid ASC",
        )?;
        let albums = stmt
            .query_map(
                rusqlite::params![user_id, date_to_db(week_start)],
                |row| {
                    Ok(DiscoveryAlbumRecord {
                        user_id: row.get(0)?,
                        week_start: date_from_db(&row.get::<_, String>(1)?)?,
                        album_mbid: row.get(2)?,
                        artist_name: row.get(3)?,
                        album_name: row.get(4)?,
                        similarity: row.get(5)?,
                        tier: Tier::from_str(&row.get::<_, String>(6)?)
                            .unwrap_or(Tier::Wildcard),
                        created_at: row.get(7)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(albums)
    }

    fn get_discovery_tracks(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        album_mbid: &str,
    ) -> Result<Vec<DiscoveryTrackRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT track_id, title, artist_name, is_anchor
             FROM discovery_track
             WHERE user_id = ?1 AND week_start = ?2 AND album_mbid = ?3
             ORDER BY track_id ASC",
        )?;
        let tracks = stmt
            .query_map(
                rusqlite::params![user_id, date_to_db(week_start), album_mbid],
                |row| {
                    Ok(DiscoveryTrackRecord {
                        track_id: row.get(0)?,
                        title: row.get(1)?,
                        artist_name: row.get(2)?,
                        is_anchor: row.get(3)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    fn has_discovery_album(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        album_mbid: &str,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM discovery_album
             WHERE user_id = ?1 AND week_start = ?2 AND album_mbid = ?3",
            rusqlite::params![user_id, date_to_db(week_start), album_mbid],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    // === Unavailable albums ===

    fn get_unavailable_albums(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Vec<UnavailableAlbum>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT user_id, week_start, album_mbid, artist_name, album_name,
                    attempts, last_failed_at
             FROM unavailable_album
             WHERE user_id = ?1 AND week_start = ?2
             ORDER BY album_mbid ASC",
        )?;
        let albums = stmt
            .query_map(
                rusqlite::params![user_id, date_to_db(week_start)],
                |row| {
                    Ok(UnavailableAlbum {
                        user_id: row.get(0)?,
                        week_start: date_from_db(&row.get::<_, String>(1)?)?,
                        album_mbid: row.get(2)?,
                        artist_name: row.get(3)?,
                        album_name: row.get(4)?,
                        attempts: row.get(5)?,
                        last_failed_at: row.get(6)?,
                    })
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(albums)
    }

    // === Exclusions ===

    fn refresh_exclusion(&self, user_id: &str, album_mbid: &str, expires_at: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO discover_exclusion (user_id, album_mbid, expires_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id, album_mbid) DO UPDATE SET
                expires_at = excluded.expires_at",
            rusqlite::params![user_id, album_mbid, expires_at],
        )?;
        Ok(())
    }

    fn get_active_exclusions(&self, user_id: &str, now: i64) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT album_mbid FROM discover_exclusion
             WHERE user_id = ?1 AND expires_at > ?2",
        )?;
        let mbids = stmt
            .query_map(rusqlite::params![user_id, now], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(mbids)
    }

    // === User settings ===

    fn get_user_discovery_settings(&self, user_id: &str) -> Result<Option<UserDiscoverySettings>> {
        let conn = self.conn.lock().unwrap();
        let settings = conn
            .query_row(
                "SELECT user_id, enabled, target_song_count
                 FROM user_discovery_settings WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok(UserDiscoverySettings {
                        user_id: row.get(0)?,
                        enabled: row.get(1)?,
                        target_song_count: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(settings)
    }

    fn set_user_discovery_settings(&self, settings: &UserDiscoverySettings) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user_discovery_settings (user_id, enabled, target_song_count)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id) DO UPDATE SET
                enabled = excluded.enabled,
                target_song_count = excluded.target_song_count",
            rusqlite::params![settings.user_id, settings.enabled, settings.target_song_count],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn week() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn metadata(mbid: &str, tier: Tier) -> AcquisitionMetadata {
        AcquisitionMetadata {
            artist_name: format!("Artist {}", mbid),
            album_name: format!("Album {}", mbid),
            album_mbid: mbid.to_string(),
            similarity: 0.7,
            tier,
            library_anchor: false,
        }
    }

    fn batch_with_jobs(store: &SqliteDiscoveryStore, n: usize) -> (DiscoveryBatch, Vec<DownloadJob>) {
        let batch = DiscoveryBatch::new("u1", week(), 30);
        let jobs: Vec<DownloadJob> = (0..n)
            .map(|i| DownloadJob::new("u1", &batch.id, metadata(&format!("m{}", i), Tier::High)))
            .collect();
        store.create_batch_with_jobs(&batch, &jobs).unwrap();
        (batch, jobs)
    }

    #[test]
    fn test_create_and_get_batch() {
        let store = SqliteDiscoveryStore::in_memory().unwrap();
        let (batch, jobs) = batch_with_jobs(&store, 3);

        let loaded = store.get_batch(&batch.id).unwrap().unwrap();
        assert_eq!(loaded.status, BatchStatus::Downloading);
        assert_eq!(loaded.total_albums, 3);
        assert_eq!(loaded.week_start, week());
        assert_eq!(loaded.version, 0);

        let loaded_jobs = store.get_jobs_for_batch(&batch.id).unwrap();
        assert_eq!(loaded_jobs.len(), 3);
        assert_eq!(loaded_jobs[0].metadata, jobs[0].metadata);
    }

    #[test]
    fn test_job_counts() {
        let store = SqliteDiscoveryStore::in_memory().unwrap();
        let (batch, jobs) = batch_with_jobs(&store, 3);

        store
            .set_job_status(&jobs[0].id, JobStatus::Completed, None)
            .unwrap();
        store
            .set_job_status(&jobs[1].id, JobStatus::Failed, Some("no source"))
            .unwrap();

        let counts = store.count_jobs_for_batch(&batch.id).unwrap();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.pending, 1);
        assert!(!counts.all_terminal());
    }

    #[test]
    fn test_terminal_job_never_reopened() {
        let store = SqliteDiscoveryStore::in_memory().unwrap();
        let (_, jobs) = batch_with_jobs(&store, 1);

        assert!(store
            .set_job_status(&jobs[0].id, JobStatus::Completed, None)
            .unwrap());
        // Attempting to fail a completed job is a no-op.
        assert!(!store
            .set_job_status(&jobs[0].id, JobStatus::Failed, Some("late"))
            .unwrap());

        let job = store.get_job(&jobs[0].id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.error.is_none());
    }

    #[test]
    fn test_active_job_dedup_check() {
        let store = SqliteDiscoveryStore::in_memory().unwrap();
        let (_, jobs) = batch_with_jobs(&store, 1);

        assert!(store.has_active_job_for_target("m0").unwrap());
        store
            .set_job_status(&jobs[0].id, JobStatus::Completed, None)
            .unwrap();
        assert!(!store.has_active_job_for_target("m0").unwrap());
    }

    #[test]
    fn test_transition_version_guard() {
        let store = SqliteDiscoveryStore::in_memory().unwrap();
        let (batch, _) = batch_with_jobs(&store, 2);

        let transition = BatchTransition {
            status: BatchStatus::Scanning,
            completed_albums: 1,
            failed_albums: 1,
            error_message: None,
            final_song_count: None,
        };

        assert!(store
            .transition_batch(&batch.id, 0, &transition, &[])
            .unwrap());
        // Stale version loses.
        assert!(!store
            .transition_batch(&batch.id, 0, &transition, &[])
            .unwrap());

        let loaded = store.get_batch(&batch.id).unwrap().unwrap();
        assert_eq!(loaded.status, BatchStatus::Scanning);
        assert_eq!(loaded.version, 1);
    }

    #[test]
    fn test_transition_monotonic_terminal_absorbing() {
        let store = SqliteDiscoveryStore::in_memory().unwrap();
        let (batch, _) = batch_with_jobs(&store, 1);

        let fail = BatchTransition {
            status: BatchStatus::Failed,
            completed_albums: 0,
            failed_albums: 1,
            error_message: Some("all downloads failed".to_string()),
            final_song_count: None,
        };
        assert!(store.transition_batch(&batch.id, 0, &fail, &[]).unwrap());

        // Even with the fresh version, a terminal batch cannot move.
        let back = BatchTransition {
            status: BatchStatus::Scanning,
            completed_albums: 0,
            failed_albums: 0,
            error_message: None,
            final_song_count: None,
        };
        assert!(!store.transition_batch(&batch.id, 1, &back, &[]).unwrap());

        let loaded = store.get_batch(&batch.id).unwrap().unwrap();
        assert_eq!(loaded.status, BatchStatus::Failed);
        assert!(loaded.completed_at.is_some());
    }

    #[test]
    fn test_transition_writes_unavailable_in_same_call() {
        let store = SqliteDiscoveryStore::in_memory().unwrap();
        let (batch, _) = batch_with_jobs(&store, 1);

        let unavailable = UnavailableAlbum {
            user_id: "u1".to_string(),
            week_start: week(),
            album_mbid: "m0".to_string(),
            artist_name: "Artist m0".to_string(),
            album_name: "Album m0".to_string(),
            attempts: 1,
            last_failed_at: 123,
        };
        let transition = BatchTransition {
            status: BatchStatus::Failed,
            completed_albums: 0,
            failed_albums: 1,
            error_message: Some("zero successful downloads".to_string()),
            final_song_count: None,
        };
        assert!(store
            .transition_batch(&batch.id, 0, &transition, &[unavailable.clone()])
            .unwrap());
        // A losing guard writes nothing.
        assert!(!store
            .transition_batch(&batch.id, 0, &transition, &[unavailable])
            .unwrap());

        let rows = store.get_unavailable_albums("u1", week()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].attempts, 1);
    }

    #[test]
    fn test_unavailable_attempt_counter() {
        let store = SqliteDiscoveryStore::in_memory().unwrap();
        let (batch, _) = batch_with_jobs(&store, 1);
        let album = UnavailableAlbum {
            user_id: "u1".to_string(),
            week_start: week(),
            album_mbid: "m9".to_string(),
            artist_name: "A".to_string(),
            album_name: "B".to_string(),
            attempts: 1,
            last_failed_at: 50,
        };
        let t1 = BatchTransition {
            status: BatchStatus::Scanning,
            completed_albums: 1,
            failed_albums: 1,
            error_message: None,
            final_song_count: None,
        };
        store
            .transition_batch(&batch.id, 0, &t1, &[album.clone()])
            .unwrap();
        let t2 = BatchTransition {
            status: BatchStatus::Completed,
            completed_albums: 1,
            failed_albums: 1,
            error_message: None,
            final_song_count: Some(5),
        };
        let mut again = album.clone();
        again.last_failed_at = 60;
        store
            .transition_batch(&batch.id, 1, &t2, &[again])
            .unwrap();

        let rows = store.get_unavailable_albums("u1", week()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].attempts, 2);
        assert_eq!(rows[0].last_failed_at, 60);
    }

    #[test]
    fn test_fail_open_jobs() {
        let store = SqliteDiscoveryStore::in_memory().unwrap();
        let (batch, jobs) = batch_with_jobs(&store, 3);
        store
            .set_job_status(&jobs[0].id, JobStatus::Completed, None)
            .unwrap();

        let failed = store.fail_open_jobs_for_batch(&batch.id, "timeout").unwrap();
        assert_eq!(failed, 2);

        let counts = store.count_jobs_for_batch(&batch.id).unwrap();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 2);
        assert!(counts.all_terminal());

        let job = store.get_job(&jobs[1].id).unwrap().unwrap();
        assert_eq!(job.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_discovery_album_upsert_idempotent() {
        let store = SqliteDiscoveryStore::in_memory().unwrap();
        let album = DiscoveryAlbumRecord {
            user_id: "u1".to_string(),
            week_start: week(),
            album_mbid: "m1".to_string(),
            artist_name: "A".to_string(),
            album_name: "B".to_string(),
            similarity: 0.8,
            tier: Tier::High,
            created_at: 1,
        };
        let tracks = vec![DiscoveryTrackRecord {
            track_id: "t1".to_string(),
            title: "Song".to_string(),
            artist_name: "A".to_string(),
            is_anchor: false,
        }];

        store.upsert_discovery_album(&album, &tracks).unwrap();
        store.upsert_discovery_album(&album, &tracks).unwrap();

        let albums = store.get_discovery_albums("u1", week()).unwrap();
        assert_eq!(albums.len(), 1);
        let stored_tracks = store.get_discovery_tracks("u1", week(), "m1").unwrap();
        assert_eq!(stored_tracks.len(), 1);
        assert!(store.has_discovery_album("u1", week(), "m1").unwrap());
    }

    #[test]
    fn test_exclusion_refresh_not_duplicate() {
        let store = SqliteDiscoveryStore::in_memory().unwrap();
        store.refresh_exclusion("u1", "m1", 100).unwrap();
        store.refresh_exclusion("u1", "m1", 200).unwrap();

        assert_eq!(store.get_active_exclusions("u1", 150).unwrap(), vec!["m1"]);
        assert!(store.get_active_exclusions("u1", 250).unwrap().is_empty());
    }

    #[test]
    fn test_user_settings_round_trip() {
        let store = SqliteDiscoveryStore::in_memory().unwrap();
        assert!(store.get_user_discovery_settings("u1").unwrap().is_none());

        store
            .set_user_discovery_settings(&UserDiscoverySettings {
                user_id: "u1".to_string(),
                enabled: true,
                target_song_count: 25,
            })
            .unwrap();

        let settings = store.get_user_discovery_settings("u1").unwrap().unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.target_song_count, 25);
    }

    #[test]
    fn test_batch_log_append_only() {
        let store = SqliteDiscoveryStore::in_memory().unwrap();
        let (batch, _) = batch_with_jobs(&store, 1);
        store.append_batch_log(&batch.id, "dispatched 1 job").unwrap();
        store.append_batch_log(&batch.id, "entering scanning").unwrap();

        let log = store.get_batch_log(&batch.id).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].message, "dispatched 1 job");
        assert!(log[0].seq < log[1].seq);
    }
}
