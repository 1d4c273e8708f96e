//! SQLite-backed enrichment store.

use super::models::*;
use super::schema::ENRICHMENT_VERSIONED_SCHEMAS;
use super::trait_def::EnrichmentStore;
use crate::sqlite_persistence;
use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite-backed implementation of [`EnrichmentStore`].
pub struct SqliteEnrichmentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEnrichmentStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = sqlite_persistence::open_versioned(
            db_path,
            ENRICHMENT_VERSIONED_SCHEMAS,
            "enrichment",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    pub fn in_memory() -> Result<Self> {
        let conn = sqlite_persistence::open_in_memory(ENRICHMENT_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn phase_counts(&self, table: &str) -> Result<PhaseCounts> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT status, COUNT(*) FROM {} GROUP BY status",
            table
        ))?;
        let mut counts = PhaseCounts::default();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            counts.total += count;
            match ItemStatus::from_str(&status) {
                Some(ItemStatus::Done) => counts.completed += count,
                Some(ItemStatus::Failed) => counts.failed += count,
                Some(ItemStatus::Processing) => counts.processing += count,
                _ => {}
            }
        }
        Ok(counts)
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }
}

impl EnrichmentStore for SqliteEnrichmentStore {
    // === Controller state ===

    fn get_state(&self) -> Result<EnrichmentState> {
        let conn = self.conn.lock().unwrap();
        let state = conn
            .query_row("SELECT * FROM enrichment_state WHERE id = 1", [], |row| {
                let artists: String = row.get("artists")?;
                let tracks: String = row.get("tracks")?;
                let audio: String = row.get("audio")?;
                let vibe: String = row.get("vibe")?;
                Ok((
                    row.get::<_, String>("status")?,
                    row.get::<_, Option<String>>("current_phase")?,
                    artists,
                    tracks,
                    audio,
                    vibe,
                    row.get::<_, bool>("core_cache_cleared")?,
                    row.get::<_, bool>("completion_notification_sent")?,
                    row.get::<_, bool>("full_cache_cleared")?,
                    row.get::<_, i64>("updated_at")?,
                ))
            })
            .optional()?;

        let Some((
            status,
            current_phase,
            artists,
            tracks,
            audio,
            vibe,
            core_cache_cleared,
            completion_notification_sent,
            full_cache_cleared,
            updated_at,
        )) = state
        else {
            return Ok(EnrichmentState::default());
        };

        Ok(EnrichmentState {
            status: EnrichmentStatus::from_str(&status).unwrap_or(EnrichmentStatus::Idle),
            current_phase: current_phase.as_deref().and_then(EnrichmentPhase::from_str),
            artists: serde_json::from_str(&artists).context("Corrupt artists progress")?,
            tracks: serde_json::from_str(&tracks).context("Corrupt tracks progress")?,
            audio: serde_json::from_str(&audio).context("Corrupt audio progress")?,
            vibe: serde_json::from_str(&vibe).context("Corrupt vibe progress")?,
            core_cache_cleared,
            completion_notification_sent,
            full_cache_cleared,
            updated_at,
        })
    }

    fn save_state(&self, state: &EnrichmentState) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO enrichment_state (
                id, status, current_phase, artists, tracks, audio, vibe,
                core_cache_cleared, completion_notification_sent,
                full_cache_cleared, updated_at
            ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (id) DO UPDATE SET
                status = excluded.status,
                current_phase = excluded.current_phase,
                artists = excluded.artists,
                tracks = excluded.tracks,
                audio = excluded.audio,
                vibe = excluded.vibe,
                core_cache_cleared = excluded.core_cache_cleared,
                completion_notification_sent = excluded.completion_notification_sent,
                full_cache_cleared = excluded.full_cache_cleared,
                updated_at = excluded.updated_at",
            rusqlite::params![
                state.status.as_str(),
                state.current_phase.map(|p| p.as_str()),
                serde_json::to_string(&state.artists)?,
                serde_json::to_string(&state.tracks)?,
                serde_json::to_string(&state.audio)?,
                serde_json::to_string(&state.vibe)?,
                state.core_cache_cleared,
                state.completion_notification_sent,
                state.full_cache_cleared,
                state.updated_at,
            ],
        )?;
        Ok(())
    }

    // === Entity registration ===

    fn register_artist(&self, id: &str, name: &str, mbid: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO artist_enrichment (artist_id, name, mbid, status)
             VALUES (?1, ?2, ?3, 'PENDING')",
            rusqlite::params![id, name, mbid],
        )?;
        Ok(())
    }

    fn register_track(&self, id: &str, title: &str, artist_name: &str) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO track_mood (track_id, title, artist_name)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![id, title, artist_name],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO audio_analysis (track_id, status) VALUES (?1, 'PENDING')",
            [id],
        )?;
        tx.execute(
            "INSERT OR IGNORE INTO vibe_embedding (track_id, status) VALUES (?1, 'PENDING')",
            [id],
        )?;
        tx.commit()?;
        Ok(())
    }

    // === Artists ===

    fn select_artists_for_enrichment(&self, limit: usize) -> Result<Vec<PendingArtist>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT artist_id, name, mbid FROM artist_enrichment
             WHERE status IN ('PENDING', 'FAILED')
             ORDER BY CASE status WHEN 'PENDING' THEN 0 ELSE 1 END, artist_id
             LIMIT ?1",
        )?;
        let artists = stmt
            .query_map([limit], |row| {
                Ok(PendingArtist {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    mbid: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(artists)
    }

    fn set_artist_status(&self, id: &str, status: ItemStatus) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE artist_enrichment SET status = ?1, updated_at = ?2 WHERE artist_id = ?3",
            rusqlite::params![status.as_str(), Self::now(), id],
        )?;
        Ok(())
    }

    fn set_artist_profile(&self, id: &str, profile: &serde_json::Value) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE artist_enrichment SET status = 'DONE', profile = ?1, updated_at = ?2
             WHERE artist_id = ?3",
            rusqlite::params![serde_json::to_string(profile)?, Self::now(), id],
        )?;
        Ok(())
    }

    fn artist_counts(&self) -> Result<PhaseCounts> {
        self.phase_counts("artist_enrichment")
    }

    fn reset_artists_to_pending(&self, ids: &[String]) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let mut changed = 0;
        for id in ids {
            changed += conn.execute(
                "UPDATE artist_enrichment SET status = 'PENDING' WHERE artist_id = ?1",
                [id],
            )?;
        }
        Ok(changed)
    }

    // === Track moods ===

    fn select_tracks_missing_moods(&self, limit: usize) -> Result<Vec<PendingTrack>> {
        let conn = self.conn.lock().unwrap();
        // Newly scanned tracks have NULL, re-enriched ones may carry an
        // empty array. Both count as unchecked.
        let mut stmt = conn.prepare(
            "SELECT track_id, title, artist_name FROM track_mood
             WHERE moods IS NULL OR moods = '[]'
             ORDER BY track_id
             LIMIT ?1",
        )?;
        let tracks = stmt
            .query_map([limit], |row| {
                Ok(PendingTrack {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    artist_name: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    fn set_track_moods(&self, id: &str, moods: &[String]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE track_mood SET moods = ?1, updated_at = ?2 WHERE track_id = ?3",
            rusqlite::params![serde_json::to_string(moods)?, Self::now(), id],
        )?;
        Ok(())
    }

    fn get_track_moods(&self, id: &str) -> Result<Option<Vec<String>>> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<Option<String>> = conn
            .query_row(
                "SELECT moods FROM track_mood WHERE track_id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        match raw.flatten() {
            Some(json) => Ok(Some(
                serde_json::from_str(&json).context("Corrupt moods column")?,
            )),
            None => Ok(None),
        }
    }

    fn track_counts(&self) -> Result<PhaseCounts> {
        let conn = self.conn.lock().unwrap();
        let (total, tagged): (u32, u32) = conn.query_row(
            "SELECT COUNT(*),
                    COUNT(CASE WHEN moods IS NOT NULL AND moods != '[]' THEN 1 END)
             FROM track_mood",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(PhaseCounts {
            total,
            completed: tagged,
            failed: 0,
            processing: 0,
        })
    }

    // === Audio analysis ===

    fn select_audio_pending(&self, limit: usize) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT track_id FROM audio_analysis
             WHERE status = 'PENDING' ORDER BY track_id LIMIT ?1",
        )?;
        let ids = stmt
            .query_map([limit], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    fn mark_audio_queued(&self, track_ids: &[String], now: i64) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for id in track_ids {
            tx.execute(
                "UPDATE audio_analysis SET status = 'PROCESSING', queued_at = ?1
                 WHERE track_id = ?2",
                rusqlite::params![now, id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn reset_stale_audio(&self, cutoff: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE audio_analysis SET status = 'PENDING', queued_at = NULL
             WHERE status = 'PROCESSING' AND queued_at < ?1",
            [cutoff],
        )?;
        Ok(changed)
    }

    fn mark_audio_done(&self, track_id: &str, completed_at: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE audio_analysis SET status = 'DONE', completed_at = ?1 WHERE track_id = ?2",
            rusqlite::params![completed_at, track_id],
        )?;
        Ok(())
    }

    fn mark_audio_failed(&self, track_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE audio_analysis SET status = 'FAILED' WHERE track_id = ?1",
            [track_id],
        )?;
        Ok(())
    }

    fn count_audio_completed_since(&self, since: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM audio_analysis
             WHERE status = 'DONE' AND completed_at >= ?1",
            [since],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn audio_counts(&self) -> Result<PhaseCounts> {
        self.phase_counts("audio_analysis")
    }

    // === Vibe embeddings ===

    fn select_vibe_pending(&self, limit: usize) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT track_id FROM vibe_embedding
             WHERE status = 'PENDING' ORDER BY track_id LIMIT ?1",
        )?;
        let ids = stmt
            .query_map([limit], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    fn mark_vibe_queued(&self, track_ids: &[String], now: i64) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for id in track_ids {
            tx.execute(
                "UPDATE vibe_embedding SET status = 'PROCESSING', queued_at = ?1
                 WHERE track_id = ?2",
                rusqlite::params![now, id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn reset_stale_vibe(&self, cutoff: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE vibe_embedding SET status = 'PENDING', queued_at = NULL
             WHERE status = 'PROCESSING' AND queued_at < ?1",
            [cutoff],
        )?;
        Ok(changed)
    }

    fn mark_vibe_done(&self, track_id: &str, completed_at: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE vibe_embedding SET status = 'DONE', completed_at = ?1 WHERE track_id = ?2",
            rusqlite::params![completed_at, track_id],
        )?;
        Ok(())
    }

    fn vibe_counts(&self) -> Result<PhaseCounts> {
        self.phase_counts("vibe_embedding")
    }

    // === Failures ===

    fn append_failure(&self, failure: &EnrichmentFailure) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let metadata = failure
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        conn.execute(
            "INSERT INTO enrichment_failure (
                id, kind, entity_id, entity_name, error_code, message,
                metadata, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                failure.id,
                failure.kind.as_str(),
                failure.entity_id,
                failure.entity_name,
                failure.error_code,
                failure.message,
                metadata,
                failure.created_at,
            ],
        )?;
        Ok(())
    }

    fn list_failures(&self, limit: usize, offset: usize) -> Result<Vec<EnrichmentFailure>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, kind, entity_id, entity_name, error_code, message,
                    metadata, created_at
             FROM enrichment_failure
             ORDER BY created_at DESC, id DESC
             LIMIT ?1 OFFSET ?2",
        )?;
        let failures = stmt
            .query_map([limit, offset], |row| {
                let metadata: Option<String> = row.get(6)?;
                Ok(EnrichmentFailure {
                    id: row.get(0)?,
                    kind: FailureKind::from_str(&row.get::<_, String>(1)?)
                        .unwrap_or(FailureKind::System),
                    entity_id: row.get(2)?,
                    entity_name: row.get(3)?,
                    error_code: row.get(4)?,
                    message: row.get(5)?,
                    metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
                    created_at: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(failures)
    }

    fn count_failures(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM enrichment_failure", [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }

    // === Resets ===

    fn reset_all(&self) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("UPDATE artist_enrichment SET status = 'PENDING'", [])?;
        tx.execute("UPDATE track_mood SET moods = NULL", [])?;
        tx.execute(
            "UPDATE audio_analysis SET status = 'PENDING', queued_at = NULL, completed_at = NULL",
            [],
        )?;
        tx.execute(
            "UPDATE vibe_embedding SET status = 'PENDING', queued_at = NULL, completed_at = NULL",
            [],
        )?;
        // Rearm the one-shot flags so the next completion fires again.
        tx.execute(
            "UPDATE enrichment_state SET
                core_cache_cleared = 0,
                completion_notification_sent = 0,
                full_cache_cleared = 0
             WHERE id = 1",
            [],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn reset_artists_only(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("UPDATE artist_enrichment SET status = 'PENDING'", [])?;
        Ok(())
    }

    fn reset_moods_only(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("UPDATE track_mood SET moods = NULL", [])?;
        Ok(())
    }

    fn reset_audio_only(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE audio_analysis SET status = 'PENDING', queued_at = NULL, completed_at = NULL",
            [],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_entities() -> SqliteEnrichmentStore {
        let store = SqliteEnrichmentStore::in_memory().unwrap();
        store.register_artist("a1", "Artist One", Some("mb-a1")).unwrap();
        store.register_artist("a2", "Artist Two", None).unwrap();
        store.register_track("t1", "Song One", "Artist One").unwrap();
        store.register_track("t2", "Song Two", "Artist Two").unwrap();
        store
    }

    #[test]
    fn test_state_default_and_round_trip() {
        let store = SqliteEnrichmentStore::in_memory().unwrap();
        let state = store.get_state().unwrap();
        assert_eq!(state.status, EnrichmentStatus::Idle);

        let mut state = EnrichmentState::default();
        state.status = EnrichmentStatus::Running;
        state.current_phase = Some(EnrichmentPhase::Tracks);
        state.artists.counts.total = 2;
        state.core_cache_cleared = true;
        state.updated_at = 42;
        store.save_state(&state).unwrap();

        let loaded = store.get_state().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_register_is_idempotent() {
        let store = store_with_entities();
        store.register_artist("a1", "Artist One", None).unwrap();
        store.register_track("t1", "Song One", "Artist One").unwrap();

        assert_eq!(store.artist_counts().unwrap().total, 2);
        assert_eq!(store.track_counts().unwrap().total, 2);
        assert_eq!(store.audio_counts().unwrap().total, 2);
    }

    #[test]
    fn test_artist_selection_includes_failed() {
        let store = store_with_entities();
        store.set_artist_status("a1", ItemStatus::Failed).unwrap();
        store
            .set_artist_profile("a2", &serde_json::json!({"related": []}))
            .unwrap();

        let selected = store.select_artists_for_enrichment(10).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "a1");
    }

    #[test]
    fn test_artist_selection_pending_first() {
        let store = store_with_entities();
        store.register_artist("a3", "Artist Three", None).unwrap();
        store.set_artist_status("a1", ItemStatus::Failed).unwrap();

        let selected = store.select_artists_for_enrichment(10).unwrap();
        let ids: Vec<&str> = selected.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a2", "a3", "a1"]);
    }

    #[test]
    fn test_sentinel_excluded_from_selection() {
        let store = store_with_entities();
        store
            .set_track_moods("t1", &[NO_MOOD_TAGS.to_string()])
            .unwrap();

        let missing = store.select_tracks_missing_moods(10).unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id, "t2");

        // Empty array counts as unchecked and stays selectable.
        store.set_track_moods("t2", &[]).unwrap();
        let missing = store.select_tracks_missing_moods(10).unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id, "t2");
    }

    #[test]
    fn test_track_counts_treat_sentinel_as_tagged() {
        let store = store_with_entities();
        store
            .set_track_moods("t1", &["melancholic".to_string()])
            .unwrap();
        store
            .set_track_moods("t2", &[NOT_FOUND_TAGS.to_string()])
            .unwrap();

        let counts = store.track_counts().unwrap();
        assert_eq!(counts.total, 2);
        assert_eq!(counts.completed, 2);
        assert!(counts.is_settled());
    }

    #[test]
    fn test_audio_queue_and_stale_reset() {
        let store = store_with_entities();
        let pending = store.select_audio_pending(50).unwrap();
        assert_eq!(pending.len(), 2);

        store.mark_audio_queued(&pending, 1000).unwrap();
        assert!(store.select_audio_pending(50).unwrap().is_empty());
        assert_eq!(store.audio_counts().unwrap().processing, 2);

        // Nothing stale yet at cutoff 1000 (queued_at == 1000 not < 1000).
        assert_eq!(store.reset_stale_audio(1000).unwrap(), 0);
        assert_eq!(store.reset_stale_audio(1001).unwrap(), 2);
        assert_eq!(store.select_audio_pending(50).unwrap().len(), 2);
    }

    #[test]
    fn test_audio_completion_evidence() {
        let store = store_with_entities();
        store.mark_audio_queued(&["t1".to_string()], 100).unwrap();
        store.mark_audio_done("t1", 200).unwrap();

        assert_eq!(store.count_audio_completed_since(150).unwrap(), 1);
        assert_eq!(store.count_audio_completed_since(250).unwrap(), 0);
    }

    #[test]
    fn test_failures_append_and_list() {
        let store = store_with_entities();
        store
            .append_failure(&EnrichmentFailure::new(
                FailureKind::Artist,
                "a1",
                "Artist One",
                error_codes::TIMEOUT_ERROR,
                "enrichment timed out after 60s",
            ))
            .unwrap();
        store
            .append_failure(&EnrichmentFailure::new(
                FailureKind::Track,
                "t1",
                "Song One",
                error_codes::API_ERROR,
                "upstream 500",
            ))
            .unwrap();

        assert_eq!(store.count_failures().unwrap(), 2);
        let failures = store.list_failures(10, 0).unwrap();
        assert_eq!(failures.len(), 2);
    }

    #[test]
    fn test_reset_all_rearms_flags() {
        let store = store_with_entities();
        store
            .set_artist_profile("a1", &serde_json::json!({}))
            .unwrap();
        store
            .set_track_moods("t1", &["calm".to_string()])
            .unwrap();
        let mut state = EnrichmentState::default();
        state.completion_notification_sent = true;
        state.core_cache_cleared = true;
        store.save_state(&state).unwrap();

        store.reset_all().unwrap();

        assert_eq!(store.artist_counts().unwrap().completed, 0);
        assert_eq!(store.track_counts().unwrap().completed, 0);
        let state = store.get_state().unwrap();
        assert!(!state.completion_notification_sent);
        assert!(!state.core_cache_cleared);
    }

    #[test]
    fn test_partial_resets_are_independent() {
        let store = store_with_entities();
        store
            .set_artist_profile("a1", &serde_json::json!({}))
            .unwrap();
        store
            .set_track_moods("t1", &["calm".to_string()])
            .unwrap();
        store.mark_audio_queued(&["t1".to_string()], 100).unwrap();
        store.mark_audio_done("t1", 200).unwrap();

        store.reset_moods_only().unwrap();
        assert_eq!(store.artist_counts().unwrap().completed, 1);
        assert_eq!(store.track_counts().unwrap().completed, 0);
        assert_eq!(store.audio_counts().unwrap().completed, 1);

        store.reset_artists_only().unwrap();
        assert_eq!(store.artist_counts().unwrap().completed, 0);
        assert_eq!(store.audio_counts().unwrap().completed, 1);

        store.reset_audio_only().unwrap();
        assert_eq!(store.audio_counts().unwrap().completed, 0);
    }

    #[test]
    fn test_targeted_artist_retry() {
        let store = store_with_entities();
        store.set_artist_status("a1", ItemStatus::Failed).unwrap();
        store.set_artist_status("a2", ItemStatus::Failed).unwrap();

        let reset = store
            .reset_artists_to_pending(&["a1".to_string()])
            .unwrap();
        assert_eq!(reset, 1);

        let counts = store.artist_counts().unwrap();
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.pending(), 1);
    }
}
