//! SQLite-backed library store.

use super::models::{LibraryAlbum, LibraryTrack, SeedArtist};
use super::schema::LIBRARY_VERSIONED_SCHEMAS;
use super::trait_def::LibraryStore;
use crate::recommend::normalize;
use crate::sqlite_persistence;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite-backed implementation of [`LibraryStore`].
///
/// Ownership keys are normalized once at insert time so lookups stay a
/// plain index hit.
pub struct SqliteLibraryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLibraryStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn =
            sqlite_persistence::open_versioned(db_path, LIBRARY_VERSIONED_SCHEMAS, "library")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    pub fn in_memory() -> Result<Self> {
        let conn = sqlite_persistence::open_in_memory(LIBRARY_VERSIONED_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Mirror an album (and its tracks) into the library surface.
    pub fn add_album(&self, album: &LibraryAlbum, tracks: &[LibraryTrack]) -> Result<()> {
        let (artist_key, title_key) = normalize::ownership_key(&album.artist_name, &album.title);
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO library_album (
                id, artist_name, title, mbid, artist_key, title_key
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                album.id,
                album.artist_name,
                album.title,
                album.mbid,
                artist_key,
                title_key
            ],
        )?;
        for track in tracks {
            tx.execute(
                "INSERT OR REPLACE INTO library_track (id, album_id, artist_name, title)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![track.id, album.id, track.artist_name, track.title],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Record listening history for a user's artist.
    pub fn record_listen(
        &self,
        user_id: &str,
        artist_name: &str,
        mbid: Option<&str>,
        play_count: u32,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO listen_stat (user_id, artist_name, mbid, play_count)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (user_id, artist_name) DO UPDATE SET
                play_count = play_count + excluded.play_count,
                mbid = COALESCE(excluded.mbid, mbid)",
            rusqlite::params![user_id, artist_name, mbid, play_count],
        )?;
        Ok(())
    }

    /// Record genre affinity for a user.
    pub fn record_genre(&self, user_id: &str, genre: &str, weight: u32) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO user_genre (user_id, genre, weight)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id, genre) DO UPDATE SET
                weight = weight + excluded.weight",
            rusqlite::params![user_id, genre, weight],
        )?;
        Ok(())
    }

    fn row_to_track(row: &rusqlite::Row) -> rusqlite::Result<LibraryTrack> {
        Ok(LibraryTrack {
            id: row.get(0)?,
            album_id: row.get(1)?,
            artist_name: row.get(2)?,
            title: row.get(3)?,
        })
    }

    fn row_to_album(row: &rusqlite::Row) -> rusqlite::Result<LibraryAlbum> {
        Ok(LibraryAlbum {
            id: row.get(0)?,
            artist_name: row.get(1)?,
            title: row.get(2)?,
            mbid: row.get(3)?,
        })
    }
}

impl LibraryStore for SqliteLibraryStore {
    fn get_seed_artists(&self, user_id: &str, limit: usize) -> Result<Vec<SeedArtist>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT artist_name, mbid, play_count FROM listen_stat
             WHERE user_id = ?1
             ORDER BY play_count DESC, artist_name ASC
             LIMIT ?2",
        )?;
        let seeds = stmt
            .query_map(rusqlite::params![user_id, limit], |row| {
                Ok(SeedArtist {
                    name: row.get(0)?,
                    mbid: row.get(1)?,
                    play_count: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(seeds)
    }

    fn get_top_genres(&self, user_id: &str, limit: usize) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT genre FROM user_genre
             WHERE user_id = ?1
             ORDER BY weight DESC, genre ASC
             LIMIT ?2",
        )?;
        let genres = stmt
            .query_map(rusqlite::params![user_id, limit], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(genres)
    }

    fn owns_album_mbid(&self, mbid: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM library_album WHERE mbid = ?1",
            [mbid],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn owns_album_key(&self, artist_key: &str, title_key: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM library_album WHERE artist_key = ?1 AND title_key = ?2",
            [artist_key, title_key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn is_artist_in_library(&self, artist_name: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM library_album WHERE artist_name = ?1 COLLATE NOCASE",
            [artist_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn tracks_for_album_mbid(&self, mbid: &str) -> Result<Vec<LibraryTrack>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT t.id, t.album_id, t.artist_name, t.title
             FROM library_track t
             JOIN library_album a ON a.id = t.album_id
             WHERE a.mbid = ?1
             ORDER BY t.id",
        )?;
        let tracks = stmt
            .query_map([mbid], Self::row_to_track)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    fn tracks_for_album_named(&self, artist_name: &str, title: &str) -> Result<Vec<LibraryTrack>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT t.id, t.album_id, t.artist_name, t.title
             FROM library_track t
             JOIN library_album a ON a.id = t.album_id
             WHERE TRIM(a.artist_name) = TRIM(?1) COLLATE NOCASE
               AND TRIM(a.title) = TRIM(?2) COLLATE NOCASE
             ORDER BY t.id",
        )?;
        let tracks = stmt
            .query_map([artist_name, title], Self::row_to_track)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    fn tracks_for_album_key(
        &self,
        artist_key: &str,
        title_key: &str,
    ) -> Result<Vec<LibraryTrack>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT t.id, t.album_id, t.artist_name, t.title
             FROM library_track t
             JOIN library_album a ON a.id = t.album_id
             WHERE a.artist_key = ?1 AND a.title_key = ?2
             ORDER BY t.id",
        )?;
        let tracks = stmt
            .query_map([artist_key, title_key], Self::row_to_track)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    fn albums_by_artist(&self, artist_name: &str) -> Result<Vec<LibraryAlbum>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, artist_name, title, mbid FROM library_album
             WHERE artist_name = ?1 COLLATE NOCASE
             ORDER BY title",
        )?;
        let albums = stmt
            .query_map([artist_name], Self::row_to_album)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(albums)
    }

    fn tracks_for_album_id(&self, album_id: &str) -> Result<Vec<LibraryTrack>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, album_id, artist_name, title FROM library_track
             WHERE album_id = ?1 ORDER BY id",
        )?;
        let tracks = stmt
            .query_map([album_id], Self::row_to_track)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }

    fn random_album_excluding(&self, exclude_ids: &[String]) -> Result<Option<LibraryAlbum>> {
        let conn = self.conn.lock().unwrap();
        let placeholders = std::iter::repeat("?")
            .take(exclude_ids.len())
            .collect::<Vec<_>>()
            .join(", ");
        let sql = if exclude_ids.is_empty() {
            "SELECT id, artist_name, title, mbid FROM library_album
             ORDER BY RANDOM() LIMIT 1"
                .to_string()
        } else {
            format!(
                "SELECT id, artist_name, title, mbid FROM library_album
                 WHERE id NOT IN ({})
                 ORDER BY RANDOM() LIMIT 1",
                placeholders
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let album = stmt
            .query_row(
                rusqlite::params_from_iter(exclude_ids.iter()),
                Self::row_to_album,
            )
            .optional()?;
        Ok(album)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn album(id: &str, artist: &str, title: &str, mbid: Option<&str>) -> LibraryAlbum {
        LibraryAlbum {
            id: id.to_string(),
            artist_name: artist.to_string(),
            title: title.to_string(),
            mbid: mbid.map(String::from),
        }
    }

    fn track(id: &str, album_id: &str, artist: &str, title: &str) -> LibraryTrack {
        LibraryTrack {
            id: id.to_string(),
            album_id: album_id.to_string(),
            artist_name: artist.to_string(),
            title: title.to_string(),
        }
    }

    fn seeded_store() -> SqliteLibraryStore {
        let store = SqliteLibraryStore::in_memory().unwrap();
        store
            .add_album(
                &album("al1", "Sigur Rós", "Ágætis byrjun", Some("mb-al1")),
                &[
                    track("tr1", "al1", "Sigur Rós", "Svefn-g-englar"),
                    track("tr2", "al1", "Sigur Rós", "Starálfur"),
                ],
            )
            .unwrap();
        store
            .add_album(
                &album("al2", "Boards of Canada", "Geogaddi", None),
                &[track("tr3", "al2", "Boards of Canada", "1969")],
            )
            .unwrap();
        store
    }

    #[test]
    fn test_ownership_by_mbid() {
        let store = seeded_store();
        assert!(store.owns_album_mbid("mb-al1").unwrap());
        assert!(!store.owns_album_mbid("mb-other").unwrap());
    }

    #[test]
    fn test_ownership_by_normalized_key() {
        let store = seeded_store();
        // Diacritics and case fold into the same key.
        let (artist_key, title_key) = normalize::ownership_key("sigur ros", "agaetis byrjun");
        assert!(store.owns_album_key(&artist_key, &title_key).unwrap());
    }

    #[test]
    fn test_three_tier_track_resolution() {
        let store = seeded_store();

        let by_mbid = store.tracks_for_album_mbid("mb-al1").unwrap();
        assert_eq!(by_mbid.len(), 2);

        let by_name = store
            .tracks_for_album_named("boards of canada", "GEOGADDI")
            .unwrap();
        assert_eq!(by_name.len(), 1);

        let (artist_key, title_key) = normalize::ownership_key("Sigur Ros", "Agaetis Byrjun!");
        let by_key = store.tracks_for_album_key(&artist_key, &title_key).unwrap();
        assert_eq!(by_key.len(), 2);
    }

    #[test]
    fn test_seed_artists_ordered_by_play_count() {
        let store = seeded_store();
        store
            .record_listen("u1", "Sigur Rós", Some("mb-sr"), 10)
            .unwrap();
        store
            .record_listen("u1", "Boards of Canada", None, 25)
            .unwrap();

        let seeds = store.get_seed_artists("u1", 5).unwrap();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].name, "Boards of Canada");
        assert_eq!(seeds[1].mbid.as_deref(), Some("mb-sr"));
    }

    #[test]
    fn test_top_genres() {
        let store = seeded_store();
        store.record_genre("u1", "ambient", 5).unwrap();
        store.record_genre("u1", "idm", 9).unwrap();

        let genres = store.get_top_genres("u1", 10).unwrap();
        assert_eq!(genres, vec!["idm", "ambient"]);
    }

    #[test]
    fn test_random_album_respects_exclusions() {
        let store = seeded_store();
        let picked = store
            .random_album_excluding(&["al1".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(picked.id, "al2");

        let none = store
            .random_album_excluding(&["al1".to_string(), "al2".to_string()])
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_artist_lookup_case_insensitive() {
        let store = seeded_store();
        assert!(store.is_artist_in_library("boards of canada").unwrap());
        assert!(!store.is_artist_in_library("Autechre").unwrap());
    }
}
