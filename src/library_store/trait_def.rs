//! LibraryStore trait definition.
//!
//! The media library itself (scanning, files, playback) lives elsewhere;
//! this is the exact query surface the discovery core needs from it.

use super::models::{LibraryAlbum, LibraryTrack, SeedArtist};
use anyhow::Result;

pub trait LibraryStore: Send + Sync {
    // === Seeds and listening history ===

    /// Top artists from the user's listening history, by play count.
    fn get_seed_artists(&self, user_id: &str, limit: usize) -> Result<Vec<SeedArtist>>;

    /// The user's top listening-history genres, most played first.
    fn get_top_genres(&self, user_id: &str, limit: usize) -> Result<Vec<String>>;

    // === Ownership checks ===

    /// True if an owned album carries this canonical id.
    fn owns_album_mbid(&self, mbid: &str) -> Result<bool>;

    /// Lookup by pre-normalized (artist_key, title_key) ownership key.
    /// Keys are computed with [`crate::recommend::normalize::ownership_key`]
    /// both at insert and query time.
    fn owns_album_key(&self, artist_key: &str, title_key: &str) -> Result<bool>;

    fn is_artist_in_library(&self, artist_name: &str) -> Result<bool>;

    // === Track resolution (three tiers) ===

    /// Exact canonical-id match.
    fn tracks_for_album_mbid(&self, mbid: &str) -> Result<Vec<LibraryTrack>>;

    /// Case-insensitive artist+title match.
    fn tracks_for_album_named(&self, artist_name: &str, title: &str) -> Result<Vec<LibraryTrack>>;

    /// Normalized fuzzy key match (diacritics/punctuation stripped).
    fn tracks_for_album_key(&self, artist_key: &str, title_key: &str)
        -> Result<Vec<LibraryTrack>>;

    // === Albums ===

    fn albums_by_artist(&self, artist_name: &str) -> Result<Vec<LibraryAlbum>>;

    fn tracks_for_album_id(&self, album_id: &str) -> Result<Vec<LibraryTrack>>;

    /// Random album sample, excluding the given album ids.
    fn random_album_excluding(&self, exclude_ids: &[String]) -> Result<Option<LibraryAlbum>>;
}
