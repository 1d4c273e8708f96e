//! Data models for the library persistence surface.

/// An album the user already owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryAlbum {
    pub id: String,
    pub artist_name: String,
    pub title: String,
    pub mbid: Option<String>,
}

/// A track in the user's library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryTrack {
    pub id: String,
    pub album_id: String,
    pub artist_name: String,
    pub title: String,
}

/// An artist derived from listening history, used as a recommendation seed.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedArtist {
    pub name: String,
    pub mbid: Option<String>,
    pub play_count: u32,
}
