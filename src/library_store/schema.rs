//! Database schema for library.db.
//!
//! A reduced mirror of the media library: just enough for ownership
//! checks, track resolution and listening-history seeds.

use crate::sqlite_persistence::{Table, VersionedSchema};

const LIBRARY_ALBUM_TABLE_V0: Table = Table {
    name: "library_album",
    schema: "CREATE TABLE library_album (
        id TEXT PRIMARY KEY,
        artist_name TEXT NOT NULL,
        title TEXT NOT NULL,
        mbid TEXT,
        artist_key TEXT NOT NULL,
        title_key TEXT NOT NULL
    )",
    indices: &[
        "CREATE INDEX idx_library_album_mbid ON library_album (mbid)",
        "CREATE INDEX idx_library_album_key ON library_album (artist_key, title_key)",
        "CREATE INDEX idx_library_album_artist ON library_album (artist_name COLLATE NOCASE)",
    ],
};

const LIBRARY_TRACK_TABLE_V0: Table = Table {
    name: "library_track",
    schema: "CREATE TABLE library_track (
        id TEXT PRIMARY KEY,
        album_id TEXT NOT NULL REFERENCES library_album (id) ON DELETE CASCADE,
        artist_name TEXT NOT NULL,
        title TEXT NOT NULL
    )",
    indices: &["CREATE INDEX idx_library_track_album ON library_track (album_id)"],
};

const LISTEN_STAT_TABLE_V0: Table = Table {
    name: "listen_stat",
    schema: "CREATE TABLE listen_stat (
        user_id TEXT NOT NULL,
        artist_name TEXT NOT NULL,
        mbid TEXT,
        play_count INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (user_id, artist_name)
    )",
    indices: &[],
};

const USER_GENRE_TABLE_V0: Table = Table {
    name: "user_genre",
    schema: "CREATE TABLE user_genre (
        user_id TEXT NOT NULL,
        genre TEXT NOT NULL,
        weight INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (user_id, genre)
    )",
    indices: &[],
};

pub const LIBRARY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        LIBRARY_ALBUM_TABLE_V0,
        LIBRARY_TRACK_TABLE_V0,
        LISTEN_STAT_TABLE_V0,
        USER_GENRE_TABLE_V0,
    ],
    migration: None,
}];
