//! Database schema for discovery.db.

use crate::sqlite_persistence::{Table, VersionedSchema};

const DISCOVERY_BATCH_TABLE_V0: Table = Table {
    name: "discovery_batch",
    schema: "CREATE TABLE discovery_batch (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        week_start TEXT NOT NULL,
        status TEXT NOT NULL,
        target_song_count INTEGER NOT NULL,
        total_albums INTEGER NOT NULL DEFAULT 0,
        completed_albums INTEGER NOT NULL DEFAULT 0,
        failed_albums INTEGER NOT NULL DEFAULT 0,
        error_message TEXT,
        final_song_count INTEGER,
        created_at INTEGER NOT NULL,
        completed_at INTEGER,
        version INTEGER NOT NULL DEFAULT 0
    )",
    indices: &[
        "CREATE INDEX idx_batch_user_week ON discovery_batch (user_id, week_start)",
        "CREATE INDEX idx_batch_status ON discovery_batch (status, created_at)",
    ],
};

const BATCH_LOG_TABLE_V0: Table = Table {
    name: "discovery_batch_log",
    schema: "CREATE TABLE discovery_batch_log (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        batch_id TEXT NOT NULL REFERENCES discovery_batch (id) ON DELETE CASCADE,
        timestamp INTEGER NOT NULL,
        message TEXT NOT NULL
    )",
    indices: &["CREATE INDEX idx_batch_log_batch ON discovery_batch_log (batch_id)"],
};

const DOWNLOAD_JOB_TABLE_V0: Table = Table {
    name: "download_job",
    schema: "CREATE TABLE download_job (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        subject TEXT NOT NULL,
        kind TEXT NOT NULL DEFAULT 'DISCOVERY',
        target_mbid TEXT NOT NULL,
        status TEXT NOT NULL,
        batch_id TEXT REFERENCES discovery_batch (id) ON DELETE SET NULL,
        metadata TEXT NOT NULL,
        external_ref TEXT,
        error TEXT,
        created_at INTEGER NOT NULL,
        completed_at INTEGER
    )",
    indices: &[
        "CREATE INDEX idx_job_batch ON download_job (batch_id)",
        "CREATE INDEX idx_job_target_status ON download_job (target_mbid, status)",
    ],
};

const DISCOVERY_ALBUM_TABLE_V0: Table = Table {
    name: "discovery_album",
    schema: "CREATE TABLE discovery_album (
        user_id TEXT NOT NULL,
        week_start TEXT NOT NULL,
        album_mbid TEXT NOT NULL,
        artist_name TEXT NOT NULL,
        album_name TEXT NOT NULL,
        similarity REAL NOT NULL,
        tier TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (user_id, week_start, album_mbid)
    )",
    indices: &[],
};

const DISCOVERY_TRACK_TABLE_V0: Table = Table {
    name: "discovery_track",
    schema: "CREATE TABLE discovery_track (
        user_id TEXT NOT NULL,
        week_start TEXT NOT NULL,
        album_mbid TEXT NOT NULL,
        track_id TEXT NOT NULL,
        title TEXT NOT NULL,
        artist_name TEXT NOT NULL,
        is_anchor INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (user_id, week_start, album_mbid, track_id),
        FOREIGN KEY (user_id, week_start, album_mbid)
            REFERENCES discovery_album (user_id, week_start, album_mbid)
            ON DELETE CASCADE
    )",
    indices: &[],
};

const UNAVAILABLE_ALBUM_TABLE_V0: Table = Table {
    name: "unavailable_album",
    schema: "CREATE TABLE unavailable_album (
        user_id TEXT NOT NULL,
        week_start TEXT NOT NULL,
        album_mbid TEXT NOT NULL,
        artist_name TEXT NOT NULL,
        album_name TEXT NOT NULL,
        attempts INTEGER NOT NULL DEFAULT 1,
        last_failed_at INTEGER NOT NULL,
        PRIMARY KEY (user_id, week_start, album_mbid)
    )",
    indices: &[],
};

const DISCOVER_EXCLUSION_TABLE_V0: Table = Table {
    name: "discover_exclusion",
    schema: "CREATE TABLE discover_exclusion (
        user_id TEXT NOT NULL,
        album_mbid TEXT NOT NULL,
        expires_at INTEGER NOT NULL,
        PRIMARY KEY (user_id, album_mbid)
    )",
    indices: &["CREATE INDEX idx_exclusion_expiry ON discover_exclusion (expires_at)"],
};

const USER_DISCOVERY_SETTINGS_TABLE_V0: Table = Table {
    name: "user_discovery_settings",
    schema: "CREATE TABLE user_discovery_settings (
        user_id TEXT PRIMARY KEY,
        enabled INTEGER NOT NULL DEFAULT 0,
        target_song_count INTEGER NOT NULL DEFAULT 0
    )",
    indices: &[],
};

pub const DISCOVERY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        DISCOVERY_BATCH_TABLE_V0,
        BATCH_LOG_TABLE_V0,
        DOWNLOAD_JOB_TABLE_V0,
        DISCOVERY_ALBUM_TABLE_V0,
        DISCOVERY_TRACK_TABLE_V0,
        UNAVAILABLE_ALBUM_TABLE_V0,
        DISCOVER_EXCLUSION_TABLE_V0,
        USER_DISCOVERY_SETTINGS_TABLE_V0,
    ],
    migration: None,
}];
