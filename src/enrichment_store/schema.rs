//! Database schema for enrichment.db.

use crate::sqlite_persistence::{Table, VersionedSchema};

/// Single-row controller state (id is always 1).
const ENRICHMENT_STATE_TABLE_V0: Table = Table {
    name: "enrichment_state",
    schema: "CREATE TABLE enrichment_state (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        status TEXT NOT NULL,
        current_phase TEXT,
        artists TEXT NOT NULL,
        tracks TEXT NOT NULL,
        audio TEXT NOT NULL,
        vibe TEXT NOT NULL,
        core_cache_cleared INTEGER NOT NULL DEFAULT 0,
        completion_notification_sent INTEGER NOT NULL DEFAULT 0,
        full_cache_cleared INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL
    )",
    indices: &[],
};

const ARTIST_ENRICHMENT_TABLE_V0: Table = Table {
    name: "artist_enrichment",
    schema: "CREATE TABLE artist_enrichment (
        artist_id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        mbid TEXT,
        status TEXT NOT NULL DEFAULT 'PENDING',
        profile TEXT,
        updated_at INTEGER
    )",
    indices: &["CREATE INDEX idx_artist_enrichment_status ON artist_enrichment (status)"],
};

/// Mood tags per track. `moods` is NULL until the track has been checked;
/// an empty result is recorded as a sentinel array, never left NULL.
const TRACK_MOOD_TABLE_V0: Table = Table {
    name: "track_mood",
    schema: "CREATE TABLE track_mood (
        track_id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        artist_name TEXT NOT NULL,
        moods TEXT,
        updated_at INTEGER
    )",
    indices: &[],
};

const AUDIO_ANALYSIS_TABLE_V0: Table = Table {
    name: "audio_analysis",
    schema: "CREATE TABLE audio_analysis (
        track_id TEXT PRIMARY KEY,
        status TEXT NOT NULL DEFAULT 'PENDING',
        queued_at INTEGER,
        completed_at INTEGER
    )",
    indices: &["CREATE INDEX idx_audio_analysis_status ON audio_analysis (status)"],
};

const VIBE_EMBEDDING_TABLE_V0: Table = Table {
    name: "vibe_embedding",
    schema: "CREATE TABLE vibe_embedding (
        track_id TEXT PRIMARY KEY,
        status TEXT NOT NULL DEFAULT 'PENDING',
        queued_at INTEGER,
        completed_at INTEGER
    )",
    indices: &["CREATE INDEX idx_vibe_embedding_status ON vibe_embedding (status)"],
};

const ENRICHMENT_FAILURE_TABLE_V0: Table = Table {
    name: "enrichment_failure",
    schema: "CREATE TABLE enrichment_failure (
        id TEXT PRIMARY KEY,
        kind TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        entity_name TEXT NOT NULL,
        error_code TEXT NOT NULL,
        message TEXT NOT NULL,
        metadata TEXT,
        created_at INTEGER NOT NULL
    )",
    indices: &[
        "CREATE INDEX idx_failure_entity ON enrichment_failure (entity_id)",
        "CREATE INDEX idx_failure_created ON enrichment_failure (created_at)",
    ],
};

pub const ENRICHMENT_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        ENRICHMENT_STATE_TABLE_V0,
        ARTIST_ENRICHMENT_TABLE_V0,
        TRACK_MOOD_TABLE_V0,
        AUDIO_ANALYSIS_TABLE_V0,
        VIBE_EMBEDDING_TABLE_V0,
        ENRICHMENT_FAILURE_TABLE_V0,
    ],
    migration: None,
}];
