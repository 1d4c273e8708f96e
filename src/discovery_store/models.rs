//! Data models for the discovery job store.
//!
//! Defines batches, download jobs, materialized discovery results,
//! negative-result records and suppression windows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Status of a discovery batch.
///
/// Transitions are monotonic forward: `Downloading → Scanning → Completed`,
/// or into `Failed` from either non-terminal state. Terminal states are
/// absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Downloading,
    Scanning,
    Completed, // terminal
    Failed,    // terminal
}

impl BatchStatus {
    /// Returns true if this is a terminal state (Completed or Failed).
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Downloading => "DOWNLOADING",
            BatchStatus::Scanning => "SCANNING",
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "DOWNLOADING" => Some(BatchStatus::Downloading),
            "SCANNING" => Some(BatchStatus::Scanning),
            "COMPLETED" => Some(BatchStatus::Completed),
            "FAILED" => Some(BatchStatus::Failed),
            _ => None,
        }
    }
}

/// Status of a single album acquisition job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed, // terminal
    Failed,    // terminal
    Exhausted, // terminal - no source found anywhere
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Exhausted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Exhausted => "EXHAUSTED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobStatus::Pending),
            "PROCESSING" => Some(JobStatus::Processing),
            "COMPLETED" => Some(JobStatus::Completed),
            "FAILED" => Some(JobStatus::Failed),
            "EXHAUSTED" => Some(JobStatus::Exhausted),
            _ => None,
        }
    }
}

/// What kind of acquisition a job represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    /// Part of the original batch generation.
    Discovery,
    /// Created by the replacement-search flow for a failed job. Terminal
    /// jobs are never reopened; a substitute gets a fresh job instead.
    Replacement,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Discovery => "DISCOVERY",
            JobKind::Replacement => "REPLACEMENT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "DISCOVERY" => Some(JobKind::Discovery),
            "REPLACEMENT" => Some(JobKind::Replacement),
            _ => None,
        }
    }
}

/// Similarity bucket a recommendation was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    High,
    Medium,
    Explore,
    Wildcard,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::High => "high",
            Tier::Medium => "medium",
            Tier::Explore => "explore",
            Tier::Wildcard => "wildcard",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Tier::High),
            "medium" => Some(Tier::Medium),
            "explore" => Some(Tier::Explore),
            "wildcard" => Some(Tier::Wildcard),
            _ => None,
        }
    }
}

/// Typed acquisition metadata attached to a download job.
///
/// Stored as a JSON column and validated on read; similarity and tier are
/// copied verbatim into discovery results at playlist-build time, never
/// recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionMetadata {
    pub artist_name: String,
    pub album_name: String,
    pub album_mbid: String,
    pub similarity: f64,
    pub tier: Tier,
    /// Set by the tier-3 replacement path: the "album" is an already-owned
    /// library anchor, not something to download.
    #[serde(default)]
    pub library_anchor: bool,
}

impl AcquisitionMetadata {
    /// Parse from the stored JSON column.
    ///
    /// Similarity is clamped into [0, 1] with missing/NaN defaulting to 0.5.
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let mut meta: AcquisitionMetadata = serde_json::from_str(raw)?;
        if !meta.similarity.is_finite() {
            meta.similarity = 0.5;
        }
        meta.similarity = meta.similarity.clamp(0.0, 1.0);
        Ok(meta)
    }
}

/// One discovery generation run for one user.
#[derive(Debug, Clone)]
pub struct DiscoveryBatch {
    /// Unique identifier (UUID).
    pub id: String,
    pub user_id: String,
    /// Identifies the recommendation week (Monday).
    pub week_start: NaiveDate,
    pub status: BatchStatus,
    /// Number of songs the final playlist aims for.
    pub target_song_count: u32,
    pub total_albums: u32,
    pub completed_albums: u32,
    pub failed_albums: u32,
    pub error_message: Option<String>,
    pub final_song_count: Option<u32>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
    /// Optimistic-concurrency version, bumped on every transition.
    pub version: i64,
}

impl DiscoveryBatch {
    pub fn new(user_id: &str, week_start: NaiveDate, target_song_count: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            week_start,
            status: BatchStatus::Downloading,
            target_song_count,
            total_albums: 0,
            completed_albums: 0,
            failed_albums: 0,
            error_message: None,
            final_song_count: None,
            created_at: chrono::Utc::now().timestamp(),
            completed_at: None,
            version: 0,
        }
    }

    /// Age of the batch in minutes as of `now`.
    pub fn age_minutes(&self, now: i64) -> i64 {
        (now - self.created_at) / 60
    }
}

/// A version-guarded batch state transition.
#[derive(Debug, Clone)]
pub struct BatchTransition {
    pub status: BatchStatus,
    pub completed_albums: u32,
    pub failed_albums: u32,
    pub error_message: Option<String>,
    pub final_song_count: Option<u32>,
}

/// An append-only structured log line attached to a batch.
#[derive(Debug, Clone)]
pub struct BatchLogEntry {
    pub seq: i64,
    pub batch_id: String,
    pub timestamp: i64,
    pub message: String,
}

/// One album acquisition attempt.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    /// Unique identifier (UUID).
    pub id: String,
    pub user_id: String,
    /// Display string, e.g. "Artist - Album".
    pub subject: String,
    pub kind: JobKind,
    /// Canonical album identifier being acquired.
    pub target_mbid: String,
    pub status: JobStatus,
    pub batch_id: Option<String>,
    pub metadata: AcquisitionMetadata,
    /// Correlation id assigned by the external acquisition manager.
    pub external_ref: Option<String>,
    pub error: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl DownloadJob {
    pub fn new(user_id: &str, batch_id: &str, metadata: AcquisitionMetadata) -> Self {
        Self::with_kind(user_id, batch_id, metadata, JobKind::Discovery)
    }

    /// A fresh job created by the replacement-search flow.
    pub fn replacement(user_id: &str, batch_id: &str, metadata: AcquisitionMetadata) -> Self {
        Self::with_kind(user_id, batch_id, metadata, JobKind::Replacement)
    }

    fn with_kind(
        user_id: &str,
        batch_id: &str,
        metadata: AcquisitionMetadata,
        kind: JobKind,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            subject: format!("{} - {}", metadata.artist_name, metadata.album_name),
            kind,
            target_mbid: metadata.album_mbid.clone(),
            status: JobStatus::Pending,
            batch_id: Some(batch_id.to_string()),
            metadata,
            external_ref: None,
            error: None,
            created_at: chrono::Utc::now().timestamp(),
            completed_at: None,
        }
    }
}

/// Per-status job counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchJobCounts {
    pub total: u32,
    pub pending: u32,
    pub processing: u32,
    pub completed: u32,
    pub failed: u32,
    pub exhausted: u32,
}

impl BatchJobCounts {
    /// True once every job has reached a terminal state.
    pub fn all_terminal(&self) -> bool {
        self.total > 0 && self.pending == 0 && self.processing == 0
    }

    /// Failed + exhausted.
    pub fn unsuccessful(&self) -> u32 {
        self.failed + self.exhausted
    }

    /// Terminal fraction in [0, 100].
    pub fn progress_percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let terminal = self.completed + self.failed + self.exhausted;
        ((terminal * 100) / self.total) as u8
    }
}

/// Materialized album of a successful batch, keyed for idempotent upsert.
#[derive(Debug, Clone)]
pub struct DiscoveryAlbumRecord {
    pub user_id: String,
    pub week_start: NaiveDate,
    pub album_mbid: String,
    pub artist_name: String,
    pub album_name: String,
    /// Copied verbatim from the originating job, never recomputed.
    pub similarity: f64,
    pub tier: Tier,
    pub created_at: i64,
}

/// Child track of a [`DiscoveryAlbumRecord`].
#[derive(Debug, Clone)]
pub struct DiscoveryTrackRecord {
    pub track_id: String,
    pub title: String,
    pub artist_name: String,
    /// True for anchor tracks blended in from the user's own library.
    pub is_anchor: bool,
}

/// Negative-result record for an album whose download failed.
///
/// Informational only; does not block future recommendation.
#[derive(Debug, Clone)]
pub struct UnavailableAlbum {
    pub user_id: String,
    pub week_start: NaiveDate,
    pub album_mbid: String,
    pub artist_name: String,
    pub album_name: String,
    pub attempts: u32,
    pub last_failed_at: i64,
}

/// Time-bounded suppression of an album from re-recommendation.
#[derive(Debug, Clone)]
pub struct DiscoverExclusion {
    pub user_id: String,
    pub album_mbid: String,
    pub expires_at: i64,
}

/// Per-user discovery preferences.
#[derive(Debug, Clone)]
pub struct UserDiscoverySettings {
    pub user_id: String,
    pub enabled: bool,
    pub target_song_count: u32,
}
