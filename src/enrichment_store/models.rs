//! Data models for the enrichment database.

use serde::{Deserialize, Serialize};

/// Sentinel mood recorded when a track was checked and no qualifying tags
/// were found. Distinguishes "checked, nothing there" from "never checked"
/// so a track is not re-processed forever.
pub const NO_MOOD_TAGS: &str = "_no_mood_tags";

/// Sentinel mood recorded when the similarity service had no entry for the
/// track at all.
pub const NOT_FOUND_TAGS: &str = "_not_found";

/// Error codes used in [`EnrichmentFailure`] records.
pub mod error_codes {
    pub const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";
    pub const API_ERROR: &str = "API_ERROR";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const SYSTEM_ERROR: &str = "SYSTEM_ERROR";
    pub const SKIPPED_PAUSED: &str = "SKIPPED_PAUSED";
}

/// Lifecycle status of the enrichment cycle controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Idle,
    Running,
    Paused,
    Stopping,
}

impl EnrichmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentStatus::Idle => "idle",
            EnrichmentStatus::Running => "running",
            EnrichmentStatus::Paused => "paused",
            EnrichmentStatus::Stopping => "stopping",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(EnrichmentStatus::Idle),
            "running" => Some(EnrichmentStatus::Running),
            "paused" => Some(EnrichmentStatus::Paused),
            "stopping" => Some(EnrichmentStatus::Stopping),
            _ => None,
        }
    }
}

/// The enrichment phases, in strict cycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentPhase {
    Artists,
    Tracks,
    Audio,
    Vibe,
}

impl EnrichmentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentPhase::Artists => "artists",
            EnrichmentPhase::Tracks => "tracks",
            EnrichmentPhase::Audio => "audio",
            EnrichmentPhase::Vibe => "vibe",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "artists" => Some(EnrichmentPhase::Artists),
            "tracks" => Some(EnrichmentPhase::Tracks),
            "audio" => Some(EnrichmentPhase::Audio),
            "vibe" => Some(EnrichmentPhase::Vibe),
            _ => None,
        }
    }
}

/// Status of a single enrichable item (artist, audio job, vibe job).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "PENDING",
            ItemStatus::Processing => "PROCESSING",
            ItemStatus::Done => "DONE",
            ItemStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ItemStatus::Pending),
            "PROCESSING" => Some(ItemStatus::Processing),
            "DONE" => Some(ItemStatus::Done),
            "FAILED" => Some(ItemStatus::Failed),
            _ => None,
        }
    }
}

/// Aggregate counters for one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCounts {
    pub total: u32,
    pub completed: u32,
    pub failed: u32,
    pub processing: u32,
}

impl PhaseCounts {
    pub fn pending(&self) -> u32 {
        self.total
            .saturating_sub(self.completed + self.failed + self.processing)
    }

    /// True once nothing is left pending or in flight.
    pub fn is_settled(&self) -> bool {
        self.pending() == 0 && self.processing == 0
    }
}

/// Per-phase progress snapshot stored in [`EnrichmentState`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseProgress {
    #[serde(flatten)]
    pub counts: PhaseCounts,
    /// Display label of the item currently being worked on.
    pub current_item: Option<String>,
}

/// The single process-wide enrichment state record.
///
/// Written only by the cycle controller; everything else reads.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentState {
    pub status: EnrichmentStatus,
    pub current_phase: Option<EnrichmentPhase>,
    pub artists: PhaseProgress,
    pub tracks: PhaseProgress,
    pub audio: PhaseProgress,
    pub vibe: PhaseProgress,
    /// One-shot: mix/recommendation caches invalidated on core completion.
    pub core_cache_cleared: bool,
    /// One-shot: completion notification sent on full completion.
    pub completion_notification_sent: bool,
    /// One-shot: second cache invalidation after audio finished.
    pub full_cache_cleared: bool,
    pub updated_at: i64,
}

impl Default for EnrichmentState {
    fn default() -> Self {
        Self {
            status: EnrichmentStatus::Idle,
            current_phase: None,
            artists: PhaseProgress::default(),
            tracks: PhaseProgress::default(),
            audio: PhaseProgress::default(),
            vibe: PhaseProgress::default(),
            core_cache_cleared: false,
            completion_notification_sent: false,
            full_cache_cleared: false,
            updated_at: 0,
        }
    }
}

impl EnrichmentState {
    /// Core enrichment (artist metadata + track moods) is done. Audio and
    /// vibe run in the background and never gate this.
    pub fn core_complete(&self) -> bool {
        self.artists.counts.total > 0
            && self.artists.counts.is_settled()
            && self.tracks.counts.is_settled()
    }

    /// Core complete and the audio backlog is empty.
    pub fn fully_complete(&self) -> bool {
        self.core_complete() && self.audio.counts.is_settled()
    }
}

/// Which kind of entity an enrichment failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Artist,
    Track,
    System,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Artist => "artist",
            FailureKind::Track => "track",
            FailureKind::System => "system",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "artist" => Some(FailureKind::Artist),
            "track" => Some(FailureKind::Track),
            "system" => Some(FailureKind::System),
            _ => None,
        }
    }
}

/// Append-only record of one failed enrichment attempt.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichmentFailure {
    pub id: String,
    pub kind: FailureKind,
    pub entity_id: String,
    pub entity_name: String,
    pub error_code: String,
    pub message: String,
    pub metadata: Option<serde_json::Value>,
    pub created_at: i64,
}

impl EnrichmentFailure {
    pub fn new(
        kind: FailureKind,
        entity_id: &str,
        entity_name: &str,
        error_code: &str,
        message: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            entity_id: entity_id.to_string(),
            entity_name: entity_name.to_string(),
            error_code: error_code.to_string(),
            message: message.to_string(),
            metadata: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// An artist awaiting enrichment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingArtist {
    pub id: String,
    pub name: String,
    pub mbid: Option<String>,
}

/// A track awaiting mood tagging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTrack {
    pub id: String,
    pub title: String,
    pub artist_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_counts_pending() {
        let counts = PhaseCounts {
            total: 10,
            completed: 4,
            failed: 1,
            processing: 2,
        };
        assert_eq!(counts.pending(), 3);
        assert!(!counts.is_settled());

        let settled = PhaseCounts {
            total: 5,
            completed: 4,
            failed: 1,
            processing: 0,
        };
        assert!(settled.is_settled());
    }

    #[test]
    fn test_core_complete_ignores_audio() {
        let mut state = EnrichmentState::default();
        state.artists.counts = PhaseCounts {
            total: 2,
            completed: 2,
            ..Default::default()
        };
        state.tracks.counts = PhaseCounts {
            total: 3,
            completed: 3,
            ..Default::default()
        };
        state.audio.counts = PhaseCounts {
            total: 3,
            completed: 0,
            ..Default::default()
        };
        assert!(state.core_complete());
        assert!(!state.fully_complete());

        state.audio.counts.completed = 3;
        assert!(state.fully_complete());
    }

    #[test]
    fn test_core_complete_requires_artists() {
        // An empty library is not "complete".
        let state = EnrichmentState::default();
        assert!(!state.core_complete());
    }

    #[test]
    fn test_enum_round_trips() {
        for status in [
            EnrichmentStatus::Idle,
            EnrichmentStatus::Running,
            EnrichmentStatus::Paused,
            EnrichmentStatus::Stopping,
        ] {
            assert_eq!(EnrichmentStatus::from_str(status.as_str()), Some(status));
        }
        for phase in [
            EnrichmentPhase::Artists,
            EnrichmentPhase::Tracks,
            EnrichmentPhase::Audio,
            EnrichmentPhase::Vibe,
        ] {
            assert_eq!(EnrichmentPhase::from_str(phase.as_str()), Some(phase));
        }
        for status in [
            ItemStatus::Pending,
            ItemStatus::Processing,
            ItemStatus::Done,
            ItemStatus::Failed,
        ] {
            assert_eq!(ItemStatus::from_str(status.as_str()), Some(status));
        }
        for kind in [FailureKind::Artist, FailureKind::Track, FailureKind::System] {
            assert_eq!(FailureKind::from_str(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_phase_progress_serialization_flattens_counts() {
        let progress = PhaseProgress {
            counts: PhaseCounts {
                total: 5,
                completed: 2,
                failed: 1,
                processing: 1,
            },
            current_item: Some("Aphex Twin".to_string()),
        };
        let json = serde_json::to_value(&progress).unwrap();
        assert_eq!(json["total"], 5);
        assert_eq!(json["current_item"], "Aphex Twin");

        let back: PhaseProgress = serde_json::from_value(json).unwrap();
        assert_eq!(back, progress);
    }
}
