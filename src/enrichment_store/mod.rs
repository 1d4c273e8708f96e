//! Persistent store for enrichment state, per-entity statuses and failures.

mod models;
mod schema;
mod store;
mod trait_def;

pub use models::{
    error_codes, EnrichmentFailure, EnrichmentPhase, EnrichmentState, EnrichmentStatus,
    FailureKind, ItemStatus, PendingArtist, PendingTrack, PhaseCounts, PhaseProgress,
    NOT_FOUND_TAGS, NO_MOOD_TAGS,
};
pub use store::SqliteEnrichmentStore;
pub use trait_def::EnrichmentStore;
