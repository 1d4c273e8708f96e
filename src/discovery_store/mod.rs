//! Persistent store for discovery batches, download jobs and results.

mod models;
mod schema;
mod store;
mod trait_def;

pub use models::{
    AcquisitionMetadata, BatchJobCounts, BatchLogEntry, BatchStatus, BatchTransition,
    DiscoverExclusion, DiscoveryAlbumRecord, DiscoveryBatch, DiscoveryTrackRecord, DownloadJob,
    JobKind, JobStatus, Tier, UnavailableAlbum, UserDiscoverySettings,
};
pub use store::SqliteDiscoveryStore;
pub use trait_def::DiscoveryStore;
