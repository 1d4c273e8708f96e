//! Discofy Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod config;
pub mod discovery;
pub mod discovery_store;
pub mod enrichment;
pub mod enrichment_store;
pub mod library_store;
pub mod recommend;
pub mod services;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use discovery::DiscoveryOrchestrator;
pub use discovery_store::{DiscoveryStore, SqliteDiscoveryStore};
pub use enrichment::EnrichmentController;
pub use enrichment_store::{EnrichmentStore, SqliteEnrichmentStore};
pub use library_store::{LibraryStore, SqliteLibraryStore};
pub use recommend::RecommendationEngine;
