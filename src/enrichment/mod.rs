//! Metadata enrichment cycle.

mod breaker;
mod controller;
pub mod moods;
mod phases;

pub use breaker::{AudioAnalyzerBreaker, SystemFailureBreaker};
pub use controller::EnrichmentController;
