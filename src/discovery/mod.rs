//! Discovery batch orchestration.

mod cleanup;
mod orchestrator;
mod playlist;
mod replacement;
mod sweeps;

pub use orchestrator::{week_start_for, DiscoveryOrchestrator};
pub use playlist::PlaylistTrack;
pub use replacement::ReplacementAlbum;
