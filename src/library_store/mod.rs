//! Abstract persistence surface for the media library.

mod models;
mod schema;
mod store;
mod trait_def;

pub use models::{LibraryAlbum, LibraryTrack, SeedArtist};
pub use store::SqliteLibraryStore;
pub use trait_def::LibraryStore;
