//! External service adapters and cross-cutting service plumbing.
//!
//! The core treats every third-party system as a capability trait with
//! response shapes validated at the boundary. HTTP implementations live
//! next to their traits.

mod acquisition;
mod error;
mod events;
mod metadata;
mod notify;
mod retry;
mod similarity;
mod work_queue;

pub use acquisition::{
    AcquisitionOutcome, AcquisitionQueueEntry, AcquisitionRequest, AcquisitionService,
    HttpAcquisitionClient, ManagedArtist,
};
pub use error::{ServiceError, ServiceResult};
pub use events::{BatchProgress, BroadcastEventSink, DiscoveryEvent, EventSink, NullEventSink};
pub use metadata::{AlbumDetails, AlbumRef, MetadataResolver, MusicBrainzResolver};
pub use notify::{CacheInvalidator, LogNotifier, Notifier};
pub use retry::{retry_with_backoff, BackoffPolicy};
pub use similarity::{
    AudioScrobblerClient, SimilarArtist, SimilarityService, TaggedAlbum, TopAlbum,
};
pub use work_queue::{InProcessWorkQueue, QueueName, WorkQueue};
