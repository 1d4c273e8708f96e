//! Shared test fixtures: scripted service fakes and store builders.

#![allow(dead_code)]

use async_trait::async_trait;
use discofy_server::services::{
    AcquisitionOutcome, AcquisitionQueueEntry, AcquisitionRequest, AcquisitionService,
    AlbumDetails, AlbumRef, BackoffPolicy, DiscoveryEvent, EventSink, ManagedArtist,
    MetadataResolver, Notifier, CacheInvalidator, ServiceError, ServiceResult, SimilarArtist,
    SimilarityService, TaggedAlbum, TopAlbum,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn fast_backoff() -> BackoffPolicy {
    BackoffPolicy {
        base_delay: Duration::from_millis(1),
        multiplier: 1.0,
        max_attempts: 2,
    }
}

// =============================================================================
// Similarity
// =============================================================================

/// Behavior of the fake similarity service for one artist or track.
#[derive(Clone)]
pub enum SimilarityScript {
    Ok(Vec<SimilarArtist>),
    /// Sleeps this long before answering (drives timeout paths).
    Slow(Duration),
    Fail(ServiceError),
}

#[derive(Default)]
pub struct FakeSimilarity {
    pub similar: Mutex<HashMap<String, SimilarityScript>>,
    pub top_albums: Mutex<HashMap<String, Vec<TopAlbum>>>,
    pub tag_albums: Mutex<HashMap<String, Vec<TaggedAlbum>>>,
    /// Track title → tags (or scripted error).
    pub track_tags: Mutex<HashMap<String, Result<Vec<String>, ServiceError>>>,
}

impl FakeSimilarity {
    pub fn set_similar(&self, artist: &str, similar: Vec<SimilarArtist>) {
        self.similar
            .lock()
            .unwrap()
            .insert(artist.to_string(), SimilarityScript::Ok(similar));
    }

    pub fn set_slow(&self, artist: &str, delay: Duration) {
        self.similar
            .lock()
            .unwrap()
            .insert(artist.to_string(), SimilarityScript::Slow(delay));
    }

    pub fn set_track_tags(&self, title: &str, tags: Result<Vec<String>, ServiceError>) {
        self.track_tags
            .lock()
            .unwrap()
            .insert(title.to_string(), tags);
    }
}

#[async_trait]
impl SimilarityService for FakeSimilarity {
    async fn get_similar_artists(
        &self,
        _mbid: Option<&str>,
        name: &str,
        _limit: usize,
    ) -> ServiceResult<Vec<SimilarArtist>> {
        let script = self.similar.lock().unwrap().get(name).cloned();
        match script {
            Some(SimilarityScript::Ok(similar)) => Ok(similar),
            Some(SimilarityScript::Slow(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(vec![])
            }
            Some(SimilarityScript::Fail(e)) => Err(e),
            None => Ok(vec![]),
        }
    }

    async fn get_artist_top_albums(
        &self,
        _mbid: Option<&str>,
        name: &str,
        _limit: usize,
    ) -> ServiceResult<Vec<TopAlbum>> {
        Ok(self
            .top_albums
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_top_albums_by_tag(
        &self,
        tag: &str,
        _limit: usize,
    ) -> ServiceResult<Vec<TaggedAlbum>> {
        Ok(self
            .tag_albums
            .lock()
            .unwrap()
            .get(tag)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_track_tags(&self, _artist: &str, title: &str) -> ServiceResult<Vec<String>> {
        match self.track_tags.lock().unwrap().get(title) {
            Some(Ok(tags)) => Ok(tags.clone()),
            Some(Err(e)) => Err(e.clone()),
            None => Ok(vec![]),
        }
    }
}

// =============================================================================
// Metadata resolver
// =============================================================================

/// Resolver that derives canonical ids from titles and serves scripted
/// details. Unknown ids resolve to a studio album with 10 tracks.
#[derive(Default)]
pub struct FakeResolver {
    pub details: Mutex<HashMap<String, AlbumDetails>>,
}

pub fn album_id_for(title: &str) -> String {
    format!(
        "rg-{}",
        title
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect::<String>()
    )
}

#[async_trait]
impl MetadataResolver for FakeResolver {
    async fn search_album(&self, title: &str, artist: &str) -> ServiceResult<Option<AlbumRef>> {
        Ok(Some(AlbumRef {
            id: album_id_for(title),
            title: title.to_string(),
            artist: artist.to_string(),
        }))
    }

    async fn get_album_details(&self, id: &str) -> ServiceResult<Option<AlbumDetails>> {
        let scripted = self.details.lock().unwrap().get(id).cloned();
        Ok(Some(scripted.unwrap_or_else(|| AlbumDetails {
            id: id.to_string(),
            primary_type: Some("Album".to_string()),
            secondary_types: vec![],
            track_count: 10,
            release_date: None,
        })))
    }
}

// =============================================================================
// Acquisition
// =============================================================================

/// Scripted per-album acquisition outcome.
#[derive(Clone)]
pub enum AcquireScript {
    Success { correlation_id: String },
    NoRelease,
    Error,
}

#[derive(Default)]
pub struct ScriptedAcquisition {
    /// album_mbid → script; unscripted albums succeed.
    pub scripts: Mutex<HashMap<String, AcquireScript>>,
    pub requests: Mutex<Vec<AcquisitionRequest>>,
    pub artists: Mutex<Vec<ManagedArtist>>,
    pub removed_artists: Mutex<Vec<String>>,
    pub queue_entries: Mutex<Vec<AcquisitionQueueEntry>>,
    pub removed_entries: Mutex<Vec<String>>,
}

impl ScriptedAcquisition {
    pub fn script(&self, album_mbid: &str, script: AcquireScript) {
        self.scripts
            .lock()
            .unwrap()
            .insert(album_mbid.to_string(), script);
    }
}

#[async_trait]
impl AcquisitionService for ScriptedAcquisition {
    async fn acquire_album(
        &self,
        request: &AcquisitionRequest,
    ) -> ServiceResult<AcquisitionOutcome> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&request.album_mbid)
            .cloned();
        match script {
            None => Ok(AcquisitionOutcome {
                success: true,
                source: Some("indexer".to_string()),
                correlation_id: Some(format!("corr-{}", request.album_mbid)),
                error: None,
            }),
            Some(AcquireScript::Success { correlation_id }) => Ok(AcquisitionOutcome {
                success: true,
                source: Some("indexer".to_string()),
                correlation_id: Some(correlation_id),
                error: None,
            }),
            Some(AcquireScript::NoRelease) => Ok(AcquisitionOutcome {
                success: false,
                source: None,
                correlation_id: None,
                error: Some("no release found".to_string()),
            }),
            Some(AcquireScript::Error) => Err(ServiceError::Connection("refused".to_string())),
        }
    }

    async fn list_tagged_artists(&self, _tag: &str) -> ServiceResult<Vec<ManagedArtist>> {
        Ok(self.artists.lock().unwrap().clone())
    }

    async fn remove_artist(&self, artist_id: &str) -> ServiceResult<()> {
        self.removed_artists
            .lock()
            .unwrap()
            .push(artist_id.to_string());
        Ok(())
    }

    async fn list_queue_entries(&self) -> ServiceResult<Vec<AcquisitionQueueEntry>> {
        Ok(self.queue_entries.lock().unwrap().clone())
    }

    async fn remove_queue_entry(&self, entry_id: &str) -> ServiceResult<()> {
        self.removed_entries
            .lock()
            .unwrap()
            .push(entry_id.to_string());
        Ok(())
    }
}

// =============================================================================
// Events and notifications
// =============================================================================

#[derive(Default)]
pub struct RecordingEventSink {
    pub events: Mutex<Vec<DiscoveryEvent>>,
}

impl RecordingEventSink {
    pub fn all(&self) -> Vec<DiscoveryEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn complete_count(&self) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, DiscoveryEvent::Complete { .. }))
            .count()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: DiscoveryEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub completions: AtomicU32,
    pub failure_notifications: Mutex<Vec<u32>>,
    pub cache_invalidations: AtomicU32,
}

impl Notifier for RecordingNotifier {
    fn notify_enrichment_complete(&self, _artists_enriched: u32, _tracks_tagged: u32) {
        self.completions.fetch_add(1, Ordering::SeqCst);
    }

    fn notify_enrichment_failures(&self, failure_count: u32) {
        self.failure_notifications
            .lock()
            .unwrap()
            .push(failure_count);
    }
}

impl CacheInvalidator for RecordingNotifier {
    fn invalidate_mix_caches(&self) {
        self.cache_invalidations.fetch_add(1, Ordering::SeqCst);
    }
}
