//! End-to-end tests for the discovery batch lifecycle, driven through the
//! orchestrator with in-memory stores and scripted external services.

mod common;

use common::*;
use discofy_server::config::DiscoverySettings;
use discofy_server::discovery::{week_start_for, DiscoveryOrchestrator};
use discofy_server::discovery_store::{
    AcquisitionMetadata, BatchStatus, DiscoveryBatch, DiscoveryStore, DownloadJob, JobStatus,
    Tier, UserDiscoverySettings,
};
use discofy_server::library_store::{LibraryAlbum, LibraryTrack};
use discofy_server::recommend::RecommendationEngine;
use discofy_server::services::{DiscoveryEvent, QueueName, SimilarArtist, TopAlbum};
use discofy_server::{SqliteDiscoveryStore, SqliteLibraryStore};
use std::sync::Arc;

struct Harness {
    store: Arc<SqliteDiscoveryStore>,
    library: Arc<SqliteLibraryStore>,
    similarity: Arc<FakeSimilarity>,
    acquisition: Arc<ScriptedAcquisition>,
    queue: Arc<discofy_server::services::InProcessWorkQueue>,
    events: Arc<RecordingEventSink>,
    orchestrator: DiscoveryOrchestrator,
}

fn settings_for_tests() -> DiscoverySettings {
    DiscoverySettings {
        // No import-settle wait in tests.
        import_grace_secs: 0,
        ..Default::default()
    }
}

fn harness() -> Harness {
    let store = Arc::new(SqliteDiscoveryStore::in_memory().unwrap());
    let library = Arc::new(SqliteLibraryStore::in_memory().unwrap());
    let similarity = Arc::new(FakeSimilarity::default());
    let resolver = Arc::new(FakeResolver::default());
    let acquisition = Arc::new(ScriptedAcquisition::default());
    let queue = Arc::new(discofy_server::services::InProcessWorkQueue::new());
    let events = Arc::new(RecordingEventSink::default());

    let settings = settings_for_tests();
    let engine = Arc::new(RecommendationEngine::new(
        similarity.clone(),
        resolver,
        library.clone(),
        store.clone(),
        settings.clone(),
    ));
    let orchestrator = DiscoveryOrchestrator::new(
        store.clone(),
        library.clone(),
        engine,
        acquisition.clone(),
        queue.clone(),
        events.clone(),
        settings,
    );

    Harness {
        store,
        library,
        similarity,
        acquisition,
        queue,
        events,
        orchestrator,
    }
}

fn metadata(mbid: &str, artist: &str, album: &str) -> AcquisitionMetadata {
    AcquisitionMetadata {
        artist_name: artist.to_string(),
        album_name: album.to_string(),
        album_mbid: mbid.to_string(),
        similarity: 0.7,
        tier: Tier::High,
        library_anchor: false,
    }
}

/// Insert a batch with jobs directly into the store.
fn seed_batch(harness: &Harness, jobs_spec: &[(&str, &str, &str)]) -> (DiscoveryBatch, Vec<DownloadJob>) {
    let batch = DiscoveryBatch::new("u1", week_start_for(chrono::Utc::now().date_naive()), 10);
    let jobs: Vec<DownloadJob> = jobs_spec
        .iter()
        .map(|(mbid, artist, album)| DownloadJob::new("u1", &batch.id, metadata(mbid, artist, album)))
        .collect();
    harness.store.create_batch_with_jobs(&batch, &jobs).unwrap();
    (batch, jobs)
}

fn add_library_album(harness: &Harness, id: &str, artist: &str, title: &str, mbid: Option<&str>, track_count: usize) {
    let tracks: Vec<LibraryTrack> = (0..track_count)
        .map(|i| LibraryTrack {
            id: format!("{}-t{}", id, i),
            album_id: id.to_string(),
            artist_name: artist.to_string(),
            title: format!("{} track {}", title, i),
        })
        .collect();
    harness
        .library
        .add_album(
            &LibraryAlbum {
                id: id.to_string(),
                artist_name: artist.to_string(),
                title: title.to_string(),
                mbid: mbid.map(String::from),
            },
            &tracks,
        )
        .unwrap();
}

// =============================================================================
// Generation and dispatch
// =============================================================================

#[tokio::test]
async fn test_generate_requires_enabled_user() {
    let h = harness();
    assert!(h.orchestrator.generate("nobody").await.is_err());

    h.store
        .set_user_discovery_settings(&UserDiscoverySettings {
            user_id: "u1".to_string(),
            enabled: false,
            target_song_count: 10,
        })
        .unwrap();
    assert!(h.orchestrator.generate("u1").await.is_err());
}

#[tokio::test]
async fn test_generate_fails_fast_on_zero_recommendations() {
    let h = harness();
    h.store
        .set_user_discovery_settings(&UserDiscoverySettings {
            user_id: "u1".to_string(),
            enabled: true,
            target_song_count: 10,
        })
        .unwrap();

    // No seeds, no similarity data: nothing to recommend.
    assert!(h.orchestrator.generate("u1").await.is_err());
    assert!(h.store.get_active_batches().unwrap().is_empty());
}

#[tokio::test]
async fn test_generate_over_requests_and_dispatches() {
    let h = harness();
    h.store
        .set_user_discovery_settings(&UserDiscoverySettings {
            user_id: "u1".to_string(),
            enabled: true,
            target_song_count: 4,
        })
        .unwrap();
    h.library.record_listen("u1", "Seed", Some("mb-seed"), 50).unwrap();

    // Plenty of similar artists, one album each.
    let similar: Vec<SimilarArtist> = (0..10)
        .map(|i| SimilarArtist {
            name: format!("Artist{}", i),
            mbid: Some(format!("mb-{}", i)),
            match_score: 0.9 - (i as f64) * 0.02,
        })
        .collect();
    h.similarity.set_similar("Seed", similar);
    for i in 0..10 {
        h.similarity.top_albums.lock().unwrap().insert(
            format!("Artist{}", i),
            vec![TopAlbum {
                name: format!("Record {}", i),
                playcount: Some(1000),
            }],
        );
    }
    // Wildcard supply via the fallback genre set.
    h.similarity.tag_albums.lock().unwrap().insert(
        "electronic".to_string(),
        vec![discofy_server::services::TaggedAlbum {
            name: "Wild Record".to_string(),
            artist: "WildOne".to_string(),
        }],
    );

    let batch = h.orchestrator.generate("u1").await.unwrap();

    // ceil(4 × 1.3) = 6 albums requested.
    assert_eq!(batch.total_albums, 6);
    assert_eq!(batch.status, BatchStatus::Downloading);

    // Every job dispatched and accepted → processing with correlation ids.
    let counts = h.store.count_jobs_for_batch(&batch.id).unwrap();
    assert_eq!(counts.processing, 6);
    assert_eq!(h.acquisition.requests.lock().unwrap().len(), 6);
    let jobs = h.store.get_jobs_for_batch(&batch.id).unwrap();
    assert!(jobs.iter().all(|j| j.external_ref.is_some()));
}

#[tokio::test]
async fn test_dispatch_outcome_mapping() {
    let h = harness();
    let (batch, jobs) = seed_batch(
        &h,
        &[
            ("m-ok", "A1", "Okay"),
            ("m-none", "A2", "Missing"),
            ("m-err", "A3", "Broken"),
        ],
    );
    h.acquisition.script(
        "m-ok",
        AcquireScript::Success {
            correlation_id: "corr-1".to_string(),
        },
    );
    h.acquisition.script("m-none", AcquireScript::NoRelease);
    h.acquisition.script("m-err", AcquireScript::Error);

    h.orchestrator.dispatch(&batch.id).await.unwrap();

    let ok = h.store.get_job(&jobs[0].id).unwrap().unwrap();
    assert_eq!(ok.status, JobStatus::Processing);
    assert_eq!(ok.external_ref.as_deref(), Some("corr-1"));

    let none = h.store.get_job(&jobs[1].id).unwrap().unwrap();
    assert_eq!(none.status, JobStatus::Exhausted);

    let err = h.store.get_job(&jobs[2].id).unwrap().unwrap();
    assert_eq!(err.status, JobStatus::Failed);
    assert!(err.error.is_some());
}

// =============================================================================
// Completion detection
// =============================================================================

#[tokio::test]
async fn test_completion_two_done_one_failed_enters_scanning() {
    let h = harness();
    let (batch, jobs) = seed_batch(
        &h,
        &[
            ("m1", "A1", "One"),
            ("m2", "A2", "Two"),
            ("m3", "A3", "Three"),
        ],
    );

    h.orchestrator.handle_job_completed(&jobs[0].id).await.unwrap();
    h.orchestrator.handle_job_completed(&jobs[1].id).await.unwrap();
    h.orchestrator
        .handle_job_failed(&jobs[2].id, "no seeders")
        .await
        .unwrap();

    let batch = h.store.get_batch(&batch.id).unwrap().unwrap();
    assert_eq!(batch.status, BatchStatus::Scanning);
    assert_eq!(batch.completed_albums, 2);
    assert_eq!(batch.failed_albums, 1);

    // Exactly one unavailable-album row and one scan job.
    let unavailable = h.store.get_unavailable_albums("u1", batch.week_start).unwrap();
    assert_eq!(unavailable.len(), 1);
    assert_eq!(unavailable[0].album_mbid, "m3");
    assert_eq!(h.queue.entries_for(QueueName::LibraryScan).len(), 1);
}

#[tokio::test]
async fn test_completion_check_noop_while_jobs_open() {
    let h = harness();
    let (batch, jobs) = seed_batch(&h, &[("m1", "A1", "One"), ("m2", "A2", "Two")]);

    h.orchestrator.handle_job_completed(&jobs[0].id).await.unwrap();

    let loaded = h.store.get_batch(&batch.id).unwrap().unwrap();
    assert_eq!(loaded.status, BatchStatus::Downloading);
    assert!(h.queue.is_empty());
    // Observers saw a progress event for the open batch.
    assert!(h
        .events
        .all()
        .iter()
        .any(|e| matches!(e, DiscoveryEvent::Progress { .. })));
}

#[tokio::test]
async fn test_completion_check_reentrant_on_scanning_batch() {
    let h = harness();
    let (batch, jobs) = seed_batch(&h, &[("m1", "A1", "One"), ("m2", "A2", "Two")]);

    h.orchestrator.handle_job_completed(&jobs[0].id).await.unwrap();
    h.orchestrator
        .handle_job_failed(&jobs[1].id, "gone")
        .await
        .unwrap();
    assert_eq!(
        h.store.get_batch(&batch.id).unwrap().unwrap().status,
        BatchStatus::Scanning
    );

    let unavailable_before = h.store.get_unavailable_albums("u1", batch.week_start).unwrap();
    let scan_jobs_before = h.queue.entries_for(QueueName::LibraryScan).len();
    let events_before = h.events.all().len();

    // Calling again on a scanning batch is a no-op.
    h.orchestrator.check_batch_completion(&batch.id).await.unwrap();
    h.orchestrator.check_batch_completion(&batch.id).await.unwrap();

    let unavailable_after = h.store.get_unavailable_albums("u1", batch.week_start).unwrap();
    assert_eq!(unavailable_before[0].attempts, unavailable_after[0].attempts);
    assert_eq!(unavailable_after.len(), unavailable_before.len());
    assert_eq!(
        h.queue.entries_for(QueueName::LibraryScan).len(),
        scan_jobs_before
    );
    assert_eq!(h.events.all().len(), events_before);
}

#[tokio::test]
async fn test_zero_successes_fails_batch_and_cleans_up() {
    let h = harness();
    let (batch, jobs) = seed_batch(&h, &[("m1", "A1", "One"), ("m2", "A2", "Two")]);

    // One tagged artist with no downloads, one with downloads elsewhere.
    *h.acquisition.artists.lock().unwrap() = vec![
        discofy_server::services::ManagedArtist {
            id: "ar-1".to_string(),
            name: "A1".to_string(),
            tags: vec![],
            has_downloads: false,
            has_liked_albums: false,
        },
        discofy_server::services::ManagedArtist {
            id: "ar-2".to_string(),
            name: "A2".to_string(),
            tags: vec![],
            has_downloads: true,
            has_liked_albums: false,
        },
    ];

    h.orchestrator
        .handle_job_failed(&jobs[0].id, "nothing found")
        .await
        .unwrap();
    h.orchestrator
        .handle_job_failed(&jobs[1].id, "nothing found")
        .await
        .unwrap();

    let batch = h.store.get_batch(&batch.id).unwrap().unwrap();
    assert_eq!(batch.status, BatchStatus::Failed);
    assert!(batch.error_message.is_some());
    assert!(batch.completed_at.is_some());

    // Only the artist without downloads was removed.
    assert_eq!(
        h.acquisition.removed_artists.lock().unwrap().as_slice(),
        &["ar-1".to_string()]
    );
    // No scan job for a failed batch; terminal event emitted.
    assert!(h.queue.entries_for(QueueName::LibraryScan).is_empty());
    assert_eq!(h.events.complete_count(), 1);
}

// =============================================================================
// Playlist assembly
// =============================================================================

async fn scanned_batch_with_imports(h: &Harness) -> (DiscoveryBatch, Vec<DownloadJob>) {
    let (batch, jobs) = seed_batch(
        h,
        &[
            ("mb-one", "Artist One", "Album One"),
            ("mb-two", "Artist Two", "Album Two"),
            ("mb-three", "Artist Three", "Album Three"),
        ],
    );

    // Imported: two albums land in the library, the third never arrives.
    add_library_album(h, "lib-1", "Artist One", "Album One", Some("mb-one"), 8);
    add_library_album(h, "lib-2", "Artist Two", "Album Two", None, 9);

    h.orchestrator.handle_job_completed(&jobs[0].id).await.unwrap();
    h.orchestrator.handle_job_completed(&jobs[1].id).await.unwrap();
    h.orchestrator
        .handle_job_failed(&jobs[2].id, "gone")
        .await
        .unwrap();

    (batch, jobs)
}

#[tokio::test]
async fn test_build_final_playlist_counts_and_completion() {
    let h = harness();
    let (batch, _) = scanned_batch_with_imports(&h).await;

    // Anchor supply: a seed artist with a library album.
    h.library.record_listen("u1", "Old Favorite", None, 99).unwrap();
    add_library_album(&h, "lib-old", "Old Favorite", "Classic", None, 10);

    let playlist = h.orchestrator.build_final_playlist(&batch.id).await.unwrap();

    // 2 discovery tracks (one per imported album) + ceil(2 × 0.2) = 1 anchor.
    assert_eq!(playlist.len(), 3);
    assert_eq!(playlist.iter().filter(|t| t.is_anchor).count(), 1);
    assert_eq!(playlist.iter().filter(|t| !t.is_anchor).count(), 2);

    let batch = h.store.get_batch(&batch.id).unwrap().unwrap();
    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.final_song_count, Some(3));

    // Exclusion windows refreshed for the surfaced albums.
    let now = chrono::Utc::now().timestamp();
    let exclusions = h.store.get_active_exclusions("u1", now).unwrap();
    assert!(exclusions.contains(&"mb-one".to_string()));
    assert!(exclusions.contains(&"mb-two".to_string()));
}

#[tokio::test]
async fn test_build_final_playlist_idempotent() {
    let h = harness();
    let (batch, _) = scanned_batch_with_imports(&h).await;

    h.orchestrator.build_final_playlist(&batch.id).await.unwrap();
    let albums_first = h.store.get_discovery_albums("u1", batch.week_start).unwrap();

    // Regeneration must not duplicate rows.
    h.orchestrator.build_final_playlist(&batch.id).await.unwrap();
    let albums_second = h.store.get_discovery_albums("u1", batch.week_start).unwrap();

    assert_eq!(albums_first.len(), 2);
    assert_eq!(albums_second.len(), 2);
    for album in &albums_second {
        let tracks = h
            .store
            .get_discovery_tracks("u1", batch.week_start, &album.album_mbid)
            .unwrap();
        assert_eq!(tracks.len(), 1);
    }
}

#[tokio::test]
async fn test_playlist_tier_copied_from_job_metadata() {
    let h = harness();
    let batch = DiscoveryBatch::new("u1", week_start_for(chrono::Utc::now().date_naive()), 10);
    let mut meta = metadata("mb-wild", "Wild Artist", "Wild Album");
    meta.tier = Tier::Wildcard;
    meta.similarity = 0.95; // Intentionally mismatched with the tier.
    let job = DownloadJob::new("u1", &batch.id, meta);
    h.store.create_batch_with_jobs(&batch, &[job.clone()]).unwrap();

    add_library_album(&h, "lib-w", "Wild Artist", "Wild Album", Some("mb-wild"), 8);
    h.orchestrator.handle_job_completed(&job.id).await.unwrap();
    h.orchestrator.build_final_playlist(&batch.id).await.unwrap();

    let albums = h.store.get_discovery_albums("u1", batch.week_start).unwrap();
    assert_eq!(albums.len(), 1);
    // Never recomputed from similarity.
    assert_eq!(albums[0].tier, Tier::Wildcard);
    assert_eq!(albums[0].similarity, 0.95);
}

#[tokio::test]
async fn test_playlist_zero_resolvable_tracks_fails_batch() {
    let h = harness();
    let (batch, jobs) = seed_batch(&h, &[("mb-ghost", "Ghost", "Nothing")]);
    // Job completed but the scan never imported anything.
    h.orchestrator.handle_job_completed(&jobs[0].id).await.unwrap();
    assert_eq!(
        h.store.get_batch(&batch.id).unwrap().unwrap().status,
        BatchStatus::Scanning
    );

    let playlist = h.orchestrator.build_final_playlist(&batch.id).await.unwrap();
    assert!(playlist.is_empty());

    let batch = h.store.get_batch(&batch.id).unwrap().unwrap();
    assert_eq!(batch.status, BatchStatus::Failed);
    assert!(batch.error_message.unwrap().contains("zero resolvable"));
}

#[tokio::test]
async fn test_playlist_fuzzy_track_resolution() {
    let h = harness();
    // Job metadata spells things differently from the imported library copy.
    let (batch, jobs) = seed_batch(&h, &[("mb-x", "Sigur Ros", "Agaetis Byrjun")]);
    add_library_album(
        &h,
        "lib-sr",
        "Sigur Rós",
        "Ágætis byrjun (Remastered)",
        None,
        8,
    );

    h.orchestrator.handle_job_completed(&jobs[0].id).await.unwrap();
    let playlist = h.orchestrator.build_final_playlist(&batch.id).await.unwrap();

    assert_eq!(playlist.iter().filter(|t| !t.is_anchor).count(), 1);
}

// =============================================================================
// Sweeps
// =============================================================================

#[tokio::test]
async fn test_stuck_sweep_force_fails_ancient_batch() {
    let h = harness();
    let mut batch = DiscoveryBatch::new("u1", week_start_for(chrono::Utc::now().date_naive()), 10);
    batch.created_at = chrono::Utc::now().timestamp() - 3 * 3600; // 3 hours old
    let jobs = vec![
        DownloadJob::new("u1", &batch.id, metadata("m1", "A1", "One")),
        DownloadJob::new("u1", &batch.id, metadata("m2", "A2", "Two")),
    ];
    h.store.create_batch_with_jobs(&batch, &jobs).unwrap();
    // Even a completed job doesn't save it from the absolute ceiling.
    h.store
        .set_job_status(&jobs[0].id, JobStatus::Completed, None)
        .unwrap();

    let touched = h.orchestrator.check_stuck_batches().await.unwrap();
    assert_eq!(touched, 1);

    let batch = h.store.get_batch(&batch.id).unwrap().unwrap();
    assert_eq!(batch.status, BatchStatus::Failed);

    let open_job = h.store.get_job(&jobs[1].id).unwrap().unwrap();
    assert_eq!(open_job.status, JobStatus::Failed);
    assert_eq!(open_job.error.as_deref(), Some("timeout"));
}

#[tokio::test]
async fn test_stuck_sweep_asymmetric_thresholds() {
    let h = harness();
    let now = chrono::Utc::now().timestamp();

    // 45 minutes old with one completion: over the 30-minute some-progress
    // threshold.
    let mut with_progress = DiscoveryBatch::new("u1", week_start_for(chrono::Utc::now().date_naive()), 10);
    with_progress.created_at = now - 45 * 60;
    let progress_jobs = vec![
        DownloadJob::new("u1", &with_progress.id, metadata("p1", "B1", "One")),
        DownloadJob::new("u1", &with_progress.id, metadata("p2", "B2", "Two")),
    ];
    h.store
        .create_batch_with_jobs(&with_progress, &progress_jobs)
        .unwrap();
    h.store
        .set_job_status(&progress_jobs[0].id, JobStatus::Completed, None)
        .unwrap();

    // 45 minutes old with zero completions: under the 60-minute
    // no-progress threshold, left alone.
    let mut no_progress = DiscoveryBatch::new("u2", week_start_for(chrono::Utc::now().date_naive()), 10);
    no_progress.created_at = now - 45 * 60;
    let stalled_jobs = vec![DownloadJob::new(
        "u2",
        &no_progress.id,
        metadata("q1", "C1", "One"),
    )];
    h.store
        .create_batch_with_jobs(&no_progress, &stalled_jobs)
        .unwrap();

    h.orchestrator.check_stuck_batches().await.unwrap();

    // Progress batch: open job timed out, batch advanced to scanning.
    let advanced = h.store.get_batch(&with_progress.id).unwrap().unwrap();
    assert_eq!(advanced.status, BatchStatus::Scanning);

    // No-progress batch untouched.
    let untouched = h.store.get_batch(&no_progress.id).unwrap().unwrap();
    assert_eq!(untouched.status, BatchStatus::Downloading);
    assert_eq!(
        h.store.get_job(&stalled_jobs[0].id).unwrap().unwrap().status,
        JobStatus::Pending
    );
}

#[tokio::test]
async fn test_reconcile_backfills_missing_discovery_rows() {
    let h = harness();
    let (batch, jobs) = seed_batch(&h, &[("mb-one", "Artist One", "Album One")]);
    add_library_album(&h, "lib-1", "Artist One", "Album One", Some("mb-one"), 8);

    h.orchestrator.handle_job_completed(&jobs[0].id).await.unwrap();
    // Batch completes but the discovery row was never written (race).
    let loaded = h.store.get_batch(&batch.id).unwrap().unwrap();
    let transition = discofy_server::discovery_store::BatchTransition {
        status: BatchStatus::Completed,
        completed_albums: 1,
        failed_albums: 0,
        error_message: None,
        final_song_count: Some(1),
    };
    assert!(h
        .store
        .transition_batch(&batch.id, loaded.version, &transition, &[])
        .unwrap());

    let backfilled = h.orchestrator.reconcile_discovery_tracks().await.unwrap();
    assert_eq!(backfilled, 1);
    assert!(h
        .store
        .has_discovery_album("u1", batch.week_start, "mb-one")
        .unwrap());

    // Second sweep finds nothing to do.
    assert_eq!(h.orchestrator.reconcile_discovery_tracks().await.unwrap(), 0);
}

// =============================================================================
// Replacement search
// =============================================================================

#[tokio::test]
async fn test_replacement_avoids_batch_artists() {
    let h = harness();
    let (_batch, jobs) = seed_batch(&h, &[("m1", "Failed Artist", "Flop")]);
    h.library.record_listen("u1", "Seed", Some("mb-seed"), 50).unwrap();
    h.similarity.set_similar(
        "Seed",
        vec![
            SimilarArtist {
                name: "Failed Artist".to_string(),
                mbid: Some("mb-f".to_string()),
                match_score: 0.9,
            },
            SimilarArtist {
                name: "Fresh Artist".to_string(),
                mbid: Some("mb-fresh".to_string()),
                match_score: 0.7,
            },
        ],
    );
    h.similarity.top_albums.lock().unwrap().insert(
        "Fresh Artist".to_string(),
        vec![TopAlbum {
            name: "Fresh Album".to_string(),
            playcount: Some(500),
        }],
    );

    let replacement = h
        .orchestrator
        .find_replacement_album(&jobs[0])
        .await
        .unwrap()
        .unwrap();

    assert!(!replacement.library_anchor);
    assert_eq!(replacement.album.artist_name, "Fresh Artist");
}

#[tokio::test]
async fn test_replacement_creates_new_job_not_reopening_failed_one() {
    let h = harness();
    let (batch, jobs) = seed_batch(&h, &[("m1", "Failed Artist", "Flop")]);
    h.store
        .set_job_status(&jobs[0].id, JobStatus::Failed, Some("no seeders"))
        .unwrap();

    h.library.record_listen("u1", "Seed", Some("mb-seed"), 50).unwrap();
    h.similarity.set_similar(
        "Seed",
        vec![SimilarArtist {
            name: "Fresh Artist".to_string(),
            mbid: Some("mb-fresh".to_string()),
            match_score: 0.7,
        }],
    );
    h.similarity.top_albums.lock().unwrap().insert(
        "Fresh Artist".to_string(),
        vec![TopAlbum {
            name: "Fresh Album".to_string(),
            playcount: Some(500),
        }],
    );

    let new_job = h
        .orchestrator
        .queue_replacement_job(&jobs[0])
        .await
        .unwrap()
        .unwrap();

    assert_ne!(new_job.id, jobs[0].id);
    assert_eq!(
        new_job.kind,
        discofy_server::discovery_store::JobKind::Replacement
    );
    // Dispatched immediately (scripted acquisition defaults to success).
    assert_eq!(new_job.status, JobStatus::Processing);
    // The failed job stays failed.
    assert_eq!(
        h.store.get_job(&jobs[0].id).unwrap().unwrap().status,
        JobStatus::Failed
    );
    assert_eq!(h.store.count_jobs_for_batch(&batch.id).unwrap().total, 2);
}

#[tokio::test]
async fn test_replacement_falls_back_to_library_anchor() {
    let h = harness();
    let (_batch, jobs) = seed_batch(&h, &[("m1", "Failed Artist", "Flop")]);
    // No similarity candidates at all, but a seed artist with owned albums.
    h.library.record_listen("u1", "Old Favorite", None, 80).unwrap();
    add_library_album(&h, "lib-fav", "Old Favorite", "Greatest", None, 11);

    let replacement = h
        .orchestrator
        .find_replacement_album(&jobs[0])
        .await
        .unwrap()
        .unwrap();

    assert!(replacement.library_anchor);
    assert_eq!(replacement.album.artist_name, "Old Favorite");
}
