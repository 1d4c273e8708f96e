//! Enrichment cycle controller.
//!
//! A single-flight, interval-driven controller that advances artist
//! metadata, track mood tags, audio analysis and vibe embeddings through
//! strictly ordered phases. Lifecycle state is instance data on this
//! struct - constructed once per process, with pause/resume/stop exposed
//! as methods, so tests can run independent instances side by side.

use super::breaker::{AudioAnalyzerBreaker, SystemFailureBreaker};
use crate::config::EnrichmentSettings;
use crate::enrichment_store::{
    error_codes, EnrichmentFailure, EnrichmentPhase, EnrichmentState, EnrichmentStatus,
    EnrichmentStore, FailureKind,
};
use crate::services::{BackoffPolicy, CacheInvalidator, Notifier, SimilarityService, WorkQueue};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct EnrichmentController {
    pub(super) store: Arc<dyn EnrichmentStore>,
    pub(super) similarity: Arc<dyn SimilarityService>,
    pub(super) work_queue: Arc<dyn WorkQueue>,
    notifier: Arc<dyn Notifier>,
    cache: Arc<dyn CacheInvalidator>,
    pub(super) settings: EnrichmentSettings,
    pub(super) backoff: BackoffPolicy,

    paused: AtomicBool,
    stopped: AtomicBool,
    in_flight: AtomicBool,
    immediate: AtomicBool,
    last_cycle_started: Mutex<Option<Instant>>,
    /// Watermark for "did the analyzer complete anything since last look".
    pub(super) last_audio_observed_at: AtomicI64,
    pub(super) audio_breaker: Mutex<AudioAnalyzerBreaker>,
    system_breaker: Mutex<SystemFailureBreaker>,
}

impl EnrichmentController {
    pub fn new(
        store: Arc<dyn EnrichmentStore>,
        similarity: Arc<dyn SimilarityService>,
        work_queue: Arc<dyn WorkQueue>,
        notifier: Arc<dyn Notifier>,
        cache: Arc<dyn CacheInvalidator>,
        settings: EnrichmentSettings,
    ) -> Self {
        let audio_breaker = AudioAnalyzerBreaker::new(settings.audio_breaker_threshold);
        let system_breaker = SystemFailureBreaker::new(settings.system_failure_threshold);
        Self {
            store,
            similarity,
            work_queue,
            notifier,
            cache,
            settings,
            backoff: BackoffPolicy::default(),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
            immediate: AtomicBool::new(false),
            last_cycle_started: Mutex::new(None),
            last_audio_observed_at: AtomicI64::new(0),
            audio_breaker: Mutex::new(audio_breaker),
            system_breaker: Mutex::new(system_breaker),
        }
    }

    /// Override the retry policy (tests use millisecond delays).
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Main loop: one tick every `tick_secs` until shutdown.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Enrichment controller starting (tick every {}s)",
            self.settings.tick_secs
        );
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.settings.tick_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_cycle_if_due(false).await;
                }
                _ = shutdown.cancelled() => {
                    info!("Enrichment controller shutting down");
                    self.stop();
                    break;
                }
            }
        }
    }

    /// Cooperative pause: current in-flight items finish, nothing new
    /// starts until resume.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        if let Err(e) = self.set_status(EnrichmentStatus::Paused) {
            warn!("Failed to persist paused state: {}", e);
        }
        info!("Enrichment paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.stopped.store(false, Ordering::SeqCst);
        if let Err(e) = self.set_status(EnrichmentStatus::Idle) {
            warn!("Failed to persist resumed state: {}", e);
        }
        info!("Enrichment resumed");
    }

    /// Cooperative stop: completes the current phase's in-flight work,
    /// halts before the next phase, clears any pending immediate trigger
    /// and persists idle on the next checkpoint.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.immediate.store(false, Ordering::SeqCst);
        if let Err(e) = self.set_status(EnrichmentStatus::Stopping) {
            warn!("Failed to persist stopping state: {}", e);
        }
        info!("Enrichment stop requested");
    }

    /// Request an immediate cycle, bypassing the minimum-interval guard
    /// (used when new content needs fast turnaround). Still single-flight:
    /// if a cycle is in flight the request is queued for right after.
    pub async fn trigger_now(&self) {
        self.immediate.store(true, Ordering::SeqCst);
        self.run_cycle_if_due(true).await;
    }

    /// Full re-enrichment: a state reset followed by the normal cycle -
    /// not a separate code path.
    pub async fn run_full_enrichment(&self) -> Result<()> {
        info!("Full re-enrichment requested; resetting all statuses");
        self.store.reset_all()?;
        self.trigger_now().await;
        Ok(())
    }

    /// Current observational state.
    pub fn status(&self) -> Result<EnrichmentState> {
        self.store.get_state()
    }

    /// Targeted retry for failed artists.
    pub fn retry_artists(&self, ids: &[String]) -> Result<usize> {
        self.store.reset_artists_to_pending(ids)
    }

    pub fn reset_artists(&self) -> Result<()> {
        self.store.reset_artists_only()
    }

    pub fn reset_moods(&self) -> Result<()> {
        self.store.reset_moods_only()
    }

    pub fn reset_audio(&self) -> Result<()> {
        self.store.reset_audio_only()
    }

    // =========================================================================
    // Cycle execution
    // =========================================================================

    pub(super) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub(super) fn stop_requested(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Checked before each unit of work inside the bounded-concurrency
    /// phases; a halted worker returns a typed "skipped" outcome instead
    /// of throwing.
    pub(super) fn should_halt(&self) -> bool {
        self.is_paused() || self.stop_requested()
    }

    /// Run one cycle if the guards allow it.
    ///
    /// `force` consumes the immediate-trigger path: the minimum-interval
    /// guard is skipped but the single-flight guard still holds.
    pub async fn run_cycle_if_due(&self, force: bool) {
        if self.stop_requested() && !force {
            return;
        }

        if force {
            self.stopped.store(false, Ordering::SeqCst);
            self.immediate.store(false, Ordering::SeqCst);
        } else {
            let gap_ok = {
                let last = self.last_cycle_started.lock().unwrap();
                last.map_or(true, |t| {
                    t.elapsed() >= Duration::from_secs(self.settings.min_cycle_gap_secs)
                })
            };
            let immediate = self.immediate.swap(false, Ordering::SeqCst);
            if !gap_ok && !immediate {
                return;
            }
        }

        // Single flight: cycles never overlap.
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            if force {
                // Re-arm so the running cycle is followed by another.
                self.immediate.store(true, Ordering::SeqCst);
            }
            return;
        }

        *self.last_cycle_started.lock().unwrap() = Some(Instant::now());
        self.run_cycle_guarded().await;
        self.in_flight.store(false, Ordering::SeqCst);
    }

    /// Top-level exception boundary: a throwing cycle never kills the
    /// scheduler loop, and repeated throws stop producing failure rows.
    async fn run_cycle_guarded(&self) {
        match self.run_cycle().await {
            Ok(cycle_failures) => {
                self.system_breaker.lock().unwrap().record_success();
                if cycle_failures > 0 {
                    // One aggregated notification per cycle, then the
                    // accumulator resets.
                    self.notifier.notify_enrichment_failures(cycle_failures);
                }
            }
            Err(e) => {
                error!("Enrichment cycle failed: {:#}", e);
                let record = self.system_breaker.lock().unwrap().record_failure();
                if record {
                    let failure = EnrichmentFailure::new(
                        FailureKind::System,
                        "cycle",
                        "enrichment cycle",
                        error_codes::SYSTEM_ERROR,
                        &e.to_string(),
                    );
                    if let Err(e) = self.store.append_failure(&failure) {
                        warn!("Could not record system failure: {}", e);
                    }
                } else {
                    warn!(
                        "System failure breaker open ({} consecutive); not recording",
                        self.system_breaker.lock().unwrap().consecutive_failures()
                    );
                }
            }
        }
    }

    /// One full cycle: artists → track moods → audio → vibe, each phase
    /// checked for pause/stop before it starts. Returns the per-cycle
    /// failure count for the aggregated notification.
    async fn run_cycle(&self) -> Result<u32> {
        self.set_status(if self.is_paused() {
            EnrichmentStatus::Paused
        } else {
            EnrichmentStatus::Running
        })?;

        let mut cycle_failures: u32 = 0;
        let phases = [
            EnrichmentPhase::Artists,
            EnrichmentPhase::Tracks,
            EnrichmentPhase::Audio,
            EnrichmentPhase::Vibe,
        ];

        for phase in phases {
            if self.should_halt() {
                break;
            }
            if phase == EnrichmentPhase::Vibe && !self.settings.vibe_enabled {
                continue;
            }

            self.set_phase(Some(phase))?;
            match phase {
                EnrichmentPhase::Artists => {
                    cycle_failures += self.phase_artists().await?;
                }
                EnrichmentPhase::Tracks => {
                    cycle_failures += self.phase_track_moods().await?;
                }
                EnrichmentPhase::Audio => {
                    self.phase_audio().await?;
                }
                EnrichmentPhase::Vibe => {
                    self.phase_vibe().await?;
                }
            }
            self.update_progress()?;
        }

        self.set_phase(None)?;
        self.update_progress()?;

        let final_status = if self.stop_requested() {
            self.stopped_cleanup();
            EnrichmentStatus::Idle
        } else if self.is_paused() {
            EnrichmentStatus::Paused
        } else {
            EnrichmentStatus::Idle
        };
        self.set_status(final_status)?;

        Ok(cycle_failures)
    }

    fn stopped_cleanup(&self) {
        self.immediate.store(false, Ordering::SeqCst);
    }

    // =========================================================================
    // State bookkeeping
    // =========================================================================

    fn set_status(&self, status: EnrichmentStatus) -> Result<()> {
        let mut state = self.store.get_state()?;
        state.status = status;
        if status == EnrichmentStatus::Idle {
            state.current_phase = None;
        }
        state.updated_at = chrono::Utc::now().timestamp();
        self.store.save_state(&state)
    }

    pub(super) fn set_phase(&self, phase: Option<EnrichmentPhase>) -> Result<()> {
        let mut state = self.store.get_state()?;
        state.current_phase = phase;
        state.updated_at = chrono::Utc::now().timestamp();
        self.store.save_state(&state)
    }

    pub(super) fn set_current_item(&self, phase: EnrichmentPhase, label: Option<String>) {
        let result = self.store.get_state().and_then(|mut state| {
            let progress = match phase {
                EnrichmentPhase::Artists => &mut state.artists,
                EnrichmentPhase::Tracks => &mut state.tracks,
                EnrichmentPhase::Audio => &mut state.audio,
                EnrichmentPhase::Vibe => &mut state.vibe,
            };
            progress.current_item = label;
            self.store.save_state(&state)
        });
        if let Err(e) = result {
            warn!("Failed to update current enrichment item: {}", e);
        }
    }

    /// Recompute aggregate progress and apply the one-shot completion
    /// actions. Core completion (artists + moods) invalidates mix caches
    /// once; full completion (core + empty audio backlog) additionally
    /// fires the completion notification once and invalidates caches a
    /// second time to pick up audio-derived data.
    pub(super) fn update_progress(&self) -> Result<()> {
        let mut state = self.store.get_state()?;
        state.artists.counts = self.store.artist_counts()?;
        state.tracks.counts = self.store.track_counts()?;
        state.audio.counts = self.store.audio_counts()?;
        state.vibe.counts = self.store.vibe_counts()?;

        if state.core_complete() && !state.core_cache_cleared {
            info!("Core enrichment complete (artists + track moods)");
            self.cache.invalidate_mix_caches();
            state.core_cache_cleared = true;
        }

        if state.fully_complete() {
            if !state.completion_notification_sent {
                self.notifier.notify_enrichment_complete(
                    state.artists.counts.completed,
                    state.tracks.counts.completed,
                );
                state.completion_notification_sent = true;
            }
            if !state.full_cache_cleared {
                self.cache.invalidate_mix_caches();
                state.full_cache_cleared = true;
            }
        }

        state.updated_at = chrono::Utc::now().timestamp();
        self.store.save_state(&state)
    }
}
