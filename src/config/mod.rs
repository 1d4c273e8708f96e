mod file_config;

pub use file_config::{DiscoveryConfig, EnrichmentConfig, FileConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;

/// CLI arguments that participate in config resolution.
///
/// Mirrors the CLI surface of the server binary; every field here can be
/// overridden by the TOML config file.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub similarity_api_key: Option<String>,
    pub metadata_user_agent: Option<String>,
    pub acquirer_url: Option<String>,
    pub acquirer_timeout_sec: u64,
}

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub similarity_api_key: Option<String>,
    pub metadata_user_agent: String,
    pub acquirer_url: Option<String>,
    pub acquirer_timeout_sec: u64,
    pub discovery: DiscoverySettings,
    pub enrichment: EnrichmentSettings,
}

/// Settings governing discovery batch generation and recovery.
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// Over-request factor: albums requested = ceil(target songs × ratio).
    pub download_ratio: f64,
    /// Fixed wait for external import to settle before the batch leaves
    /// `downloading`.
    pub import_grace_secs: u64,
    /// Timeout for batches with zero completed jobs.
    pub stuck_no_progress_mins: i64,
    /// Timeout for batches with at least one completed job.
    pub stuck_some_progress_mins: i64,
    /// Absolute ceiling: batches older than this are force-failed.
    pub batch_max_age_hours: i64,
    /// How long a suggested album stays suppressed from re-recommendation.
    pub exclusion_window_days: i64,
    /// Anchor tracks as a fraction of the discovery set size.
    pub anchor_ratio: f64,
    /// Albums with fewer tracks than this are rejected (EP filter).
    pub min_album_tracks: u32,
    /// Releases within this many years get a recency bonus.
    pub recent_release_years: i64,
    pub top_albums_per_artist: usize,
    pub seed_artist_limit: usize,
    pub reconcile_lookback_days: i64,
    /// Interval between stuck-batch / reconcile sweep runs.
    pub sweep_interval_secs: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            download_ratio: 1.3,
            import_grace_secs: 60,
            stuck_no_progress_mins: 60,
            stuck_some_progress_mins: 30,
            batch_max_age_hours: 2,
            exclusion_window_days: 90,
            anchor_ratio: 0.2,
            min_album_tracks: 7,
            recent_release_years: 5,
            top_albums_per_artist: 5,
            seed_artist_limit: 10,
            reconcile_lookback_days: 7,
            sweep_interval_secs: 300,
        }
    }
}

/// Settings governing the enrichment cycle controller.
#[derive(Debug, Clone)]
pub struct EnrichmentSettings {
    pub tick_secs: u64,
    /// Minimum gap between two cycle starts (bypassed by explicit trigger).
    pub min_cycle_gap_secs: u64,
    pub artist_batch_size: usize,
    pub artist_timeout_secs: u64,
    pub artist_concurrency: usize,
    pub track_batch_size: usize,
    pub track_timeout_secs: u64,
    pub max_moods_per_track: usize,
    pub audio_batch_size: usize,
    /// Audio jobs stuck in `processing` longer than this are reset.
    pub audio_stale_secs: i64,
    /// Cycles without analyzer progress before the audio breaker opens.
    pub audio_breaker_threshold: u32,
    pub vibe_enabled: bool,
    pub vibe_batch_size: usize,
    /// Consecutive cycle-level exceptions before system failure rows stop
    /// being recorded.
    pub system_failure_threshold: u32,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            tick_secs: 30,
            min_cycle_gap_secs: 10,
            artist_batch_size: 10,
            artist_timeout_secs: 60,
            artist_concurrency: 1,
            track_batch_size: 25,
            track_timeout_secs: 30,
            max_moods_per_track: 10,
            audio_batch_size: 50,
            audio_stale_secs: 600,
            audio_breaker_threshold: 3,
            vibe_enabled: false,
            vibe_batch_size: 1000,
            system_failure_threshold: 5,
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let similarity_api_key = file
            .similarity_api_key
            .or_else(|| cli.similarity_api_key.clone());
        let metadata_user_agent = file
            .metadata_user_agent
            .or_else(|| cli.metadata_user_agent.clone())
            .unwrap_or_else(|| format!("discofy-server/{}", env!("CARGO_PKG_VERSION")));
        let acquirer_url = file.acquirer_url.or_else(|| cli.acquirer_url.clone());
        let acquirer_timeout_sec = file
            .acquirer_timeout_sec
            .unwrap_or(cli.acquirer_timeout_sec);

        let defaults = DiscoverySettings::default();
        let d = file.discovery.unwrap_or_default();
        let discovery = DiscoverySettings {
            download_ratio: d.download_ratio.unwrap_or(defaults.download_ratio),
            import_grace_secs: d.import_grace_secs.unwrap_or(defaults.import_grace_secs),
            stuck_no_progress_mins: d
                .stuck_no_progress_mins
                .unwrap_or(defaults.stuck_no_progress_mins),
            stuck_some_progress_mins: d
                .stuck_some_progress_mins
                .unwrap_or(defaults.stuck_some_progress_mins),
            batch_max_age_hours: d
                .batch_max_age_hours
                .unwrap_or(defaults.batch_max_age_hours),
            exclusion_window_days: d
                .exclusion_window_days
                .unwrap_or(defaults.exclusion_window_days),
            anchor_ratio: d.anchor_ratio.unwrap_or(defaults.anchor_ratio),
            min_album_tracks: d.min_album_tracks.unwrap_or(defaults.min_album_tracks),
            recent_release_years: d
                .recent_release_years
                .unwrap_or(defaults.recent_release_years),
            top_albums_per_artist: d
                .top_albums_per_artist
                .unwrap_or(defaults.top_albums_per_artist),
            seed_artist_limit: d.seed_artist_limit.unwrap_or(defaults.seed_artist_limit),
            reconcile_lookback_days: d
                .reconcile_lookback_days
                .unwrap_or(defaults.reconcile_lookback_days),
            sweep_interval_secs: d
                .sweep_interval_secs
                .unwrap_or(defaults.sweep_interval_secs),
        };

        if discovery.download_ratio < 1.0 {
            bail!(
                "discovery.download_ratio must be >= 1.0 (got {})",
                discovery.download_ratio
            );
        }

        let defaults = EnrichmentSettings::default();
        let e = file.enrichment.unwrap_or_default();
        let enrichment = EnrichmentSettings {
            tick_secs: e.tick_secs.unwrap_or(defaults.tick_secs),
            min_cycle_gap_secs: e.min_cycle_gap_secs.unwrap_or(defaults.min_cycle_gap_secs),
            artist_batch_size: e.artist_batch_size.unwrap_or(defaults.artist_batch_size),
            artist_timeout_secs: e
                .artist_timeout_secs
                .unwrap_or(defaults.artist_timeout_secs),
            artist_concurrency: e
                .artist_concurrency
                .unwrap_or(defaults.artist_concurrency)
                .max(1),
            track_batch_size: e.track_batch_size.unwrap_or(defaults.track_batch_size),
            track_timeout_secs: e.track_timeout_secs.unwrap_or(defaults.track_timeout_secs),
            max_moods_per_track: e
                .max_moods_per_track
                .unwrap_or(defaults.max_moods_per_track),
            audio_batch_size: e.audio_batch_size.unwrap_or(defaults.audio_batch_size),
            audio_stale_secs: e.audio_stale_secs.unwrap_or(defaults.audio_stale_secs),
            audio_breaker_threshold: e
                .audio_breaker_threshold
                .unwrap_or(defaults.audio_breaker_threshold),
            vibe_enabled: e.vibe_enabled.unwrap_or(defaults.vibe_enabled),
            vibe_batch_size: e.vibe_batch_size.unwrap_or(defaults.vibe_batch_size),
            system_failure_threshold: e
                .system_failure_threshold
                .unwrap_or(defaults.system_failure_threshold),
        };

        Ok(Self {
            db_dir,
            similarity_api_key,
            metadata_user_agent,
            acquirer_url,
            acquirer_timeout_sec,
            discovery,
            enrichment,
        })
    }

    pub fn discovery_db_path(&self) -> PathBuf {
        self.db_dir.join("discovery.db")
    }

    pub fn enrichment_db_path(&self) -> PathBuf {
        self.db_dir.join("enrichment.db")
    }

    pub fn library_db_path(&self) -> PathBuf {
        self.db_dir.join("library.db")
    }
}
