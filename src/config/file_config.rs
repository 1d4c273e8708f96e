//! TOML file configuration.
//!
//! All fields are optional; values present in the file override CLI
//! arguments during [`super::AppConfig::resolve`].

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Top-level TOML configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub db_dir: Option<String>,
    pub similarity_api_key: Option<String>,
    pub metadata_user_agent: Option<String>,
    pub acquirer_url: Option<String>,
    pub acquirer_timeout_sec: Option<u64>,
    pub discovery: Option<DiscoveryConfig>,
    pub enrichment: Option<EnrichmentConfig>,
}

/// `[discovery]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    pub download_ratio: Option<f64>,
    pub import_grace_secs: Option<u64>,
    pub stuck_no_progress_mins: Option<i64>,
    pub stuck_some_progress_mins: Option<i64>,
    pub batch_max_age_hours: Option<i64>,
    pub exclusion_window_days: Option<i64>,
    pub anchor_ratio: Option<f64>,
    pub min_album_tracks: Option<u32>,
    pub recent_release_years: Option<i64>,
    pub top_albums_per_artist: Option<usize>,
    pub seed_artist_limit: Option<usize>,
    pub reconcile_lookback_days: Option<i64>,
    pub sweep_interval_secs: Option<u64>,
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnrichmentConfig {
    pub tick_secs: Option<u64>,
    pub min_cycle_gap_secs: Option<u64>,
    pub artist_batch_size: Option<usize>,
    pub artist_timeout_secs: Option<u64>,
    pub artist_concurrency: Option<usize>,
    pub track_batch_size: Option<usize>,
    pub track_timeout_secs: Option<u64>,
    pub max_moods_per_track: Option<usize>,
    pub audio_batch_size: Option<usize>,
    pub audio_stale_secs: Option<i64>,
    pub audio_breaker_threshold: Option<u32>,
    pub vibe_enabled: Option<bool>,
    pub vibe_batch_size: Option<usize>,
    pub system_failure_threshold: Option<u32>,
}

impl FileConfig {
    /// Load and parse a TOML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {:?}", path.as_ref()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_parses() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert!(config.db_dir.is_none());
        assert!(config.discovery.is_none());
    }

    #[test]
    fn test_full_sections_parse() {
        let config: FileConfig = toml::from_str(
            r#"
            db_dir = "/data/discofy"
            similarity_api_key = "abc123"

            [discovery]
            download_ratio = 1.5
            import_grace_secs = 30

            [enrichment]
            tick_secs = 15
            vibe_enabled = true
            "#,
        )
        .unwrap();

        assert_eq!(config.db_dir.as_deref(), Some("/data/discofy"));
        let discovery = config.discovery.unwrap();
        assert_eq!(discovery.download_ratio, Some(1.5));
        assert_eq!(discovery.import_grace_secs, Some(30));
        let enrichment = config.enrichment.unwrap();
        assert_eq!(enrichment.tick_secs, Some(15));
        assert_eq!(enrichment.vibe_enabled, Some(true));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<FileConfig, _> = toml::from_str::<FileConfig>("nonsense = 1");
        assert!(result.is_err());
    }
}
