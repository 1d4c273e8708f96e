use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use discofy_server::config::{self, AppConfig};
use discofy_server::discovery::DiscoveryOrchestrator;
use discofy_server::enrichment::EnrichmentController;
use discofy_server::recommend::RecommendationEngine;
use discofy_server::services::{
    AudioScrobblerClient, BroadcastEventSink, HttpAcquisitionClient, InProcessWorkQueue,
    LogNotifier, MusicBrainzResolver,
};
use discofy_server::{SqliteDiscoveryStore, SqliteEnrichmentStore, SqliteLibraryStore};

const SIMILARITY_API_BASE: &str = "https://ws.audioscrobbler.com/2.0/";
const METADATA_API_BASE: &str = "https://musicbrainz.org/ws/2";

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Directory containing database files (discovery.db, enrichment.db, library.db).
    /// Can also be specified in config file.
    #[clap(long, value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// API key for the similarity service.
    #[clap(long)]
    pub similarity_api_key: Option<String>,

    /// User agent for canonical metadata resolver requests.
    #[clap(long)]
    pub metadata_user_agent: Option<String>,

    /// URL of the external acquisition manager. Discovery batch generation
    /// is disabled when unset.
    #[clap(long)]
    pub acquirer_url: Option<String>,

    /// Timeout in seconds for acquisition manager requests.
    #[clap(long, default_value_t = 300)]
    pub acquirer_timeout_sec: u64,
}

impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            similarity_api_key: args.similarity_api_key.clone(),
            metadata_user_agent: args.metadata_user_agent.clone(),
            acquirer_url: args.acquirer_url.clone(),
            acquirer_timeout_sec: args.acquirer_timeout_sec,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();
    info!(
        "Starting discofy-server {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH")
    );

    let file_config = match &args.config {
        Some(path) => Some(config::FileConfig::load(path)?),
        None => None,
    };
    let app_config = AppConfig::resolve(&(&args).into(), file_config)?;

    let Some(api_key) = app_config.similarity_api_key.clone() else {
        bail!("similarity_api_key must be set via --similarity-api-key or config file");
    };

    // Stores
    let discovery_store = Arc::new(SqliteDiscoveryStore::new(app_config.discovery_db_path())?);
    let enrichment_store = Arc::new(SqliteEnrichmentStore::new(app_config.enrichment_db_path())?);
    let library_store = Arc::new(SqliteLibraryStore::new(app_config.library_db_path())?);

    // External adapters
    let similarity = Arc::new(
        AudioScrobblerClient::new(SIMILARITY_API_BASE, &api_key)
            .map_err(|e| anyhow::anyhow!("similarity client: {}", e))?,
    );
    let resolver = Arc::new(
        MusicBrainzResolver::new(METADATA_API_BASE, &app_config.metadata_user_agent)
            .map_err(|e| anyhow::anyhow!("metadata resolver: {}", e))?,
    );
    let work_queue = Arc::new(InProcessWorkQueue::new());
    let events = Arc::new(BroadcastEventSink::new(256));
    let notifier = Arc::new(LogNotifier);

    let shutdown = CancellationToken::new();
    let mut tasks = Vec::new();

    // Enrichment cycle controller
    let controller = Arc::new(EnrichmentController::new(
        enrichment_store,
        similarity.clone(),
        work_queue.clone(),
        notifier.clone(),
        notifier.clone(),
        app_config.enrichment.clone(),
    ));
    {
        let controller = controller.clone();
        let shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            controller.run(shutdown).await;
        }));
    }

    // Discovery orchestrator + sweeps (needs the acquisition manager)
    match &app_config.acquirer_url {
        Some(url) => {
            let acquisition = Arc::new(
                HttpAcquisitionClient::new(url, app_config.acquirer_timeout_sec)
                    .map_err(|e| anyhow::anyhow!("acquisition client: {}", e))?,
            );
            let engine = Arc::new(RecommendationEngine::new(
                similarity,
                resolver,
                library_store.clone(),
                discovery_store.clone(),
                app_config.discovery.clone(),
            ));
            let orchestrator = Arc::new(DiscoveryOrchestrator::new(
                discovery_store,
                library_store,
                engine,
                acquisition,
                work_queue,
                events,
                app_config.discovery.clone(),
            ));

            let sweep_interval = Duration::from_secs(app_config.discovery.sweep_interval_secs);
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(sweep_interval);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if let Err(e) = orchestrator.check_stuck_batches().await {
                                error!("Stuck-batch sweep failed: {:#}", e);
                            }
                            if let Err(e) = orchestrator.reconcile_discovery_tracks().await {
                                error!("Discovery reconcile sweep failed: {:#}", e);
                            }
                        }
                        _ = shutdown.cancelled() => break,
                    }
                }
            }));
        }
        None => {
            warn!("No acquirer_url configured; discovery batch generation is disabled");
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    shutdown.cancel();

    for task in tasks {
        if let Err(e) = task.await {
            error!("Task terminated abnormally: {}", e);
        }
    }

    info!("discofy-server stopped");
    Ok(())
}
