//! Post-batch hygiene against the external acquisition manager.
//!
//! Both sweeps are best-effort: individual removal failures are logged
//! and skipped, never aborting the rest of the pass.

use super::orchestrator::DiscoveryOrchestrator;
use crate::discovery_store::DiscoveryBatch;
use std::collections::HashSet;
use tracing::{info, warn};

impl DiscoveryOrchestrator {
    /// Remove artist entries tagged for this batch that produced no
    /// successful downloads and aren't liked/active elsewhere.
    pub async fn cleanup_failed_artists(&self, batch: &DiscoveryBatch) {
        let tag = Self::discovery_tag(&batch.id);
        let artists = match self.acquisition.list_tagged_artists(&tag).await {
            Ok(artists) => artists,
            Err(e) => {
                warn!("Could not list tagged artists for cleanup: {}", e);
                return;
            }
        };

        let mut removed = 0;
        for artist in artists {
            if artist.has_downloads || artist.has_liked_albums {
                continue;
            }
            match self.acquisition.remove_artist(&artist.id).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!("Failed to remove artist '{}': {}", artist.name, e);
                }
            }
        }

        if removed > 0 {
            info!(
                "Cleanup removed {} failed discovery artists for batch {}",
                removed, batch.id
            );
        }
    }

    /// Remove stuck acquisition-queue entries matching this batch's
    /// external correlation ids.
    pub async fn cleanup_orphaned_queue(&self, batch: &DiscoveryBatch) {
        let refs: HashSet<String> = match self.store.get_jobs_for_batch(&batch.id) {
            Ok(jobs) => jobs.into_iter().filter_map(|j| j.external_ref).collect(),
            Err(e) => {
                warn!("Could not load jobs for queue cleanup: {}", e);
                return;
            }
        };
        if refs.is_empty() {
            return;
        }

        let entries = match self.acquisition.list_queue_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not list acquisition queue for cleanup: {}", e);
                return;
            }
        };

        let mut removed = 0;
        for entry in entries {
            let matches_batch = entry
                .correlation_id
                .as_ref()
                .is_some_and(|id| refs.contains(id));
            if !matches_batch || !entry.stuck {
                continue;
            }
            match self.acquisition.remove_queue_entry(&entry.id).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!("Failed to remove queue entry {}: {}", entry.id, e);
                }
            }
        }

        if removed > 0 {
            info!(
                "Cleanup removed {} orphaned queue entries for batch {}",
                removed, batch.id
            );
        }
    }
}
