//! Notification and cache-invalidation trigger points.
//!
//! Delivery itself (push, email, websocket) is external; the core only
//! needs somewhere to fire its one-shot and per-cycle signals.

/// Operator/user notification capability.
pub trait Notifier: Send + Sync {
    /// Fired exactly once when enrichment reaches full completion.
    fn notify_enrichment_complete(&self, artists_enriched: u32, tracks_tagged: u32);

    /// Aggregated per-cycle failure notification (only when nonzero).
    fn notify_enrichment_failures(&self, failure_count: u32);
}

/// Cache invalidation trigger capability (mix/recommendation caches).
pub trait CacheInvalidator: Send + Sync {
    fn invalidate_mix_caches(&self);
}

/// Default implementation that routes everything to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_enrichment_complete(&self, artists_enriched: u32, tracks_tagged: u32) {
        tracing::info!(
            "Enrichment complete: {} artists enriched, {} tracks tagged",
            artists_enriched,
            tracks_tagged
        );
    }

    fn notify_enrichment_failures(&self, failure_count: u32) {
        tracing::warn!("Enrichment cycle recorded {} failures", failure_count);
    }
}

impl CacheInvalidator for LogNotifier {
    fn invalidate_mix_caches(&self) {
        tracing::info!("Invalidating mix/recommendation caches");
    }
}
