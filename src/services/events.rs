//! Typed discovery event topics.
//!
//! The orchestrator's only externally observable real-time signal. Each
//! topic carries a fixed payload schema so consumers are statically
//! verified - there is no stringly-typed event bus.

use crate::discovery_store::BatchStatus;
use serde::Serialize;
use tokio::sync::broadcast;

/// Progress snapshot carried by every discovery event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchProgress {
    pub batch_id: String,
    pub status: BatchStatus,
    pub completed: u32,
    pub failed: u32,
    pub total: u32,
    /// Terminal fraction in [0, 100].
    pub progress: u8,
}

/// A discovery lifecycle event for one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscoveryEvent {
    Progress {
        user_id: String,
        #[serde(flatten)]
        progress: BatchProgress,
    },
    Complete {
        user_id: String,
        #[serde(flatten)]
        progress: BatchProgress,
        error_message: Option<String>,
    },
}

impl DiscoveryEvent {
    pub fn batch_id(&self) -> &str {
        match self {
            DiscoveryEvent::Progress { progress, .. } => &progress.batch_id,
            DiscoveryEvent::Complete { progress, .. } => &progress.batch_id,
        }
    }
}

/// Event emission capability.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DiscoveryEvent);
}

/// Broadcast-channel sink; consumers subscribe for live updates.
pub struct BroadcastEventSink {
    sender: broadcast::Sender<DiscoveryEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastEventSink {
    fn emit(&self, event: DiscoveryEvent) {
        // A send error just means nobody is listening right now.
        let _ = self.sender.send(event);
    }
}

/// Sink that drops everything (for contexts with no observers).
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: DiscoveryEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress() -> BatchProgress {
        BatchProgress {
            batch_id: "b1".to_string(),
            status: BatchStatus::Downloading,
            completed: 2,
            failed: 1,
            total: 5,
            progress: 60,
        }
    }

    #[tokio::test]
    async fn test_broadcast_delivery() {
        let sink = BroadcastEventSink::new(8);
        let mut receiver = sink.subscribe();

        sink.emit(DiscoveryEvent::Progress {
            user_id: "u1".to_string(),
            progress: progress(),
        });

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.batch_id(), "b1");
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let sink = BroadcastEventSink::new(8);
        sink.emit(DiscoveryEvent::Complete {
            user_id: "u1".to_string(),
            progress: progress(),
            error_message: None,
        });
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = DiscoveryEvent::Progress {
            user_id: "u1".to_string(),
            progress: progress(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["batch_id"], "b1");
        assert_eq!(json["status"], "DOWNLOADING");
        assert_eq!(json["progress"], 60);
    }
}
