//! Async work queue boundary.
//!
//! A single "enqueue async work" capability consumed by the orchestrator
//! (library scans) and the enrichment controller (audio/vibe analysis).
//! Fire-and-forget: completion is communicated back through store field
//! updates made by the external consumer.

use anyhow::Result;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::Mutex;

/// The queues the core submits work to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    LibraryScan,
    AudioAnalysis,
    VibeEmbedding,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::LibraryScan => "library_scan",
            QueueName::AudioAnalysis => "audio_analysis",
            QueueName::VibeEmbedding => "vibe_embedding",
        }
    }
}

/// Abstract enqueue capability implemented by the external queue.
pub trait WorkQueue: Send + Sync {
    fn enqueue(&self, queue: QueueName, payload: JsonValue) -> Result<()>;
}

/// In-process queue that records submissions.
///
/// Backs the binary when no external queue is wired up and doubles as a
/// test double: submissions can be drained and inspected.
#[derive(Default)]
pub struct InProcessWorkQueue {
    entries: Mutex<VecDeque<(QueueName, JsonValue)>>,
}

impl InProcessWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return all recorded submissions.
    pub fn drain(&self) -> Vec<(QueueName, JsonValue)> {
        self.entries.lock().unwrap().drain(..).collect()
    }

    /// Submissions for one queue, without draining.
    pub fn entries_for(&self, queue: QueueName) -> Vec<JsonValue> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(q, _)| *q == queue)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

impl WorkQueue for InProcessWorkQueue {
    fn enqueue(&self, queue: QueueName, payload: JsonValue) -> Result<()> {
        tracing::debug!("Enqueued {} job: {}", queue.as_str(), payload);
        self.entries.lock().unwrap().push_back((queue, payload));
        Ok(())
    }
}
