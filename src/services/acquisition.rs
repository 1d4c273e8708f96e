//! Acquisition service adapter.
//!
//! Contract for the external arr-style download manager that actually
//! fetches albums, plus an HTTP client implementation. The service is
//! concurrency-limited per its own deployment configuration - the
//! orchestrator fires requests freely and lets this boundary throttle.

use super::error::{ServiceError, ServiceResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A request to acquire one album.
#[derive(Debug, Clone, Serialize)]
pub struct AcquisitionRequest {
    /// Canonical album identifier.
    pub album_mbid: String,
    pub artist_name: String,
    pub album_name: String,
    /// Tag applied to artist entries created for this run, used later by
    /// the cleanup sweeps.
    pub tag: String,
}

/// Outcome of an acquisition attempt.
#[derive(Debug, Clone, Deserialize)]
pub struct AcquisitionOutcome {
    pub success: bool,
    /// Which indexer/source the release was grabbed from.
    pub source: Option<String>,
    /// Correlation id for the external download queue entry.
    pub correlation_id: Option<String>,
    pub error: Option<String>,
}

/// An artist entry known to the acquisition manager.
#[derive(Debug, Clone, Deserialize)]
pub struct ManagedArtist {
    pub id: String,
    pub name: String,
    /// Tags applied to the entry (discovery runs tag theirs).
    #[serde(default)]
    pub tags: Vec<String>,
    /// True if any album of this artist downloaded successfully.
    #[serde(default)]
    pub has_downloads: bool,
    /// True if the artist has liked/monitored albums outside discovery.
    #[serde(default)]
    pub has_liked_albums: bool,
}

/// An entry in the acquisition manager's download queue.
#[derive(Debug, Clone, Deserialize)]
pub struct AcquisitionQueueEntry {
    pub id: String,
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub stuck: bool,
}

/// External acquisition capability.
#[async_trait]
pub trait AcquisitionService: Send + Sync {
    async fn acquire_album(&self, request: &AcquisitionRequest)
        -> ServiceResult<AcquisitionOutcome>;

    /// Artist entries carrying the given tag.
    async fn list_tagged_artists(&self, tag: &str) -> ServiceResult<Vec<ManagedArtist>>;

    async fn remove_artist(&self, artist_id: &str) -> ServiceResult<()>;

    async fn list_queue_entries(&self) -> ServiceResult<Vec<AcquisitionQueueEntry>>;

    async fn remove_queue_entry(&self, entry_id: &str) -> ServiceResult<()>;
}

// =============================================================================
// HTTP client
// =============================================================================

/// HTTP client for the external acquisition manager.
#[derive(Clone)]
pub struct HttpAcquisitionClient {
    client: Client,
    base_url: String,
}

impl HttpAcquisitionClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(ServiceError::from_reqwest)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn check_status(response: reqwest::Response) -> ServiceResult<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::from_status(status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl AcquisitionService for HttpAcquisitionClient {
    async fn acquire_album(
        &self,
        request: &AcquisitionRequest,
    ) -> ServiceResult<AcquisitionOutcome> {
        let url = format!("{}/acquire/album", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(ServiceError::from_reqwest)?;
        let response = Self::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }

    async fn list_tagged_artists(&self, tag: &str) -> ServiceResult<Vec<ManagedArtist>> {
        let url = format!("{}/artists", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("tag", tag)])
            .send()
            .await
            .map_err(ServiceError::from_reqwest)?;
        let response = Self::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }

    async fn remove_artist(&self, artist_id: &str) -> ServiceResult<()> {
        let url = format!("{}/artists/{}", self.base_url, artist_id);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(ServiceError::from_reqwest)?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn list_queue_entries(&self) -> ServiceResult<Vec<AcquisitionQueueEntry>> {
        let url = format!("{}/queue", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ServiceError::from_reqwest)?;
        let response = Self::check_status(response).await?;

        response
            .json()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }

    async fn remove_queue_entry(&self, entry_id: &str) -> ServiceResult<()> {
        let url = format!("{}/queue/{}", self.base_url, entry_id);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(ServiceError::from_reqwest)?;
        Self::check_status(response).await?;
        Ok(())
    }
}
