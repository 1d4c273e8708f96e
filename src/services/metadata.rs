//! Canonical metadata resolver adapter.
//!
//! Resolves album names to stable external identifiers and fetches release
//! details (type, track count, date). The HTTP implementation talks to a
//! MusicBrainz-style API, rate limited to ~1 request per second per that
//! API's policy.

use super::error::{ServiceError, ServiceResult};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(1100); // slightly over 1s for safety

/// A resolved album reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumRef {
    /// Canonical external identifier.
    pub id: String,
    pub title: String,
    pub artist: String,
}

/// Release-level details for studio-album filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct AlbumDetails {
    pub id: String,
    /// e.g. "Album", "EP", "Single".
    pub primary_type: Option<String>,
    /// e.g. "Compilation", "Live", "Soundtrack".
    pub secondary_types: Vec<String>,
    pub track_count: u32,
    pub release_date: Option<NaiveDate>,
}

impl AlbumDetails {
    /// A studio album has primary type "Album" and no secondary types.
    pub fn is_studio_album(&self) -> bool {
        self.primary_type.as_deref() == Some("Album") && self.secondary_types.is_empty()
    }
}

/// Canonical metadata resolution capability.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Find the canonical id for an album. `Ok(None)` means no match -
    /// a filter condition, not an error.
    async fn search_album(&self, title: &str, artist: &str) -> ServiceResult<Option<AlbumRef>>;

    async fn get_album_details(&self, id: &str) -> ServiceResult<Option<AlbumDetails>>;
}

// =============================================================================
// HTTP client
// =============================================================================

#[derive(Deserialize)]
struct ReleaseGroupSearchResponse {
    #[serde(rename = "release-groups", default)]
    release_groups: Vec<WireReleaseGroup>,
}

#[derive(Deserialize)]
struct WireReleaseGroup {
    id: String,
    title: Option<String>,
    #[serde(rename = "primary-type")]
    primary_type: Option<String>,
    #[serde(rename = "secondary-types", default)]
    secondary_types: Vec<String>,
    #[serde(rename = "first-release-date")]
    first_release_date: Option<String>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<WireArtistCredit>,
    #[serde(default)]
    releases: Vec<WireRelease>,
}

#[derive(Deserialize)]
struct WireArtistCredit {
    name: Option<String>,
}

#[derive(Deserialize)]
struct WireRelease {
    #[serde(rename = "track-count")]
    track_count: Option<u32>,
}

/// MusicBrainz-style HTTP resolver.
pub struct MusicBrainzResolver {
    client: Client,
    base_url: String,
    last_request: Mutex<Instant>,
}

impl MusicBrainzResolver {
    pub fn new(base_url: &str, user_agent: &str) -> ServiceResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ServiceError::from_reqwest)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            last_request: Mutex::new(Instant::now() - RATE_LIMIT_INTERVAL),
        })
    }

    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        let elapsed = last.elapsed();
        if elapsed < RATE_LIMIT_INTERVAL {
            tokio::time::sleep(RATE_LIMIT_INTERVAL - elapsed).await;
        }
        *last = Instant::now();
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> ServiceResult<T> {
        self.rate_limit().await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ServiceError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            // MusicBrainz signals throttling with 503.
            if status.as_u16() == 503 {
                return Err(ServiceError::RateLimited);
            }
            return Err(ServiceError::from_status(status.as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }

    fn parse_release_date(raw: Option<&str>) -> Option<NaiveDate> {
        let raw = raw?;
        // Dates come back as YYYY, YYYY-MM or YYYY-MM-DD.
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d").ok()
            })
            .or_else(|| {
                NaiveDate::parse_from_str(&format!("{}-01-01", raw), "%Y-%m-%d").ok()
            })
    }

    fn group_to_details(group: WireReleaseGroup) -> AlbumDetails {
        let track_count = group
            .releases
            .iter()
            .filter_map(|r| r.track_count)
            .max()
            .unwrap_or(0);
        AlbumDetails {
            id: group.id,
            primary_type: group.primary_type,
            secondary_types: group.secondary_types,
            track_count,
            release_date: Self::parse_release_date(group.first_release_date.as_deref()),
        }
    }
}

#[async_trait]
impl MetadataResolver for MusicBrainzResolver {
    async fn search_album(&self, title: &str, artist: &str) -> ServiceResult<Option<AlbumRef>> {
        let query = format!("releasegroup:\"{}\" AND artist:\"{}\"", title, artist);
        let url = format!(
            "{}/release-group/?query={}&fmt=json&limit=1",
            self.base_url,
            urlencoding::encode(&query)
        );

        let body: ReleaseGroupSearchResponse = self.get_json(&url).await?;

        Ok(body.release_groups.into_iter().next().map(|group| {
            let artist = group
                .artist_credit
                .first()
                .and_then(|c| c.name.clone())
                .unwrap_or_else(|| artist.to_string());
            AlbumRef {
                id: group.id,
                title: group.title.unwrap_or_else(|| title.to_string()),
                artist,
            }
        }))
    }

    async fn get_album_details(&self, id: &str) -> ServiceResult<Option<AlbumDetails>> {
        let url = format!(
            "{}/release-group/{}?inc=releases&fmt=json",
            self.base_url, id
        );

        match self.get_json::<WireReleaseGroup>(&url).await {
            Ok(group) => Ok(Some(Self::group_to_details(group))),
            Err(ServiceError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
