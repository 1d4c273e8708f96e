//! Similarity service adapter.
//!
//! Contract for the external scrobbler-style similarity source plus an
//! HTTP client implementation. Rate limited to 5 requests per second per
//! upstream API guidelines; response shapes are parsed and validated here
//! at the boundary, never deeper in.

use super::error::{ServiceError, ServiceResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(200); // 5 req/sec

/// A similar artist with its match score in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarArtist {
    pub name: String,
    pub mbid: Option<String>,
    pub match_score: f64,
}

/// One of an artist's top albums.
#[derive(Debug, Clone, PartialEq)]
pub struct TopAlbum {
    pub name: String,
    pub playcount: Option<u64>,
}

/// An album surfaced through tag/genre exploration.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedAlbum {
    pub name: String,
    pub artist: String,
}

/// External similarity lookup capability.
///
/// Must be treated as rate-limited and unreliable: callers wrap these in
/// [`super::retry::retry_with_backoff`] and degrade exhausted retries to
/// "skip this candidate".
#[async_trait]
pub trait SimilarityService: Send + Sync {
    async fn get_similar_artists(
        &self,
        mbid: Option<&str>,
        name: &str,
        limit: usize,
    ) -> ServiceResult<Vec<SimilarArtist>>;

    async fn get_artist_top_albums(
        &self,
        mbid: Option<&str>,
        name: &str,
        limit: usize,
    ) -> ServiceResult<Vec<TopAlbum>>;

    async fn get_top_albums_by_tag(
        &self,
        tag: &str,
        limit: usize,
    ) -> ServiceResult<Vec<TaggedAlbum>>;

    /// Top tags attached to a track, most relevant first.
    async fn get_track_tags(&self, artist: &str, title: &str) -> ServiceResult<Vec<String>>;
}

// =============================================================================
// HTTP client
// =============================================================================

#[derive(Deserialize)]
struct SimilarArtistsResponse {
    similarartists: Option<SimilarArtistsContainer>,
}

#[derive(Deserialize)]
struct SimilarArtistsContainer {
    artist: Option<Vec<WireArtist>>,
}

#[derive(Deserialize)]
struct WireArtist {
    name: Option<String>,
    mbid: Option<String>,
    #[serde(rename = "match")]
    match_score: Option<String>,
}

#[derive(Deserialize)]
struct TopAlbumsResponse {
    topalbums: Option<TopAlbumsContainer>,
}

#[derive(Deserialize)]
struct TopAlbumsContainer {
    album: Option<Vec<WireAlbum>>,
}

#[derive(Deserialize)]
struct WireAlbum {
    name: Option<String>,
    playcount: Option<u64>,
    artist: Option<WireAlbumArtist>,
}

#[derive(Deserialize)]
struct WireAlbumArtist {
    name: Option<String>,
}

#[derive(Deserialize)]
struct TagAlbumsResponse {
    albums: Option<TagAlbumsContainer>,
}

#[derive(Deserialize)]
struct TagAlbumsContainer {
    album: Option<Vec<WireAlbum>>,
}

#[derive(Deserialize)]
struct TrackInfoResponse {
    track: Option<WireTrack>,
}

#[derive(Deserialize)]
struct WireTrack {
    toptags: Option<WireTopTags>,
}

#[derive(Deserialize)]
struct WireTopTags {
    tag: Option<Vec<WireTag>>,
}

#[derive(Deserialize)]
struct WireTag {
    name: Option<String>,
}

/// Audioscrobbler-style HTTP similarity client.
pub struct AudioScrobblerClient {
    client: Client,
    base_url: String,
    api_key: String,
    last_request: Mutex<Instant>,
}

impl AudioScrobblerClient {
    pub fn new(base_url: &str, api_key: &str) -> ServiceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ServiceError::from_reqwest)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
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

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        params: &[(&str, &str)],
    ) -> ServiceResult<T> {
        self.rate_limit().await;

        let mut query: Vec<(&str, &str)> = vec![("api_key", &self.api_key), ("format", "json")];
        query.extend_from_slice(params);

        let response = self
            .client
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(ServiceError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::from_status(status.as_u16()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }

    fn artist_params<'a>(mbid: Option<&'a str>, name: &'a str) -> (&'static str, &'a str) {
        // Prefer the stable id when the caller has one.
        match mbid {
            Some(mbid) => ("mbid", mbid),
            None => ("artist", name),
        }
    }
}

#[async_trait]
impl SimilarityService for AudioScrobblerClient {
    async fn get_similar_artists(
        &self,
        mbid: Option<&str>,
        name: &str,
        limit: usize,
    ) -> ServiceResult<Vec<SimilarArtist>> {
        let limit = limit.to_string();
        let (key, value) = Self::artist_params(mbid, name);
        let body: SimilarArtistsResponse = self
            .get_json(&[
                ("method", "artist.getsimilar"),
                (key, value),
                ("limit", &limit),
            ])
            .await?;

        let artists = body
            .similarartists
            .and_then(|sa| sa.artist)
            .unwrap_or_default();

        Ok(artists
            .into_iter()
            .filter_map(|a| {
                let name = a.name?;
                let match_score = a
                    .match_score
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0.0);
                let mbid = a.mbid.filter(|m| !m.is_empty());
                Some(SimilarArtist {
                    name,
                    mbid,
                    match_score,
                })
            })
            .collect())
    }

    async fn get_artist_top_albums(
        &self,
        mbid: Option<&str>,
        name: &str,
        limit: usize,
    ) -> ServiceResult<Vec<TopAlbum>> {
        let limit = limit.to_string();
        let (key, value) = Self::artist_params(mbid, name);
        let body: TopAlbumsResponse = self
            .get_json(&[
                ("method", "artist.gettopalbums"),
                (key, value),
                ("limit", &limit),
            ])
            .await?;

        let albums = body.topalbums.and_then(|ta| ta.album).unwrap_or_default();

        Ok(albums
            .into_iter()
            .filter_map(|a| {
                Some(TopAlbum {
                    name: a.name?,
                    playcount: a.playcount,
                })
            })
            .collect())
    }

    async fn get_top_albums_by_tag(
        &self,
        tag: &str,
        limit: usize,
    ) -> ServiceResult<Vec<TaggedAlbum>> {
        let limit = limit.to_string();
        let body: TagAlbumsResponse = self
            .get_json(&[
                ("method", "tag.gettopalbums"),
                ("tag", tag),
                ("limit", &limit),
            ])
            .await?;

        let albums = body.albums.and_then(|a| a.album).unwrap_or_default();

        Ok(albums
            .into_iter()
            .filter_map(|a| {
                Some(TaggedAlbum {
                    name: a.name?,
                    artist: a.artist?.name?,
                })
            })
            .collect())
    }

    async fn get_track_tags(&self, artist: &str, title: &str) -> ServiceResult<Vec<String>> {
        let body: TrackInfoResponse = self
            .get_json(&[
                ("method", "track.getInfo"),
                ("artist", artist),
                ("track", title),
            ])
            .await?;

        let tags = body
            .track
            .and_then(|t| t.toptags)
            .and_then(|tt| tt.tag)
            .unwrap_or_default();

        Ok(tags.into_iter().filter_map(|t| t.name).collect())
    }
}
