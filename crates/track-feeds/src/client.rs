//! HTTP Feed Client
//!
//! Plain GET/JSON contracts against the feed backend. Any non-success status
//! is an error for that cycle only; the caller keeps its last good data.
//!
//! | Feed | Path | Default cadence |
//! |------|------|-----------------|
//! | Orbital elements | `/api/satellites` | 10 min |
//! | Civil flights | `/api/flights` | 30 s |
//! | Military flights | `/api/military` | 60 s |
//! | Earthquakes | `/api/earthquakes` | 5 min |
//! | Camera catalog | `/api/cctv` | 5 min |

use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

use crate::records::{FeedKind, FeedPayload, ResolvedStream};
use crate::scheduler::FeedSource;
use crate::{FeedError, Result};

const DEFAULT_FEED_BASE: &str = "http://127.0.0.1:3000";
const SNAPSHOT_PATH: &str = "/api/cctv/snapshot";
const STREAM_PATH: &str = "/api/webcams/stream";

/// Per-feed refresh cadence in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSchedule {
    pub orbital_elements_sec: u64,
    pub flights_sec: u64,
    pub military_sec: u64,
    pub earthquakes_sec: u64,
    pub cameras_sec: u64,
}

impl Default for FeedSchedule {
    fn default() -> Self {
        Self {
            orbital_elements_sec: 600,
            flights_sec: 30,
            military_sec: 60,
            earthquakes_sec: 300,
            cameras_sec: 300,
        }
    }
}

impl FeedSchedule {
    pub fn cadence(&self, kind: FeedKind) -> Duration {
        let secs = match kind {
            FeedKind::OrbitalElements => self.orbital_elements_sec,
            FeedKind::Flights => self.flights_sec,
            FeedKind::MilitaryFlights => self.military_sec,
            FeedKind::Earthquakes => self.earthquakes_sec,
            FeedKind::Cameras => self.cameras_sec,
        };
        Duration::from_secs(secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_sec: u64,
    pub schedule: FeedSchedule,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_FEED_BASE.to_string(),
            timeout_sec: 10,
            schedule: FeedSchedule::default(),
        }
    }
}

impl FeedConfig {
    /// Defaults overridden by `WORLDVIEW_FEED_BASE` and `WORLDVIEW_FEED_TIMEOUT_SEC`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base) = std::env::var("WORLDVIEW_FEED_BASE") {
            config.base_url = base;
        }
        if let Some(timeout) = std::env::var("WORLDVIEW_FEED_TIMEOUT_SEC")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.timeout_sec = timeout;
        }

        config
    }
}

/// Feed backend client
#[derive(Clone)]
pub struct FeedClient {
    base: Url,
    client: reqwest::Client,
}

impl FeedClient {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let base = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| FeedError::InvalidConfig(format!("{}: {}", config.base_url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_sec))
            .build()
            .map_err(|e| FeedError::InvalidConfig(e.to_string()))?;

        Ok(Self { base, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| FeedError::InvalidConfig(format!("{}: {}", path, e)))
    }

    async fn get_bytes(&self, url: Url, feed: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FeedError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FeedError::Status {
                feed: feed.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FeedError::RequestFailed(e.to_string()))?;
        Ok(body.to_vec())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, feed: &str) -> Result<T> {
        let body = self.get_bytes(url, feed).await?;
        serde_json::from_slice(&body).map_err(|e| FeedError::Decode {
            feed: feed.to_string(),
            reason: e.to_string(),
        })
    }

    async fn get_records<T: DeserializeOwned>(&self, url: Url, feed: &str) -> Result<Vec<T>> {
        let body = self.get_bytes(url, feed).await?;
        decode_records(&body, feed)
    }

    /// Fetch one feed's full record set.
    pub async fn fetch_feed(&self, kind: FeedKind) -> Result<FeedPayload> {
        let url = self.endpoint(kind.path())?;
        let feed = kind.as_str();

        let payload = match kind {
            FeedKind::OrbitalElements => FeedPayload::OrbitalElements(self.get_records(url, feed).await?),
            FeedKind::Flights => FeedPayload::Flights(self.get_records(url, feed).await?),
            FeedKind::MilitaryFlights => FeedPayload::MilitaryFlights(self.get_records(url, feed).await?),
            FeedKind::Earthquakes => FeedPayload::Earthquakes(self.get_records(url, feed).await?),
            FeedKind::Cameras => FeedPayload::Cameras(self.get_records(url, feed).await?),
        };

        debug!(feed, records = payload.len(), "feed fetched");
        Ok(payload)
    }

    /// Proxy URL returning snapshot image bytes for a camera source URL.
    pub fn snapshot_url(&self, source_url: &str) -> Result<Url> {
        let mut url = self.endpoint(SNAPSHOT_PATH)?;
        url.query_pairs_mut().append_pair("url", source_url);
        Ok(url)
    }

    pub async fn fetch_snapshot(&self, source_url: &str) -> Result<Vec<u8>> {
        let url = self.snapshot_url(source_url)?;
        self.get_bytes(url, "camera_snapshot").await
    }

    /// Resolve a deferred live-stream URL from a catalog slug.
    pub async fn resolve_stream(&self, slug: &str) -> Result<ResolvedStream> {
        let mut url = self.endpoint(STREAM_PATH)?;
        url.query_pairs_mut().append_pair("slug", slug);

        let stream: ResolvedStream = self.get_json(url, "camera_stream").await?;
        if stream.url.is_empty() {
            return Err(FeedError::EmptyStream(slug.to_string()));
        }
        Ok(stream)
    }
}

/// Decode a feed body that must be a JSON array. Records that fail to decode
/// are dropped individually; the rest of the batch stands.
pub fn decode_records<T: DeserializeOwned>(body: &[u8], feed: &str) -> Result<Vec<T>> {
    let values: Vec<serde_json::Value> = serde_json::from_slice(body).map_err(|e| FeedError::Decode {
        feed: feed.to_string(),
        reason: e.to_string(),
    })?;

    let total = values.len();
    let records: Vec<T> = values
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(feed, index, "dropping malformed record: {}", e);
                None
            }
        })
        .collect();

    let dropped = total - records.len();
    if dropped > 0 {
        info!(feed, decoded = records.len(), dropped, "feed batch ingested with malformed records");
    }
    Ok(records)
}

impl FeedSource for FeedClient {
    fn fetch(&self, kind: FeedKind) -> impl Future<Output = Result<FeedPayload>> + Send {
        self.fetch_feed(kind)
    }
}
