//! HTTP client for the Wildflower position and station endpoints
//!
//! # Example
//!
//! ```no_run
//! use wfradio::PositionClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = PositionClient::new()?;
//!
//!     for (station, track) in client.fetch_all().await? {
//!         println!("{}: {}", station, track.status_line());
//!     }
//!
//!     Ok(())
//! }
//! ```

use crate::constants::{
    DEFAULT_BASE_URL, DEFAULT_POSITIONS_PATH, DEFAULT_STATIONS_PATH, DEFAULT_TIMEOUT_SECS,
    USER_AGENT,
};
use crate::error::{Error, Result};
use crate::models::{
    merge_availability, normalize_snapshots, SnapshotMap, StationInfo, StationListing, WireStation,
};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Anything able to produce the snapshots of every station
///
/// The worker only depends on this trait, so it can be fed from another
/// transport or a scripted source in tests.
#[async_trait]
pub trait PositionSource: Send + Sync {
    async fn fetch_all(&self) -> Result<SnapshotMap>;
}

/// Client for the position and station endpoints
///
/// Stateless: every call is one GET, nothing is cached here. The station
/// directory cache lives in the configuration extension.
#[derive(Debug, Clone)]
pub struct PositionClient {
    client: Client,
    base_url: String,
    positions_path: String,
    stations_path: String,
    timeout: Duration,
}

impl PositionClient {
    /// Create a client with default settings
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http_client(&self) -> &Client {
        &self.client
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{}/{}", base, path))?)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        tracing::trace!("GET {}", url);

        let response = self.client.get(url).timeout(self.timeout).send().await?;

        if !response.status().is_success() {
            return Err(Error::ApiError(format!(
                "API returned status: {}",
                response.status()
            )));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Fetch the snapshot of every station in one request
    ///
    /// Entries that do not describe a playable segment are dropped.
    pub async fn fetch_all(&self) -> Result<SnapshotMap> {
        let raw: HashMap<String, WireStation> = self.get_json(&self.positions_path).await?;
        let count = raw.len();
        let snapshots = normalize_snapshots(raw);
        tracing::debug!(
            stations = snapshots.len(),
            dropped = count - snapshots.len(),
            "Fetched station positions"
        );
        Ok(snapshots)
    }

    /// Fetch the station directory
    pub async fn fetch_stations(&self) -> Result<Vec<StationInfo>> {
        self.get_json(&self.stations_path).await
    }

    /// Station directory with live availability
    ///
    /// A station is available when the position endpoint currently reports it.
    pub async fn station_directory(&self) -> Result<Vec<StationListing>> {
        let (stations, snapshots) = tokio::try_join!(self.fetch_stations(), self.fetch_all())?;
        Ok(merge_availability(stations, &snapshots))
    }
}

#[async_trait]
impl PositionSource for PositionClient {
    async fn fetch_all(&self) -> Result<SnapshotMap> {
        PositionClient::fetch_all(self).await
    }
}

/// Builder for configuring a PositionClient
#[derive(Debug)]
pub struct ClientBuilder {
    client: Option<Client>,
    base_url: String,
    positions_path: String,
    stations_path: String,
    timeout: Duration,
    user_agent: String,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            client: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            positions_path: DEFAULT_POSITIONS_PATH.to_string(),
            stations_path: DEFAULT_STATIONS_PATH.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing HTTP client (shared pool, proxy...)
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn positions_path(mut self, path: impl Into<String>) -> Self {
        self.positions_path = path.into();
        self
    }

    pub fn stations_path(mut self, path: impl Into<String>) -> Self {
        self.stations_path = path.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> Result<PositionClient> {
        // Fail early on a malformed base URL rather than on the first poll
        Url::parse(&self.base_url)?;

        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .user_agent(&self.user_agent)
                .timeout(self.timeout)
                .build()?,
        };

        Ok(PositionClient {
            client,
            base_url: self.base_url,
            positions_path: self.positions_path,
            stations_path: self.stations_path,
            timeout: self.timeout,
        })
    }
}
