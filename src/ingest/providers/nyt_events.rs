// src/ingest/providers/nyt_events.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::config::CacheConfig;
use crate::error::FetchError;
use crate::ingest::types::{ListingsPage, ListingsSource};

pub const DEFAULT_ENDPOINT: &str = "http://api.nytimes.com/svc/events/v2/listings.json";

/// Fixed search shape sent with every page request.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingsQuery {
    pub center_lat: f64,
    pub center_lng: f64,
    /// meters
    pub radius_m: u64,
    pub sort: String,
}

impl Default for ListingsQuery {
    fn default() -> Self {
        // central park, whole-world radius
        Self {
            center_lat: 40.767927,
            center_lng: -73.980047,
            radius_m: (1 << 31) - 1,
            sort: "geocode_latitude asc".to_string(),
        }
    }
}

pub struct NytEventsSource {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    query: ListingsQuery,
    timeout: Duration,
}

impl NytEventsSource {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, query: ListingsQuery) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            query,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(cfg: &CacheConfig) -> Self {
        Self::new(cfg.endpoint.clone(), cfg.api_key.clone(), cfg.query()).with_timeout(cfg.request_timeout())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full request URL for one page.
    pub fn page_url(&self, offset: usize, limit: usize) -> Result<Url, url::ParseError> {
        let ll = format!("{},{}", self.query.center_lat, self.query.center_lng);
        Url::parse_with_params(
            &self.endpoint,
            &[
                ("api-key", self.api_key.as_str()),
                ("ll", ll.as_str()),
                ("radius", self.query.radius_m.to_string().as_str()),
                ("sort", self.query.sort.as_str()),
                ("limit", limit.to_string().as_str()),
                ("offset", offset.to_string().as_str()),
            ],
        )
    }
}

#[async_trait]
impl ListingsSource for NytEventsSource {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<ListingsPage, FetchError> {
        let url = self.page_url(offset, limit).map_err(|e| FetchError::Decode {
            offset,
            message: format!("bad endpoint url: {e}"),
        })?;
        tracing::debug!(target: "ingest", endpoint = %self.endpoint, offset, limit, "GET listings page");

        let resp = self.client.get(url).timeout(self.timeout).send().await?;
        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(target: "ingest", %status, offset, "listings page http error");
            return Err(FetchError::Status {
                status: status.as_u16(),
                offset,
            });
        }

        let body = resp.bytes().await?;
        serde_json::from_slice::<ListingsPage>(&body).map_err(|e| FetchError::Decode {
            offset,
            message: e.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "NYT Events"
    }
}
