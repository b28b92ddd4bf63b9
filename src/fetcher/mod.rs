//! Occurrence API fetching.
//!
//! The occurrence service answers with JSONP; bodies are unwrapped and parsed
//! into a [`FacetPayload`]. Sources sit behind [`OccurrenceSource`] so the
//! pipeline does not care where payloads come from.

mod jsonp;

pub use jsonp::unwrap_jsonp;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::{ReportError, Result};
use crate::models::FacetPayload;
use crate::query::OccurrenceQuery;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent sent unless a custom one is configured.
pub const USER_AGENT: &str = concat!(
    "nonnative/",
    env!("CARGO_PKG_VERSION"),
    " (species occurrence report)"
);

/// Anything that can answer an occurrence query.
#[async_trait]
pub trait OccurrenceSource: Send + Sync {
    /// Fetch and parse the payload for a query.
    async fn fetch(&self, query: &OccurrenceQuery) -> Result<FacetPayload>;
}

/// HTTP fetcher for the occurrence API.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with the default user agent.
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_user_agent(timeout, None)
    }

    /// Create a fetcher sending `user_agent`, or [`USER_AGENT`] when none or a
    /// blank one is given.
    pub fn with_user_agent(timeout: Duration, user_agent: Option<&str>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(effective_user_agent(user_agent))
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self { client })
    }

    /// GET a URL and return the body text, treating non-success statuses as failures.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let start = Instant::now();
        let response = self.client.get(url).send().await.map_err(|e| {
            warn!("Request failed: {} - {}", e, url);
            ReportError::from(e)
        })?;

        let status = response.status();
        debug!(
            "HTTP {} in {}ms - {}",
            status.as_u16(),
            start.elapsed().as_millis(),
            url
        );

        if !status.is_success() {
            warn!("Occurrence API returned HTTP {} - {}", status.as_u16(), url);
            return Err(ReportError::NetworkFailure(format!(
                "HTTP {} from {}",
                status.as_u16(),
                url
            )));
        }

        Ok(response.text().await?)
    }
}

fn effective_user_agent(configured: Option<&str>) -> &str {
    configured
        .map(str::trim)
        .filter(|ua| !ua.is_empty())
        .unwrap_or(USER_AGENT)
}

#[async_trait]
impl OccurrenceSource for HttpFetcher {
    async fn fetch(&self, query: &OccurrenceQuery) -> Result<FacetPayload> {
        debug!("Fetching {:?} occurrences: {}", query.scope, query.url);
        let body = self.get_text(&query.url).await?;
        let json = unwrap_jsonp(&body, Some(&query.callback))?;
        FacetPayload::parse(json)
    }
}
