//! Conditional retrieval of external calendar feeds.

use async_trait::async_trait;
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::StatusCode;
use tracing::debug;

use crate::error::{CalFeedError, CalFeedResult};

/// Result of one conditional fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The server confirmed the cached copy is current.
    NotModified,
    Fetched {
        body: String,
        etag: Option<String>,
        last_modified: Option<String>,
    },
}

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch `url`, sending the prior validators as conditional-request
    /// headers when present.
    async fn fetch(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> CalFeedResult<FetchOutcome>;
}

/// HTTP implementation backed by reqwest.
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

impl HttpFeedFetcher {
    pub fn new() -> CalFeedResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS))
            .user_agent(concat!("calfeed/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CalFeedError::Config(format!("could not build HTTP client: {e}")))?;
        Ok(HttpFeedFetcher { client })
    }
}

/// Subscription URLs are often published with the `webcal://` scheme; they
/// are plain HTTPS underneath.
fn normalize_feed_url(url: &str) -> CalFeedResult<url::Url> {
    let rewritten = if let Some(rest) = url.strip_prefix("webcal://") {
        format!("https://{rest}")
    } else {
        url.to_string()
    };
    url::Url::parse(&rewritten)
        .map_err(|e| CalFeedError::FeedUnreachable(format!("invalid feed URL '{url}': {e}")))
}

fn header_value(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> CalFeedResult<FetchOutcome> {
        let url = normalize_feed_url(url)?;

        let mut request = self.client.get(url.clone());
        if let Some(etag) = etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = last_modified {
            request = request.header(IF_MODIFIED_SINCE, last_modified);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CalFeedError::FeedUnreachable(e.to_string()))?;

        let status = response.status();
        debug!(%url, %status, "feed fetch completed");

        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(CalFeedError::FeedUnreachable(format!(
                "server returned {status} for {url}"
            )));
        }

        let new_etag = header_value(&response, ETAG);
        let new_last_modified = header_value(&response, LAST_MODIFIED);

        let body = response
            .text()
            .await
            .map_err(|e| CalFeedError::FeedUnreachable(e.to_string()))?;

        if !body.contains("BEGIN:VCALENDAR") {
            return Err(CalFeedError::InvalidFeedFormat(format!(
                "response from {url} is not an iCalendar document"
            )));
        }

        Ok(FetchOutcome::Fetched {
            body,
            etag: new_etag,
            last_modified: new_last_modified,
        })
    }
}
