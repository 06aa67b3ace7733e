//! # Key Publication Feed Adapters
//!
//! - `HttpKeyPublicationFeed`: `GET {base}/api/key?domain=<domain>`
//! - `DisabledPublicationFeed`: never covers anything (offline runs)

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::ports::outbound::{FeedError, KeyPublicationFeed, PublishedKey};

/// Public key archive queried by default.
pub const DEFAULT_FEED_URL: &str = "https://archive.prove.email";

/// HTTP client for a key archive's `/api/key` endpoint.
pub struct HttpKeyPublicationFeed {
    client: Client,
    base_url: String,
}

impl HttpKeyPublicationFeed {
    /// Create a feed client with the given request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl KeyPublicationFeed for HttpKeyPublicationFeed {
    async fn published_keys(&self, domain: &str) -> Result<Vec<PublishedKey>, FeedError> {
        let url = format!("{}/api/key", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("domain", domain)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let keys: Vec<PublishedKey> = response
            .json()
            .await
            .map_err(|e| FeedError::Decode(e.to_string()))?;
        debug!(domain, keys = keys.len(), "Fetched published keys");
        Ok(keys)
    }
}

/// Feed that never returns a published key.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledPublicationFeed;

#[async_trait::async_trait]
impl KeyPublicationFeed for DisabledPublicationFeed {
    async fn published_keys(&self, _domain: &str) -> Result<Vec<PublishedKey>, FeedError> {
        Ok(Vec::new())
    }
}
