//! # Runtime Adapters
//!
//! Backend selection for the outbound ports whose implementation is chosen
//! by configuration.

pub mod storage;

use kr_01_key_recovery::{
    DisabledPublicationFeed, FeedError, HttpKeyPublicationFeed, KeyPublicationFeed, PublishedKey,
};

use crate::container::config::FeedConfig;

/// The publication feed selected by `FeedConfig`.
pub enum RuntimeFeed {
    Http(HttpKeyPublicationFeed),
    Disabled(DisabledPublicationFeed),
}

impl RuntimeFeed {
    pub fn from_config(config: &FeedConfig) -> Result<Self, FeedError> {
        if !config.enabled {
            return Ok(RuntimeFeed::Disabled(DisabledPublicationFeed));
        }
        Ok(RuntimeFeed::Http(HttpKeyPublicationFeed::new(
            config.url.clone(),
            config.timeout,
        )?))
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, RuntimeFeed::Http(_))
    }
}

#[async_trait::async_trait]
impl KeyPublicationFeed for RuntimeFeed {
    async fn published_keys(&self, domain: &str) -> Result<Vec<PublishedKey>, FeedError> {
        match self {
            RuntimeFeed::Http(feed) => feed.published_keys(domain).await,
            RuntimeFeed::Disabled(feed) => feed.published_keys(domain).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_selection() {
        let mut config = FeedConfig::default();
        assert!(RuntimeFeed::from_config(&config).unwrap().is_enabled());

        config.enabled = false;
        assert!(!RuntimeFeed::from_config(&config).unwrap().is_enabled());
    }

    #[tokio::test]
    async fn test_disabled_feed_is_empty() {
        let config = FeedConfig {
            enabled: false,
            ..FeedConfig::default()
        };
        let feed = RuntimeFeed::from_config(&config).unwrap();
        assert!(feed.published_keys("example.com").await.unwrap().is_empty());
    }
}
