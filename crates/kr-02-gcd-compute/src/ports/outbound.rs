//! # Outbound Ports
//!
//! Where results go once a computation finishes.

use thiserror::Error;

use crate::domain::request::CallbackPayload;

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("callback request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("callback returned status {0}")]
    Status(u16),
}

/// One delivery attempt of a callback payload. Retries are the caller's
/// concern.
#[async_trait::async_trait]
pub trait CallbackSender: Send + Sync {
    async fn send(&self, url: &str, payload: &CallbackPayload) -> Result<(), CallbackError>;
}
