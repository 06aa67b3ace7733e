//! # HTTP Callback Sender
//!
//! POSTs the payload as JSON. Only `200 OK` counts as delivered.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::domain::request::CallbackPayload;
use crate::ports::outbound::{CallbackError, CallbackSender};

pub struct HttpCallbackSender {
    client: Client,
}

impl HttpCallbackSender {
    pub fn new(timeout: Duration) -> Result<Self, CallbackError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl CallbackSender for HttpCallbackSender {
    async fn send(&self, url: &str, payload: &CallbackPayload) -> Result<(), CallbackError> {
        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(CallbackError::Status(status.as_u16()));
        }
        debug!(url, "Callback delivered");
        Ok(())
    }
}
