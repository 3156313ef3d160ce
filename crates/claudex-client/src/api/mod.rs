//! Backend API client
//!
//! The thin slice of the REST surface the stream core depends on: the
//! chat status query used by resumption validation, and the stop request
//! used for cooperative cancellation. Everything else the product's
//! backend offers is consumed by other layers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiError;

/// Backend answer to "does this chat have a generation in flight?".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStatus {
    pub has_active_task: bool,
    /// Message the active task is appending to, when the backend knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// The backend operations the stream registry and resumption validator
/// call. Trait-shaped so tests and alternative transports can stand in
/// for the HTTP client.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn chat_status(&self, chat_id: &str) -> Result<ChatStatus, ApiError>;
    async fn stop_generation(&self, chat_id: &str) -> Result<(), ApiError>;
}

/// reqwest-backed implementation against the Claudex REST API.
pub struct HttpBackendClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Use a preconfigured client (auth headers, proxies, timeouts).
    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url, client }
    }
}

#[async_trait]
impl BackendApi for HttpBackendClient {
    async fn chat_status(&self, chat_id: &str) -> Result<ChatStatus, ApiError> {
        let url = format!("{}/api/chats/{}/status", self.base_url, chat_id);
        debug!("checking chat status: {url}");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }
        Ok(response.json().await?)
    }

    async fn stop_generation(&self, chat_id: &str) -> Result<(), ApiError> {
        let url = format!("{}/api/chats/{}/stop", self.base_url, chat_id);
        debug!("requesting generation stop: {url}");
        let response = self.client.post(&url).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }
        Ok(())
    }
}
