//! reqwest-backed transport.

use std::sync::Arc;

use async_trait::async_trait;

use super::{RawResponse, Transport, TransportRequest};
use crate::config::DispatcherConfig;
use crate::error_handling::{InitializationError, TransportError};
use crate::initialization::init_client;

/// Riot's authentication header.
pub const RIOT_TOKEN_HEADER: &str = "X-Riot-Token";

/// Sends GETs with the API key in [`RIOT_TOKEN_HEADER`].
pub struct HttpTransport {
    client: Arc<reqwest::Client>,
    api_key: String,
}

impl HttpTransport {
    pub fn new(client: Arc<reqwest::Client>, api_key: impl Into<String>) -> Self {
        HttpTransport {
            client,
            api_key: api_key.into(),
        }
    }

    /// Builds the client and resolves the API key from the configuration.
    ///
    /// # Errors
    ///
    /// Fails when no API key is configured or the client cannot be built.
    pub fn from_config(config: &DispatcherConfig) -> Result<Self, InitializationError> {
        let api_key = config.resolve_api_key()?;
        let client = init_client(config)?;
        Ok(HttpTransport::new(client, api_key))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &TransportRequest) -> Result<RawResponse, TransportError> {
        let mut builder = self
            .client
            .get(&request.url)
            .header(RIOT_TOKEN_HEADER, &self.api_key)
            .timeout(request.timeout);
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}
