use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::OutboundConfig;

/// One POST with a pre-serialized JSON body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundRequest {
    pub url: String,
    /// Complete `Authorization` header value; an empty string omits the header.
    pub auth_header: String,
    pub body: Vec<u8>,
    pub skip_tls_verify: bool,
}

impl OutboundRequest {
    pub fn json<T: serde::Serialize>(
        url: impl Into<String>,
        auth_header: impl Into<String>,
        payload: &T,
        skip_tls_verify: bool,
    ) -> Result<Self, OutboundError> {
        Ok(Self {
            url: url.into(),
            auth_header: auth_header.into(),
            body: serde_json::to_vec(payload).map_err(OutboundError::Encode)?,
            skip_tls_verify,
        })
    }
}

#[derive(Debug, Error)]
pub enum OutboundError {
    #[error("failed to build http client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Single-attempt delivery that reports success only as a boolean.
#[async_trait]
pub trait OutboundClient: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> bool;
}

pub struct HttpOutboundClient {
    verified: Client,
    insecure: Client,
}

impl HttpOutboundClient {
    pub fn new(timeout: Duration) -> Result<Self, OutboundError> {
        let verified =
            Client::builder().timeout(timeout).build().map_err(OutboundError::ClientBuild)?;
        let insecure = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(OutboundError::ClientBuild)?;
        Ok(Self { verified, insecure })
    }

    pub fn from_config(config: &OutboundConfig) -> Result<Self, OutboundError> {
        Self::new(Duration::from_millis(config.timeout_ms))
    }

    fn client(&self, skip_tls_verify: bool) -> &Client {
        if skip_tls_verify {
            &self.insecure
        } else {
            &self.verified
        }
    }
}

#[async_trait]
impl OutboundClient for HttpOutboundClient {
    async fn send(&self, request: OutboundRequest) -> bool {
        let mut builder = self
            .client(request.skip_tls_verify)
            .post(&request.url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(request.body);
        if !request.auth_header.is_empty() {
            builder = builder.header(header::AUTHORIZATION, request.auth_header);
        }

        match builder.send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                debug!(
                    event_name = "outbound.request.delivered",
                    url = %request.url,
                    "outbound request accepted"
                );
                true
            }
            Ok(response) => {
                warn!(
                    event_name = "outbound.request.rejected",
                    url = %request.url,
                    status = response.status().as_u16(),
                    "outbound request returned non-200 status"
                );
                false
            }
            Err(error) => {
                warn!(
                    event_name = "outbound.request.failed",
                    url = %request.url,
                    timeout = error.is_timeout(),
                    error = %error,
                    "outbound request failed"
                );
                false
            }
        }
    }
}
