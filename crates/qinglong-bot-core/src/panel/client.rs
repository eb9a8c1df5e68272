//! Raw bearer-authenticated panel transport.

use super::{ApiResponse, HttpMethod, PanelError};
use crate::config::{PanelSettings, PANEL_REQUEST_TIMEOUT};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// One downstream request to the panel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PanelTransport: Send + Sync {
    /// Sends `body` (if any) to `endpoint` authenticated with `token`.
    ///
    /// A decoded envelope is returned even when it reports failure; only
    /// transport-level problems are errors.
    async fn send(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: Option<Value>,
        token: &str,
    ) -> Result<ApiResponse, PanelError>;
}

/// reqwest implementation of [`PanelTransport`].
pub struct HttpPanelTransport {
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpPanelTransport {
    /// Transport with the standard 10 s timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &PanelSettings) -> Result<Self, reqwest::Error> {
        Self::with_timeout(&settings.ql_base_url, PANEL_REQUEST_TIMEOUT)
    }

    /// Transport with a custom timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout,
        })
    }

    fn map_error(&self, e: &reqwest::Error) -> PanelError {
        if e.is_timeout() {
            PanelError::GatewayTimeout(self.timeout.as_secs())
        } else if e.is_decode() {
            PanelError::DownstreamRejected(format!("malformed response: {e}"))
        } else {
            PanelError::GatewayUnavailable(e.to_string())
        }
    }
}

#[async_trait]
impl PanelTransport for HttpPanelTransport {
    async fn send(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: Option<Value>,
        token: &str,
    ) -> Result<ApiResponse, PanelError> {
        let started = std::time::Instant::now();
        let url = format!("{}{endpoint}", self.base_url);
        let mut request = match method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
            HttpMethod::Put => self.client.put(url),
            HttpMethod::Delete => self.client.delete(url),
        }
        .bearer_auth(token)
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, "application/json");

        if let Some(body) = &body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| self.map_error(&e))?;
        let status = response.status();
        debug!(
            %method,
            endpoint,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis(),
            "Panel API call"
        );

        if status == StatusCode::UNAUTHORIZED {
            return Err(PanelError::Unauthorized);
        }
        if !status.is_success() {
            return Err(PanelError::DownstreamRejected(format!("HTTP {}", status.as_u16())));
        }

        response.json().await.map_err(|e| self.map_error(&e))
    }
}
