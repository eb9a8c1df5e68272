//! Panel credential lifecycle.
//!
//! The panel issues bearer tokens through its open API. [`CredentialCache`]
//! keeps one process-wide token and refreshes it ahead of expiry, with at
//! most one refresh in flight.

use super::{ApiResponse, PanelError};
use crate::config::{
    PanelSettings, TOKEN_EARLY_EXPIRY_MARGIN, TOKEN_REFRESH_BUFFER, TOKEN_REQUEST_TIMEOUT,
};
use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A freshly issued bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Opaque bearer token
    pub token: String,
    /// Validity reported by the issuer
    pub lifetime: Duration,
}

/// Source of bearer tokens.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Request a new token.
    async fn issue(&self) -> Result<IssuedToken, PanelError>;
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    token: String,
    /// Seconds
    #[serde(default)]
    expiration: u64,
}

/// Issues tokens through `GET /open/auth/token`.
pub struct HttpTokenIssuer {
    base_url: String,
    client_id: String,
    client_secret: String,
    client: reqwest::Client,
}

impl HttpTokenIssuer {
    /// Issuer for the configured panel with the standard 5 s timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &PanelSettings) -> Result<Self, reqwest::Error> {
        Self::with_timeout(settings, TOKEN_REQUEST_TIMEOUT)
    }

    /// Issuer with a custom request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(settings: &PanelSettings, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: settings.ql_base_url.trim_end_matches('/').to_string(),
            client_id: settings.ql_client_id.clone(),
            client_secret: settings.ql_client_secret.clone(),
            client,
        })
    }

    fn map_transport_error(e: &reqwest::Error) -> PanelError {
        if e.is_timeout() {
            PanelError::TokenTimeout
        } else {
            PanelError::TokenRefreshFailed(e.to_string())
        }
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn issue(&self) -> Result<IssuedToken, PanelError> {
        let started = std::time::Instant::now();
        let response = self
            .client
            .get(format!("{}/open/auth/token", self.base_url))
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Self::map_transport_error(&e))?;

        let envelope: ApiResponse = response
            .json()
            .await
            .map_err(|e| Self::map_transport_error(&e))?;
        debug!(elapsed_ms = started.elapsed().as_millis(), "Token endpoint answered");

        if !envelope.is_success() {
            let reason = envelope
                .message
                .clone()
                .unwrap_or_else(|| envelope.data.to_string());
            return Err(PanelError::TokenRefreshFailed(reason));
        }

        let payload: TokenPayload = envelope.object().ok_or_else(|| {
            PanelError::TokenRefreshFailed("response carried no token".to_string())
        })?;

        Ok(IssuedToken {
            token: payload.token,
            lifetime: Duration::from_secs(payload.expiration),
        })
    }
}

#[derive(Debug, Clone)]
struct Credential {
    token: String,
    valid_until: Instant,
}

type RefreshFuture = Shared<BoxFuture<'static, Result<Credential, PanelError>>>;

#[derive(Default)]
struct CredentialState {
    current: Option<Credential>,
    inflight: Option<RefreshFuture>,
}

/// Process-wide bearer credential with proactive, single-flight refresh.
pub struct CredentialCache {
    issuer: Arc<dyn TokenIssuer>,
    state: Arc<Mutex<CredentialState>>,
    refresh_buffer: Duration,
    early_expiry_margin: Duration,
}

impl CredentialCache {
    /// Wrap an issuer with the standard buffer and margin.
    #[must_use]
    pub fn new(issuer: Arc<dyn TokenIssuer>) -> Self {
        Self {
            issuer,
            state: Arc::new(Mutex::new(CredentialState::default())),
            refresh_buffer: TOKEN_REFRESH_BUFFER,
            early_expiry_margin: TOKEN_EARLY_EXPIRY_MARGIN,
        }
    }

    /// Returns a usable token, refreshing when less than the buffer remains.
    ///
    /// Callers holding a stale but unexpired token get it back immediately
    /// while the refresh runs; callers without one wait for the refresh.
    ///
    /// # Errors
    ///
    /// Returns `TokenTimeout` or `TokenRefreshFailed` when a refresh this
    /// caller depends on fails.
    pub async fn token(&self) -> Result<String, PanelError> {
        let refresh = {
            let mut state = self.state.lock().await;
            let now = Instant::now();

            if let Some(credential) = &state.current {
                if credential.valid_until > now + self.refresh_buffer {
                    return Ok(credential.token.clone());
                }
            }

            let existing = state.inflight.clone();
            let refresh = match existing {
                Some(inflight) => inflight,
                None => {
                    let started = self.start_refresh();
                    state.inflight = Some(started.clone());
                    started
                }
            };

            if let Some(credential) = &state.current {
                if credential.valid_until > now {
                    return Ok(credential.token.clone());
                }
            }
            refresh
        };

        refresh.await.map(|credential| credential.token)
    }

    /// Drops the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        self.state.lock().await.current = None;
    }

    // Must be called with the state lock held; the spawned task takes the
    // lock only after the caller has recorded the in-flight future.
    fn start_refresh(&self) -> RefreshFuture {
        let issuer = Arc::clone(&self.issuer);
        let state = Arc::clone(&self.state);
        let margin = self.early_expiry_margin;

        let task = tokio::spawn(async move {
            info!("Refreshing panel token");
            let started = Instant::now();
            let outcome = issuer.issue().await.map(|issued| Credential {
                token: issued.token,
                valid_until: started + issued.lifetime.saturating_sub(margin),
            });

            let mut guard = state.lock().await;
            guard.inflight = None;
            match &outcome {
                Ok(credential) => {
                    let remaining = credential.valid_until.saturating_duration_since(Instant::now());
                    info!(valid_for_secs = remaining.as_secs(), "Panel token cached");
                    guard.current = Some(credential.clone());
                }
                Err(e) => warn!("Panel token refresh failed: {e}"),
            }
            outcome
        });

        async move {
            task.await.unwrap_or_else(|e| {
                Err(PanelError::TokenRefreshFailed(format!(
                    "refresh task aborted: {e}"
                )))
            })
        }
        .boxed()
        .shared()
    }
}
