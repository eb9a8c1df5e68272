//! Cached gateway in front of every panel call.
//!
//! Reads go through the conversation's cache partition and only successful
//! envelopes are stored. Writes drop the resource-class prefix of their
//! cache key before the call and again once it returns, so no read racing
//! the write can leave a stale list behind.

use super::auth::CredentialCache;
use super::client::PanelTransport;
use super::resources::class_prefix;
use super::{ApiResponse, HttpMethod, PanelError};
use crate::cache::{PartitionKey, PartitionedCache};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Single entry point for downstream panel traffic.
#[derive(Clone)]
pub struct CachedGateway {
    cache: PartitionedCache,
    credentials: Arc<CredentialCache>,
    transport: Arc<dyn PanelTransport>,
}

impl CachedGateway {
    /// Assemble a gateway from its collaborators.
    #[must_use]
    pub fn new(
        cache: PartitionedCache,
        credentials: Arc<CredentialCache>,
        transport: Arc<dyn PanelTransport>,
    ) -> Self {
        Self {
            cache,
            credentials,
            transport,
        }
    }

    /// The cache the gateway reads through.
    #[must_use]
    pub const fn cache(&self) -> &PartitionedCache {
        &self.cache
    }

    /// Performs one panel call on behalf of conversation `chat_id`.
    ///
    /// `GET` consults the cache under `cache_key` and stores successful
    /// answers for `ttl`; a hit is returned regardless of `ttl`. Any other
    /// method invalidates the class prefix of `cache_key` and is never
    /// cached.
    ///
    /// # Errors
    ///
    /// Credential and transport failures. A failure envelope is not an
    /// error at this layer.
    pub async fn call(
        &self,
        chat_id: PartitionKey,
        method: HttpMethod,
        endpoint: &str,
        body: Option<Value>,
        cache_key: &str,
        ttl: Duration,
    ) -> Result<ApiResponse, PanelError> {
        if method.is_read() {
            self.read(chat_id, endpoint, cache_key, ttl).await
        } else {
            self.write(chat_id, method, endpoint, body, cache_key).await
        }
    }

    /// Cached `GET`.
    ///
    /// # Errors
    ///
    /// Credential and transport failures on a miss.
    pub async fn read(
        &self,
        chat_id: PartitionKey,
        endpoint: &str,
        cache_key: &str,
        ttl: Duration,
    ) -> Result<ApiResponse, PanelError> {
        let partition = self.cache.partition(chat_id);
        if let Some(cached) = partition.get(cache_key).await {
            if let Ok(response) = serde_json::from_value::<ApiResponse>(cached) {
                return Ok(response);
            }
            partition.delete(cache_key).await;
        }

        let response = self.send(HttpMethod::Get, endpoint, None).await?;
        if response.is_success() {
            if let Ok(value) = serde_json::to_value(&response) {
                partition.set(cache_key, value, ttl).await;
            }
        }
        Ok(response)
    }

    /// Uncached `GET` for data that must always be live.
    ///
    /// # Errors
    ///
    /// Credential and transport failures.
    pub async fn read_fresh(&self, endpoint: &str) -> Result<ApiResponse, PanelError> {
        self.send(HttpMethod::Get, endpoint, None).await
    }

    /// Mutating call; invalidates the class of `cache_key` around it.
    ///
    /// # Errors
    ///
    /// Credential and transport failures.
    pub async fn write(
        &self,
        chat_id: PartitionKey,
        method: HttpMethod,
        endpoint: &str,
        body: Option<Value>,
        cache_key: &str,
    ) -> Result<ApiResponse, PanelError> {
        let prefix = class_prefix(cache_key);
        let partition = self.cache.partition(chat_id);

        partition.clear_prefix(prefix).await;
        let outcome = self.send(method, endpoint, body).await;
        partition.clear_prefix(prefix).await;

        if let Ok(response) = &outcome {
            info!(
                %method,
                endpoint,
                chat_id,
                code = response.code,
                "Panel mutation"
            );
        }
        outcome
    }

    async fn send(
        &self,
        method: HttpMethod,
        endpoint: &str,
        body: Option<Value>,
    ) -> Result<ApiResponse, PanelError> {
        let token = self.credentials.token().await?;
        let outcome = self
            .transport
            .send(method, endpoint, body.clone(), &token)
            .await;
        if !is_auth_rejection(&outcome) {
            return outcome;
        }

        warn!(%method, endpoint, "Panel rejected the token, refreshing once");
        self.credentials.invalidate().await;
        let token = self.credentials.token().await?;
        self.transport.send(method, endpoint, body, &token).await
    }
}

fn is_auth_rejection(outcome: &Result<ApiResponse, PanelError>) -> bool {
    match outcome {
        Ok(response) => response.code == 401,
        Err(e) => *e == PanelError::Unauthorized,
    }
}
