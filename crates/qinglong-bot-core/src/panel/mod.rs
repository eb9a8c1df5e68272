//! Automation panel client
//!
//! Bearer-authenticated REST access to the panel: credential lifecycle,
//! raw transport, the cached gateway, typed models and the resource API.

pub mod api;
pub mod auth;
pub mod client;
pub mod gateway;
pub mod models;
pub mod resources;

pub use api::PanelApi;
pub use auth::{CredentialCache, HttpTokenIssuer, IssuedToken, TokenIssuer};
pub use client::{HttpPanelTransport, PanelTransport};
pub use gateway::CachedGateway;
pub use resources::ResourceClass;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Failures talking to the panel or its token issuer.
///
/// `Clone` so a single refresh outcome can be handed to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PanelError {
    /// The token endpoint did not answer in time
    #[error("Token request timed out")]
    TokenTimeout,
    /// The token endpoint answered with a failure
    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),
    /// A panel request did not answer in time
    #[error("Request timed out ({0}s)")]
    GatewayTimeout(u64),
    /// The panel could not be reached
    #[error("Panel unavailable: {0}")]
    GatewayUnavailable(String),
    /// The panel answered but refused the request
    #[error("Panel rejected the request: {0}")]
    DownstreamRejected(String),
    /// The panel refused the bearer token
    #[error("Panel rejected the token")]
    Unauthorized,
}

/// HTTP verbs used against the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    /// Read
    Get,
    /// Create
    Post,
    /// Update or trigger
    Put,
    /// Remove
    Delete,
}

impl HttpMethod {
    /// Reads go through the cache, everything else invalidates it.
    #[must_use]
    pub const fn is_read(self) -> bool {
        matches!(self, Self::Get)
    }

    /// Upper-case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope every panel endpoint answers with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// `200` on success
    pub code: i64,
    /// Endpoint-specific payload
    #[serde(default)]
    pub data: Value,
    /// Failure reason, when the panel gives one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiResponse {
    /// Successful envelope around `data`.
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self {
            code: 200,
            data,
            message: None,
        }
    }

    /// Whether the panel reported success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code == 200
    }

    /// Turns a failure envelope into [`PanelError::DownstreamRejected`].
    ///
    /// # Errors
    ///
    /// Returns `DownstreamRejected` with the panel's message when `code != 200`.
    pub fn into_result(self) -> Result<Self, PanelError> {
        if self.is_success() {
            Ok(self)
        } else {
            let reason = self
                .message
                .clone()
                .unwrap_or_else(|| format!("code {}", self.code));
            Err(PanelError::DownstreamRejected(reason))
        }
    }

    /// Extracts a list payload.
    ///
    /// Lists arrive either as a bare array or wrapped as `{"data": [...]}`.
    /// Failure envelopes, other shapes and items that do not deserialize
    /// yield nothing rather than an error.
    #[must_use]
    pub fn items<T: DeserializeOwned>(&self) -> Vec<T> {
        if !self.is_success() {
            return Vec::new();
        }
        let list = match &self.data {
            Value::Array(items) => items,
            Value::Object(map) => match map.get("data") {
                Some(Value::Array(items)) => items,
                _ => return Vec::new(),
            },
            _ => return Vec::new(),
        };
        list.iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect()
    }

    /// Deserializes the payload as a single object.
    #[must_use]
    pub fn object<T: DeserializeOwned>(&self) -> Option<T> {
        if !self.is_success() {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }
}
