//! Configuration and settings management
//!
//! Loads panel settings from config files and environment variables and
//! defines the control-plane constants.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Automation panel settings loaded from the environment
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PanelSettings {
    /// Panel base URL, e.g. `http://127.0.0.1:5700`
    pub ql_base_url: String,
    /// Open API client id
    pub ql_client_id: String,
    /// Open API client secret
    pub ql_client_secret: String,

    /// Seconds a pending conversation survives without a reply
    #[serde(default = "default_conversation_ttl_secs")]
    pub conversation_ttl_secs: u64,
    /// Upper bound on cached entries across all partitions
    #[serde(default = "default_cache_max_capacity")]
    pub cache_max_capacity: u64,

    /// Scheduled task cache TTL
    #[serde(default = "default_tasks_ttl")]
    pub cache_ttl_tasks_secs: u64,
    /// Environment entry cache TTL
    #[serde(default = "default_envs_ttl")]
    pub cache_ttl_envs_secs: u64,
    /// Subscription cache TTL
    #[serde(default = "default_subs_ttl")]
    pub cache_ttl_subs_secs: u64,
    /// Dependency cache TTL
    #[serde(default = "default_deps_ttl")]
    pub cache_ttl_deps_secs: u64,
    /// Script tree cache TTL
    #[serde(default = "default_scripts_ttl")]
    pub cache_ttl_scripts_secs: u64,
}

const fn default_conversation_ttl_secs() -> u64 {
    600
}

const fn default_cache_max_capacity() -> u64 {
    10_000
}

const fn default_tasks_ttl() -> u64 {
    30
}

const fn default_envs_ttl() -> u64 {
    60
}

const fn default_subs_ttl() -> u64 {
    60
}

const fn default_deps_ttl() -> u64 {
    120
}

const fn default_scripts_ttl() -> u64 {
    30
}

/// Refresh the panel token when it has less than this much validity left.
pub const TOKEN_REFRESH_BUFFER: Duration = Duration::from_secs(300);
/// Subtracted from the issued lifetime so the cached window is conservative.
pub const TOKEN_EARLY_EXPIRY_MARGIN: Duration = Duration::from_secs(120);
/// Timeout for the token endpoint.
pub const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for every other panel request.
pub const PANEL_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Hard ceiling on button payload size imposed by the messaging platform.
pub const CALLBACK_DATA_MAX_BYTES: usize = 64;
/// Hygiene bound for the partition store; lookups enforce the real TTL.
pub const CACHE_HYGIENE_TTL: Duration = Duration::from_secs(30 * 60);

/// Largest script accepted for upload or link import (1 MiB).
pub const SCRIPT_MAX_BYTES: usize = 1024 * 1024;
/// Script file extensions the panel can run.
pub const SCRIPT_EXTENSIONS: &[&str] = &[".js", ".py", ".sh", ".ts"];
/// Schedule used when the user answers `d` or `default`.
pub const DEFAULT_SCHEDULE: &str = "0 0 * * *";

/// Builds the layered configuration used by every settings struct.
///
/// Sources, later ones winning: `config/default`, `config/{RUN_MODE}`,
/// `config/local`, `APP__`-prefixed env, then plain env.
///
/// # Errors
///
/// Returns a `ConfigError` if a present file cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        // Empty env vars count as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl PanelSettings {
    /// Load panel settings from the layered configuration.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a required key is missing or malformed.
    pub fn new() -> Result<Self, ConfigError> {
        let mut settings: Self = build_config()?.try_deserialize()?;
        settings.ql_base_url = settings.ql_base_url.trim_end_matches('/').to_string();
        Ok(settings)
    }

    /// How long a pending conversation may wait for input.
    #[must_use]
    pub const fn conversation_ttl(&self) -> Duration {
        Duration::from_secs(self.conversation_ttl_secs)
    }
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            ql_base_url: String::new(),
            ql_client_id: String::new(),
            ql_client_secret: String::new(),
            conversation_ttl_secs: default_conversation_ttl_secs(),
            cache_max_capacity: default_cache_max_capacity(),
            cache_ttl_tasks_secs: default_tasks_ttl(),
            cache_ttl_envs_secs: default_envs_ttl(),
            cache_ttl_subs_secs: default_subs_ttl(),
            cache_ttl_deps_secs: default_deps_ttl(),
            cache_ttl_scripts_secs: default_scripts_ttl(),
        }
    }
}
