//! Telegram transport settings.

use config::ConfigError;
use qinglong_bot_core::config::{build_config, PanelSettings};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Telegram transport settings loaded from environment variables.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TelegramSettings {
    /// Telegram Bot API token.
    pub telegram_token: String,
    /// Comma-separated list of user IDs allowed to drive the panel.
    #[serde(rename = "admin_user_ids")]
    pub admin_user_ids_str: Option<String>,
    /// Public URL Telegram should push updates to. Long polling when unset.
    pub webhook_url: Option<String>,
    /// Local address the webhook listener binds to.
    pub webhook_listen_addr: Option<String>,
    /// Secret token Telegram echoes back on every webhook request.
    pub webhook_secret: Option<String>,
}

/// Combined settings used by the Telegram transport layer.
#[derive(Clone)]
pub struct BotSettings {
    /// Panel settings shared with the core.
    pub panel: Arc<PanelSettings>,
    /// Telegram-specific settings.
    pub telegram: Arc<TelegramSettings>,
}

impl BotSettings {
    /// Create a new combined settings bundle.
    #[must_use]
    pub fn new(panel: PanelSettings, telegram: TelegramSettings) -> Self {
        Self {
            panel: Arc::new(panel),
            telegram: Arc::new(telegram),
        }
    }
}

/// Users admitted by the transport filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowList {
    /// No allow-list configured
    Everyone,
    /// Configured; anyone missing is denied, even when the set is empty
    Only(HashSet<i64>),
}

/// Splits on commas, semicolons and whitespace; returns the parsed IDs and
/// the rejected entries.
fn parse_admin_ids(raw: &str) -> (HashSet<i64>, Vec<&str>) {
    let mut ids = HashSet::new();
    let mut rejected = Vec::new();
    for token in raw
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|token| !token.is_empty())
    {
        match token.parse::<i64>() {
            Ok(id) => {
                ids.insert(id);
            }
            Err(_) => rejected.push(token),
        }
    }
    (ids, rejected)
}

/// Bind address used when `webhook_listen_addr` is unset.
pub const DEFAULT_WEBHOOK_LISTEN_ADDR: &str = "0.0.0.0:8080";

impl TelegramSettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// Who may drive the panel. A blank `admin_user_ids` counts as unset.
    #[must_use]
    pub fn allow_list(&self) -> AllowList {
        match self.admin_user_ids_str.as_deref().map(str::trim) {
            None | Some("") => AllowList::Everyone,
            Some(raw) => AllowList::Only(parse_admin_ids(raw).0),
        }
    }

    /// Logs the effective allow-list once at startup, naming every entry
    /// that is not a numeric user ID.
    pub fn log_allow_list(&self) {
        if let Some(raw) = self.admin_user_ids_str.as_deref() {
            for entry in parse_admin_ids(raw).1 {
                warn!(entry, "Ignoring admin_user_ids entry: not a numeric user ID");
            }
        }
        match self.allow_list() {
            AllowList::Everyone => {
                warn!("admin_user_ids is not set: every Telegram user can drive the panel");
            }
            AllowList::Only(ids) if ids.is_empty() => {
                warn!("admin_user_ids has no valid user ID: every Telegram user is denied");
            }
            AllowList::Only(ids) => info!("Panel access limited to {} user(s)", ids.len()),
        }
    }

    /// Whether `user_id` may use the bot.
    #[must_use]
    pub fn is_allowed(&self, user_id: i64) -> bool {
        match self.allow_list() {
            AllowList::Everyone => true,
            AllowList::Only(ids) => ids.contains(&user_id),
        }
    }

    /// Webhook URL, when the webhook listener should be used.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured URL does not parse.
    pub fn webhook(&self) -> Result<Option<url::Url>, url::ParseError> {
        self.webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(url::Url::parse)
            .transpose()
    }

    /// Socket address for the webhook listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured address does not parse.
    pub fn listen_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.webhook_listen_addr
            .as_deref()
            .unwrap_or(DEFAULT_WEBHOOK_LISTEN_ADDR)
            .parse()
    }
}

/// Cooldown period (seconds) between "Access Denied" messages for same user.
/// Default: 20 minutes.
pub const UNAUTHORIZED_COOLDOWN_SECS: u64 = 1200;
/// Time-to-live (seconds) for cache entries.
/// Default: 2 hours.
pub const UNAUTHORIZED_CACHE_TTL_SECS: u64 = 7200;
/// Maximum cache capacity (number of entries).
pub const UNAUTHORIZED_CACHE_MAX_SIZE: u64 = 10_000;

/// First delay between Telegram API retries.
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 200;
/// Ceiling for the delay between Telegram API retries.
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 3000;
/// Retries after the first failed Telegram API call.
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;

fn env_or(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Get unauthorized cooldown from env or default.
///
/// Environment variable: `UNAUTHORIZED_COOLDOWN_SECS`.
#[must_use]
pub fn get_unauthorized_cooldown() -> u64 {
    env_or("UNAUTHORIZED_COOLDOWN_SECS", UNAUTHORIZED_COOLDOWN_SECS)
}

/// Get unauthorized cache TTL from env or default.
///
/// Environment variable: `UNAUTHORIZED_CACHE_TTL_SECS`.
#[must_use]
pub fn get_unauthorized_cache_ttl() -> u64 {
    env_or("UNAUTHORIZED_CACHE_TTL_SECS", UNAUTHORIZED_CACHE_TTL_SECS)
}

/// Get unauthorized cache max size from env or default.
///
/// Environment variable: `UNAUTHORIZED_CACHE_MAX_SIZE`.
#[must_use]
pub fn get_unauthorized_cache_max_size() -> u64 {
    env_or("UNAUTHORIZED_CACHE_MAX_SIZE", UNAUTHORIZED_CACHE_MAX_SIZE)
}

#[cfg(test)]
mod tests {
    use super::{parse_admin_ids, AllowList, TelegramSettings};
    use std::collections::HashSet;

    fn with_admins(raw: Option<&str>) -> TelegramSettings {
        TelegramSettings {
            telegram_token: "dummy".to_string(),
            admin_user_ids_str: raw.map(str::to_string),
            ..TelegramSettings::default()
        }
    }

    #[test]
    fn test_list_parsing() {
        let settings = with_admins(Some("123,456"));
        assert_eq!(
            settings.allow_list(),
            AllowList::Only(HashSet::from([123, 456]))
        );

        let settings = with_admins(Some("333; 444, 555"));
        assert_eq!(
            settings.allow_list(),
            AllowList::Only(HashSet::from([333, 444, 555]))
        );

        let (ids, rejected) = parse_admin_ids("abc, 777");
        assert_eq!(ids, HashSet::from([777]));
        assert_eq!(rejected, vec!["abc"]);
    }

    #[test]
    fn test_unset_allow_list_admits_everyone() {
        let settings = with_admins(None);
        assert_eq!(settings.allow_list(), AllowList::Everyone);
        assert!(settings.is_allowed(1));

        let settings = with_admins(Some("  "));
        assert_eq!(settings.allow_list(), AllowList::Everyone);
        assert!(settings.is_allowed(1));

        let settings = with_admins(Some("42"));
        assert!(settings.is_allowed(42));
        assert!(!settings.is_allowed(1));
    }

    #[test]
    fn test_malformed_allow_list_denies_everyone() {
        let settings = with_admins(Some("@alice"));
        assert_eq!(settings.allow_list(), AllowList::Only(HashSet::new()));
        assert!(!settings.is_allowed(999));
        assert!(!settings.is_allowed(0));

        // One typo does not open the bot to strangers
        let settings = with_admins(Some("@alice, 42"));
        assert!(settings.is_allowed(42));
        assert!(!settings.is_allowed(999));
    }

    #[test]
    fn test_webhook_settings() {
        let mut settings = TelegramSettings::default();
        assert_eq!(settings.webhook().expect("no url"), None);
        assert_eq!(
            settings.listen_addr().expect("default addr").port(),
            8080
        );

        settings.webhook_url = Some("https://bot.example.com/hook".to_string());
        settings.webhook_listen_addr = Some("127.0.0.1:9000".to_string());
        let url = settings.webhook().expect("valid url").expect("set");
        assert_eq!(url.path(), "/hook");
        assert_eq!(settings.listen_addr().expect("addr").port(), 9000);

        settings.webhook_url = Some("not a url".to_string());
        assert!(settings.webhook().is_err());
    }
}
