//! Throttled "access denied" replies.
//!
//! Strangers get one denial per cooldown window; further attempts inside
//! the window are counted and dropped so the bot never floods a chat it
//! does not serve.

use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Log one line per this many silenced attempts.
const SILENCED_LOG_EVERY: u64 = 100;

/// Remembers which strangers were recently told they are not allowed.
#[derive(Clone)]
pub struct DenialThrottle {
    /// user id -> instant the last denial went out
    notified: Cache<i64, tokio::time::Instant>,
    cooldown: Duration,
    silenced: Arc<AtomicU64>,
}

impl DenialThrottle {
    /// Throttle allowing one denial per `cooldown_secs`, tracking at most
    /// `max_capacity` users for `ttl_secs`.
    #[must_use]
    pub fn new(cooldown_secs: u64, ttl_secs: u64, max_capacity: u64) -> Self {
        let notified = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            notified,
            cooldown: Duration::from_secs(cooldown_secs),
            silenced: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Whether a denial should be sent to `user_id` now.
    pub async fn should_notify(&self, user_id: i64) -> bool {
        let recent = self
            .notified
            .get(&user_id)
            .await
            .is_some_and(|at| at.elapsed() < self.cooldown);
        if !recent {
            return true;
        }

        let count = self.silenced.fetch_add(1, Ordering::Relaxed) + 1;
        if count.is_multiple_of(SILENCED_LOG_EVERY) {
            debug!(count, user_id, "Silenced unauthorized attempts");
        }
        false
    }

    /// Starts the cooldown for `user_id` after a denial was delivered.
    pub async fn record_notice(&self, user_id: i64) {
        self.notified
            .insert(user_id, tokio::time::Instant::now())
            .await;
    }

    /// Attempts dropped inside a cooldown window so far.
    #[must_use]
    pub fn silenced(&self) -> u64 {
        self.silenced.load(Ordering::Relaxed)
    }

    /// Configured cooldown.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        self.cooldown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_attempt_is_answered() {
        let throttle = DenialThrottle::new(60, 120, 100);
        assert!(throttle.should_notify(12345).await);
    }

    #[tokio::test]
    async fn test_repeat_inside_cooldown_is_silenced() {
        let throttle = DenialThrottle::new(60, 120, 100);
        throttle.record_notice(12345).await;

        for _ in 0..5 {
            assert!(!throttle.should_notify(12345).await);
        }
        assert_eq!(throttle.silenced(), 5);
        // Other users are unaffected
        assert!(throttle.should_notify(222).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_expires() {
        let throttle = DenialThrottle::new(60, 3600, 100);
        throttle.record_notice(7).await;
        assert!(!throttle.should_notify(7).await);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(throttle.should_notify(7).await);
    }
}
