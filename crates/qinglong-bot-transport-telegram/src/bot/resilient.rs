//! Resilient messaging utilities with automatic retry for Telegram API operations.
//!
//! Every call is retried on failure with exponential backoff and jitter
//! (see the `TELEGRAM_API_*` constants in [`crate::config`]).

use crate::config::{
    TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
};
use anyhow::Result;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardMarkup, Message, MessageId, ParseMode, ReplyMarkup};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{debug, warn};

/// Telegram rejects texts over 4096 characters; leave room for the marker.
const MAX_TEXT_CHARS: usize = 4000;

const ERROR_NOT_MODIFIED: &str = "message is not modified";

/// Retry a Telegram API operation with exponential backoff.
///
/// # Errors
///
/// Returns the last error once every attempt has failed.
pub async fn retry_telegram_operation<F, Fut, T>(operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Telegram API operation failed after {} retries: {}",
            TELEGRAM_API_MAX_RETRIES, e
        );
        e
    })
}

/// Cuts `text` to what Telegram accepts, marking the cut.
#[must_use]
pub fn fit_message(text: &str) -> String {
    if text.chars().count() <= MAX_TEXT_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(MAX_TEXT_CHARS).collect();
    format!("{cut}...\n\n<i>(message truncated)</i>")
}

/// Send an HTML message with automatic retry on network failures.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn send_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    text: &str,
    markup: Option<ReplyMarkup>,
) -> Result<Message> {
    let text = fit_message(text);
    retry_telegram_operation(|| async {
        let mut req = bot
            .send_message(chat_id, text.clone())
            .parse_mode(ParseMode::Html);
        if let Some(markup) = markup.clone() {
            req = req.reply_markup(markup);
        }
        req.await
            .map_err(|e| anyhow::anyhow!("Telegram send error: {e}"))
    })
    .await
}

/// Edit an HTML message with automatic retry on network failures.
///
/// Returns `false` when Telegram reports the content unchanged.
///
/// # Errors
///
/// Returns an error after all retries are exhausted.
pub async fn edit_message_resilient(
    bot: &Bot,
    chat_id: ChatId,
    msg_id: MessageId,
    text: &str,
    markup: Option<InlineKeyboardMarkup>,
) -> Result<bool> {
    let text = fit_message(text);
    let edited = retry_telegram_operation(|| async {
        let mut req = bot
            .edit_message_text(chat_id, msg_id, text.clone())
            .parse_mode(ParseMode::Html);
        if let Some(markup) = markup.clone() {
            req = req.reply_markup(markup);
        }
        match req.await {
            Ok(_) => Ok(true),
            Err(e) if e.to_string().contains(ERROR_NOT_MODIFIED) => Ok(false),
            Err(e) => Err(anyhow::anyhow!("Telegram edit error: {e}")),
        }
    })
    .await?;

    if !edited {
        debug!("Message update skipped: message is not modified");
    }
    Ok(edited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_fit_message_keeps_short_text() {
        assert_eq!(fit_message("<b>ok</b>"), "<b>ok</b>");
    }

    #[test]
    fn test_fit_message_cuts_on_char_boundary() {
        let long = "日".repeat(MAX_TEXT_CHARS + 10);
        let fitted = fit_message(&long);
        assert!(fitted.starts_with(&"日".repeat(MAX_TEXT_CHARS)));
        assert!(fitted.ends_with("<i>(message truncated)</i>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_after_success() {
        let attempts = AtomicUsize::new(0);
        let result = retry_telegram_operation(|| async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(anyhow::anyhow!("flaky"))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.expect("third attempt succeeds"), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up() {
        let attempts = AtomicUsize::new(0);
        let result: Result<()> = retry_telegram_operation(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!("down"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), TELEGRAM_API_MAX_RETRIES + 1);
    }
}
