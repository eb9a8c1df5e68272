//! Bot API rendition of the core's [`Messenger`].

use crate::bot::resilient::{
    edit_message_resilient, retry_telegram_operation, send_message_resilient,
};
use async_trait::async_trait;
use qinglong_bot_core::messenger::{Button, Layout, MessageRef, Messenger, MessengerError};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{
    CallbackQueryId, ChatId, FileId, InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton,
    KeyboardMarkup, MessageId, ReplyMarkup,
};
use tracing::debug;

/// Sends, edits and downloads through a teloxide [`Bot`].
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    /// Messenger backed by `bot`.
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn inline_keyboard(rows: &[Vec<Button>]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(rows.iter().map(|row| {
        row.iter()
            .map(|button| InlineKeyboardButton::callback(&button.text, button.action.encode()))
            .collect::<Vec<_>>()
    }))
}

/// Inline keyboard for a layout; `None` for reply-keyboard menus.
#[must_use]
pub fn inline_markup(layout: &Layout) -> Option<InlineKeyboardMarkup> {
    match layout {
        Layout::Inline(rows) => Some(inline_keyboard(rows)),
        Layout::Menu(_) => None,
    }
}

/// Markup attached to a new message.
#[must_use]
pub fn reply_markup(layout: &Layout) -> ReplyMarkup {
    match layout {
        Layout::Inline(rows) => ReplyMarkup::InlineKeyboard(inline_keyboard(rows)),
        Layout::Menu(rows) => {
            let keyboard = rows
                .iter()
                .map(|row| row.iter().map(KeyboardButton::new).collect::<Vec<_>>());
            ReplyMarkup::Keyboard(KeyboardMarkup::new(keyboard).resize_keyboard())
        }
    }
}

fn delivery(e: &anyhow::Error) -> MessengerError {
    MessengerError::Delivery(e.to_string())
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn notify(
        &self,
        chat_id: i64,
        text: &str,
        layout: Option<Layout>,
    ) -> Result<MessageRef, MessengerError> {
        let markup = layout.as_ref().map(reply_markup);
        let sent = send_message_resilient(&self.bot, ChatId(chat_id), text, markup)
            .await
            .map_err(|e| delivery(&e))?;
        Ok(MessageRef {
            chat_id,
            message_id: sent.id.0,
        })
    }

    async fn edit(
        &self,
        target: MessageRef,
        text: &str,
        layout: Option<Layout>,
    ) -> Result<(), MessengerError> {
        let markup = layout.as_ref().and_then(|layout| {
            let inline = inline_markup(layout);
            if inline.is_none() {
                debug!("Reply keyboards cannot be attached by an edit; dropped");
            }
            inline
        });
        edit_message_resilient(
            &self.bot,
            ChatId(target.chat_id),
            MessageId(target.message_id),
            text,
            markup,
        )
        .await
        .map(|_| ())
        .map_err(|e| delivery(&e))
    }

    async fn acknowledge(
        &self,
        interaction_id: &str,
        text: Option<String>,
    ) -> Result<(), MessengerError> {
        let mut req = self
            .bot
            .answer_callback_query(CallbackQueryId(interaction_id.to_string()));
        if let Some(text) = text {
            req = req.text(text);
        }
        req.await
            .map(|_| ())
            .map_err(|e| MessengerError::Delivery(e.to_string()))
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, MessengerError> {
        retry_telegram_operation(|| async {
            let file = self.bot.get_file(FileId(file_id.to_string())).await?;
            let mut buf = Vec::new();
            self.bot.download_file(&file.path, &mut buf).await?;
            Ok::<_, anyhow::Error>(buf)
        })
        .await
        .map_err(|e| MessengerError::Download(e.to_string()))
    }
}
