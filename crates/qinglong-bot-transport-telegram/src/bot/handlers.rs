use crate::bot::DenialThrottle;
use qinglong_bot_core::controller::PanelBot;
use qinglong_bot_core::dispatch::{Attachment, CallbackEvent, MessageEvent, PanelCommand};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info};

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

fn get_user_name(msg: &Message) -> String {
    msg.from.as_ref().map_or_else(
        || "Unknown".to_string(),
        |user| {
            user.username
                .clone()
                .unwrap_or_else(|| user.first_name.clone())
        },
    )
}

/// Supported commands for the bot
#[derive(BotCommands, Clone, Copy, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Greeting and menu keyboard
    #[command(description = "Show the main menu.")]
    Start,
    /// Usage help
    #[command(description = "Show help.")]
    Help,
    /// Scheduled tasks
    #[command(description = "Manage scheduled tasks.")]
    Tasks,
    /// Environment entries
    #[command(description = "Manage environment variables.")]
    Envs,
    /// Subscriptions
    #[command(description = "Manage subscriptions.")]
    Subs,
    /// Dependencies
    #[command(description = "Manage dependencies.")]
    Deps,
    /// Script tree
    #[command(description = "Browse scripts.")]
    Scripts,
    /// Abandon pending input
    #[command(description = "Cancel the current input.")]
    Cancel,
    /// Drop this chat's cache
    #[command(description = "Clear cached panel data.")]
    ClearCache,
}

impl From<Command> for PanelCommand {
    fn from(command: Command) -> Self {
        match command {
            Command::Start => Self::Start,
            Command::Help => Self::Help,
            Command::Tasks => Self::Tasks,
            Command::Envs => Self::Envs,
            Command::Subs => Self::Subs,
            Command::Deps => Self::Deps,
            Command::Scripts => Self::Scripts,
            Command::Cancel => Self::Cancel,
            Command::ClearCache => Self::ClearCache,
        }
    }
}

/// Transport-neutral view of a text or document message.
#[must_use]
pub fn message_event(msg: &Message) -> Option<MessageEvent> {
    let document = msg.document().map(|doc| Attachment {
        file_id: doc.file.id.0.clone(),
        file_name: doc.file_name.clone(),
        size: Some(u64::from(doc.file.size)),
    });
    let text = msg.text().or_else(|| msg.caption());
    if text.is_none() && document.is_none() {
        return None;
    }

    Some(MessageEvent {
        user_id: get_user_id_safe(msg),
        chat_id: msg.chat.id.0,
        text: text.unwrap_or_default().to_string(),
        document,
    })
}

/// Transport-neutral view of a button press; `None` without message or data.
#[must_use]
pub fn callback_event(q: &CallbackQuery) -> Option<CallbackEvent> {
    let message = q.message.as_ref()?;
    Some(CallbackEvent {
        user_id: q.from.id.0.cast_signed(),
        chat_id: message.chat().id.0,
        message_id: message.id().0,
        data: q.data.clone()?,
        interaction_id: q.id.0.clone(),
    })
}

/// Slash command endpoint.
///
/// # Errors
///
/// Never fails; handler errors are reported to the chat by the core.
pub async fn handle_command(
    msg: Message,
    cmd: Command,
    panel: Arc<PanelBot>,
) -> Result<(), teloxide::RequestError> {
    panel
        .handle_command(get_user_id_safe(&msg), msg.chat.id.0, cmd.into())
        .await;
    respond(())
}

/// Text and document endpoint.
///
/// # Errors
///
/// Never fails; handler errors are reported to the chat by the core.
pub async fn handle_message(
    msg: Message,
    panel: Arc<PanelBot>,
) -> Result<(), teloxide::RequestError> {
    match message_event(&msg) {
        Some(event) => panel.handle_message(event).await,
        None => debug!(user_id = get_user_id_safe(&msg), "Ignoring message without text"),
    }
    respond(())
}

/// Button press endpoint.
///
/// # Errors
///
/// Never fails; handler errors are reported to the chat by the core.
pub async fn handle_callback(
    q: CallbackQuery,
    panel: Arc<PanelBot>,
) -> Result<(), teloxide::RequestError> {
    match callback_event(&q) {
        Some(event) => panel.handle_callback(event).await,
        None => debug!(user_id = q.from.id.0, "Callback without message or data"),
    }
    respond(())
}

/// Replies "access denied" at most once per cooldown window.
///
/// # Errors
///
/// Never fails; delivery errors are logged.
pub async fn handle_unauthorized(
    bot: Bot,
    msg: Message,
    throttle: Arc<DenialThrottle>,
) -> Result<(), teloxide::RequestError> {
    let user_id = get_user_id_safe(&msg);
    if throttle.should_notify(user_id).await {
        info!(
            "⛔️ Unauthorized access from user {} ({}). Sending denial message.",
            user_id,
            get_user_name(&msg)
        );

        if let Err(e) = bot.send_message(msg.chat.id, "⛔️ Access denied").await {
            error!("Failed to send access denied message to {}: {}", user_id, e);
        } else {
            throttle.record_notice(user_id).await;
        }
    }
    respond(())
}

/// Answers presses from users outside the allow-list without touching the panel.
///
/// # Errors
///
/// Never fails; delivery errors are logged.
pub async fn handle_unauthorized_callback(
    bot: Bot,
    q: CallbackQuery,
) -> Result<(), teloxide::RequestError> {
    debug!(user_id = q.from.id.0, "Unauthorized callback");
    if let Err(e) = bot
        .answer_callback_query(q.id.clone())
        .text("⛔️ Access denied")
        .await
    {
        error!("Failed to answer unauthorized callback: {}", e);
    }
    respond(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_parse() {
        assert_eq!(Command::parse("/tasks", "ql_bot").ok(), Some(Command::Tasks));
        assert_eq!(
            Command::parse("/clearcache", "ql_bot").ok(),
            Some(Command::ClearCache)
        );
        assert!(Command::parse("/unknown", "ql_bot").is_err());
    }

    #[test]
    fn test_every_command_is_registered() {
        assert_eq!(Command::bot_commands().len(), 9);
    }

    #[test]
    fn test_commands_map_to_core() {
        assert_eq!(PanelCommand::from(Command::Cancel), PanelCommand::Cancel);
        assert_eq!(PanelCommand::from(Command::ClearCache), PanelCommand::ClearCache);
        assert_eq!(PanelCommand::from(Command::Scripts), PanelCommand::Scripts);
    }
}
