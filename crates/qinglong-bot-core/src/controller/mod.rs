//! Bot operations
//!
//! [`PanelBot`] turns inbound events into panel calls and rendered
//! replies. Button presses are always acknowledged before any panel
//! traffic. A handler failure is reported to the chat and clears the
//! user's pending input.

mod deps;
mod envs;
mod import;
mod input;
mod scripts;
mod subs;
mod tasks;
pub mod views;

pub use import::{normalize_script_url, HttpScriptFetcher, ImportError, ScriptFetcher};

use crate::action::Action;
use crate::cache::PartitionedCache;
use crate::config::PanelSettings;
use crate::conversation::{is_cancel, ConversationStore, PendingAction};
use crate::dispatch::{menu_rows, route_text, CallbackEvent, MessageEvent, PanelCommand, TextRoute};
use crate::messenger::{Layout, MessageRef, Messenger};
use crate::panel::{
    CachedGateway, CredentialCache, HttpPanelTransport, HttpTokenIssuer, PanelApi, ResourceClass,
};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use views::Target;

/// Toast shown on every button press.
const PROCESSING: &str = "⏳ Processing...";

/// Drives every bot operation for one panel.
#[derive(Clone)]
pub struct PanelBot {
    api: PanelApi,
    conversations: ConversationStore,
    messenger: Arc<dyn Messenger>,
    fetcher: Arc<dyn ScriptFetcher>,
}

impl PanelBot {
    /// Assemble a bot from its collaborators.
    #[must_use]
    pub fn new(
        api: PanelApi,
        conversations: ConversationStore,
        messenger: Arc<dyn Messenger>,
        fetcher: Arc<dyn ScriptFetcher>,
    ) -> Self {
        Self {
            api,
            conversations,
            messenger,
            fetcher,
        }
    }

    /// Wires the HTTP panel client, credential cache and in-memory caches.
    ///
    /// # Errors
    ///
    /// Returns an error if one of the HTTP clients cannot be built.
    pub fn from_settings(
        settings: &PanelSettings,
        messenger: Arc<dyn Messenger>,
    ) -> Result<Self, reqwest::Error> {
        let issuer = Arc::new(HttpTokenIssuer::new(settings)?);
        let credentials = Arc::new(CredentialCache::new(issuer));
        let transport = Arc::new(HttpPanelTransport::new(settings)?);
        let cache = PartitionedCache::in_memory(settings.cache_max_capacity);
        let gateway = CachedGateway::new(cache, credentials, transport);

        Ok(Self::new(
            PanelApi::new(gateway, settings.clone()),
            ConversationStore::new(settings.conversation_ttl()),
            messenger,
            Arc::new(HttpScriptFetcher::new()?),
        ))
    }

    /// Pending conversations, shared with the transport.
    #[must_use]
    pub const fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    /// Handles an inline button press.
    pub async fn handle_callback(&self, event: CallbackEvent) {
        if let Err(e) = self
            .messenger
            .acknowledge(&event.interaction_id, Some(PROCESSING.to_string()))
            .await
        {
            warn!(user_id = event.user_id, error = %e, "Failed to acknowledge callback");
        }

        let action = Action::decode(&event.data);
        debug!(user_id = event.user_id, data = %event.data, kind = action.kind(), "Callback");

        let origin = MessageRef {
            chat_id: event.chat_id,
            message_id: event.message_id,
        };
        let result = match action {
            Action::Noop => {
                debug!(data = %event.data, "Inert callback dropped");
                return;
            }
            Action::Tasks(action) => self.task_action(event.user_id, origin, action).await,
            Action::Envs(action) => self.env_action(event.user_id, origin, action).await,
            Action::Subs(action) => self.sub_action(event.user_id, origin, action).await,
            Action::Deps(action) => self.dep_action(event.user_id, origin, action).await,
            Action::Scripts(action) => self.script_action(event.user_id, origin, action).await,
        };

        if let Err(e) = result {
            self.report_failure(event.user_id, event.chat_id, &e).await;
        }
    }

    /// Handles a slash command or menu button.
    pub async fn handle_command(&self, user_id: i64, chat_id: i64, command: PanelCommand) {
        info!(user_id, ?command, "Command");
        if let Err(e) = self.run_command(user_id, chat_id, command).await {
            self.report_failure(user_id, chat_id, &e).await;
        }
    }

    /// Handles a text or document message.
    pub async fn handle_message(&self, event: MessageEvent) {
        let user_id = event.user_id;
        let chat_id = event.chat_id;
        if let Err(e) = self.route_message(&event).await {
            self.report_failure(user_id, chat_id, &e).await;
        }
    }

    async fn route_message(&self, event: &MessageEvent) -> Result<()> {
        let text = event.text.trim();
        if is_cancel(text) {
            return self
                .run_command(event.user_id, event.chat_id, PanelCommand::Cancel)
                .await;
        }
        if let TextRoute::Command(command) = route_text(text) {
            return self.run_command(event.user_id, event.chat_id, command).await;
        }

        if event.document.is_none() {
            if let Some(state) = self.conversations.get(event.user_id).await {
                return self.handle_pending(event, state).await;
            }
        }

        if let Some(document) = &event.document {
            return self.import_document(event.chat_id, document).await;
        }

        match route_text(text) {
            TextRoute::Command(command) | TextRoute::Menu(command) => {
                self.run_command(event.user_id, event.chat_id, command).await
            }
            TextRoute::ScriptLink => self.import_link(event.chat_id, text).await,
            TextRoute::Unmatched => {
                info!(user_id = event.user_id, "No handler matched");
                Ok(())
            }
        }
    }

    async fn run_command(&self, user_id: i64, chat_id: i64, command: PanelCommand) -> Result<()> {
        if command == PanelCommand::Cancel {
            let text = if self.conversations.clear(user_id).await {
                "❌ Cancelled"
            } else {
                "Nothing to cancel"
            };
            self.messenger.notify(chat_id, text, None).await?;
            return Ok(());
        }

        if self.conversations.clear(user_id).await {
            debug!(user_id, "Pending input abandoned");
        }

        let target = Target::Fresh(chat_id);
        match command {
            PanelCommand::Start => {
                let menu = Layout::Menu(menu_rows());
                self.messenger.notify(chat_id, views::WELCOME, Some(menu)).await?;
                Ok(())
            }
            PanelCommand::Help => {
                self.messenger.notify(chat_id, views::HELP, None).await?;
                Ok(())
            }
            PanelCommand::Tasks => self.show_tasks(target, 0).await,
            PanelCommand::Envs => self.show_envs(target, 0).await,
            PanelCommand::Subs => self.show_subs(target, 0).await,
            PanelCommand::Deps => self.show_deps_overview(target).await,
            PanelCommand::Scripts => self.show_scripts(target, "", 0).await,
            PanelCommand::ClearCache => {
                self.api.clear_cache(chat_id).await;
                info!(user_id, chat_id, "Cache cleared");
                self.messenger
                    .notify(chat_id, "✅ Cache cleared", None)
                    .await?;
                Ok(())
            }
            PanelCommand::Cancel => Ok(()),
        }
    }

    /// Sends or rewrites a view.
    async fn render(&self, target: Target, text: &str, layout: Option<Layout>) -> Result<()> {
        match target {
            Target::Fresh(chat_id) => {
                self.messenger.notify(chat_id, text, layout).await?;
            }
            Target::Replace(message) => self.messenger.edit(message, text, layout).await?,
        }
        Ok(())
    }

    /// Records `pending` and shows the prompt in place of `origin`.
    async fn prompt(
        &self,
        user_id: i64,
        origin: MessageRef,
        pending: PendingAction,
        text: &str,
        back: Action,
    ) -> Result<()> {
        self.conversations.begin(user_id, pending, Some(origin)).await;
        self.render(Target::Replace(origin), text, Some(views::cancel_layout(back)))
            .await
    }

    async fn refresh(&self, chat_id: i64, class: ResourceClass, refresh: bool) {
        if refresh {
            self.api.clear_class(chat_id, class).await;
        }
    }

    async fn report_failure(&self, user_id: i64, chat_id: i64, err: &anyhow::Error) {
        error!(user_id, chat_id, error = %err, "Handler failed");
        self.conversations.clear(user_id).await;
        let text = format!("❌ Operation failed: {}", views::escape(&err.to_string()));
        if let Err(e) = self.messenger.notify(chat_id, &text, None).await {
            warn!(chat_id, error = %e, "Failed to report failure");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::messenger::MockMessenger;
    use crate::panel::client::MockPanelTransport;

    #[tokio::test]
    async fn test_noop_callback_is_acknowledged_only() {
        let transport = MockPanelTransport::new();
        let mut messenger = MockMessenger::new();
        messenger
            .expect_acknowledge()
            .withf(|id, text| id == "cb" && text.as_deref() == Some(PROCESSING))
            .times(1)
            .returning(|_, _| Ok(()));

        bot(transport, messenger).handle_callback(callback("noop")).await;
    }

    #[tokio::test]
    async fn test_unknown_text_is_dropped() {
        let transport = MockPanelTransport::new();
        let messenger = MockMessenger::new();

        bot(transport, messenger).handle_message(text("hello")).await;
    }

    #[tokio::test]
    async fn test_start_sends_menu() {
        let transport = MockPanelTransport::new();
        let mut messenger = MockMessenger::new();
        messenger
            .expect_notify()
            .withf(|_, text, layout| {
                text == views::WELCOME && matches!(layout, Some(Layout::Menu(_)))
            })
            .times(1)
            .returning(|_, _, _| Ok(MESSAGE));

        bot(transport, messenger)
            .handle_command(7, 42, PanelCommand::Start)
            .await;
    }

    #[tokio::test]
    async fn test_command_abandons_pending_input() {
        let transport = MockPanelTransport::new();
        let mut messenger = MockMessenger::new();
        messenger
            .expect_notify()
            .returning(|_, _, _| Ok(MESSAGE));
        let bot = bot(transport, messenger);
        bot.conversations.begin(7, PendingAction::AddEnv, None).await;

        bot.handle_message(text("/help")).await;

        assert!(bot.conversations.get(7).await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_without_pending() {
        let transport = MockPanelTransport::new();
        let mut messenger = MockMessenger::new();
        messenger
            .expect_notify()
            .withf(|_, text, _| text == "Nothing to cancel")
            .times(1)
            .returning(|_, _, _| Ok(MESSAGE));

        bot(transport, messenger).handle_message(text("/cancel")).await;
    }
}
