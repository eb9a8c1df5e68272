use super::views::{self, Target};
use super::PanelBot;
use crate::conversation::{parse_input, ConversationState, PendingAction, Submission};
use crate::dispatch::MessageEvent;
use crate::panel::models::DependencyKind;
use anyhow::Result;
use tracing::{info, warn};

impl PanelBot {
    /// Consumes a reply to a pending prompt.
    ///
    /// Invalid input keeps the state for another try. Any completed attempt
    /// clears it, whether the panel accepted the change or not.
    pub(super) async fn handle_pending(
        &self,
        event: &MessageEvent,
        state: ConversationState,
    ) -> Result<()> {
        let submission = match parse_input(&state.pending, &event.text) {
            Ok(submission) => submission,
            Err(e) => {
                let text = format!("❌ {}\n\nSend /cancel to abort", views::escape(&e.to_string()));
                self.messenger.notify(event.chat_id, &text, None).await?;
                return Ok(());
            }
        };

        let outcome = self.complete(event.user_id, event.chat_id, &state, submission).await;
        self.conversations.clear(event.user_id).await;
        outcome
    }

    async fn complete(
        &self,
        user_id: i64,
        chat_id: i64,
        state: &ConversationState,
        submission: Submission,
    ) -> Result<()> {
        let origin = state.origin.map_or(Target::Fresh(chat_id), Target::Replace);
        match (&state.pending, submission) {
            (PendingAction::EditTaskSchedule { task_id }, Submission::Schedule(schedule)) => {
                self.api
                    .update_cron_schedule(chat_id, *task_id, &schedule)
                    .await?;
                info!(user_id, task_id, %schedule, "Task schedule updated");
                let text = format!("✅ Schedule set to <code>{}</code>", views::escape(&schedule));
                self.messenger.notify(chat_id, &text, None).await?;
                self.show_task(origin, *task_id).await
            }
            (
                PendingAction::CreateTask,
                Submission::NewTask {
                    name,
                    command,
                    schedule,
                },
            ) => {
                self.api.create_cron(chat_id, &name, &command, &schedule).await?;
                info!(user_id, %name, "Task created");
                let text = format!("✅ Task <b>{}</b> created", views::escape(&name));
                self.messenger.notify(chat_id, &text, None).await?;
                self.show_tasks(Target::Fresh(chat_id), 0).await
            }
            (PendingAction::ScheduleUploadedScript { file_name }, Submission::Schedule(schedule)) => {
                self.schedule_script(chat_id, file_name, file_name, &schedule).await
            }
            (PendingAction::ScheduleScript { file_name, path }, Submission::Schedule(schedule)) => {
                self.schedule_script(chat_id, file_name, path, &schedule).await
            }
            (PendingAction::AddEnv, Submission::EnvEntry { name, value }) => {
                self.api.create_env(chat_id, &name, &value).await?;
                info!(user_id, %name, "Env created");
                let text = format!("✅ Variable <b>{}</b> added", views::escape(&name));
                self.messenger.notify(chat_id, &text, None).await?;
                self.show_envs(Target::Fresh(chat_id), 0).await
            }
            (PendingAction::EditEnv { env_id }, Submission::EnvEntry { name, value }) => {
                self.api.update_env(chat_id, *env_id, &name, &value).await?;
                info!(user_id, env_id, %name, "Env updated");
                let text = format!("✅ Variable <b>{}</b> updated", views::escape(&name));
                self.messenger.notify(chat_id, &text, None).await?;
                self.show_env(origin, *env_id).await
            }
            (PendingAction::AddSubscription, Submission::NewSubscription(subscription)) => {
                self.api.create_subscription(chat_id, &subscription).await?;
                info!(user_id, name = %subscription.name, "Subscription created");
                let text = format!(
                    "✅ Subscription <b>{}</b> added",
                    views::escape(&subscription.name)
                );
                self.messenger.notify(chat_id, &text, None).await?;
                self.show_subs(Target::Fresh(chat_id), 0).await
            }
            (PendingAction::EditSubscription { sub_id }, Submission::SubscriptionEdit(edit)) => {
                let Some(mut record) = self.api.subscription_record(chat_id, *sub_id).await? else {
                    self.messenger
                        .notify(chat_id, "❌ Subscription not found", None)
                        .await?;
                    return Ok(());
                };
                edit.apply_to(&mut record);
                self.api.update_subscription(chat_id, record).await?;
                info!(user_id, sub_id, "Subscription updated");
                self.messenger
                    .notify(chat_id, "✅ Subscription updated", None)
                    .await?;
                self.show_sub(origin, *sub_id).await
            }
            (PendingAction::AddDependencies { kind }, Submission::Dependencies(names)) => {
                self.add_dependencies(chat_id, *kind, &names).await?;
                self.show_deps(origin, *kind, 0).await
            }
            (pending, submission) => {
                warn!(user_id, ?pending, ?submission, "Input does not fit the pending action");
                Ok(())
            }
        }
    }

    async fn schedule_script(
        &self,
        chat_id: i64,
        name: &str,
        path: &str,
        schedule: &str,
    ) -> Result<()> {
        let command = format!("task {path}");
        self.api.create_cron(chat_id, name, &command, schedule).await?;
        info!(chat_id, %path, %schedule, "Script scheduled");
        let text = format!(
            "✅ Task created\n\nScript: <code>{}</code>\nSchedule: <code>{}</code>",
            views::escape(path),
            views::escape(schedule)
        );
        self.messenger.notify(chat_id, &text, None).await?;
        Ok(())
    }

    async fn add_dependencies(
        &self,
        chat_id: i64,
        kind: DependencyKind,
        names: &[String],
    ) -> Result<()> {
        self.api.add_dependencies(chat_id, kind, names).await?;
        info!(chat_id, %kind, count = names.len(), "Dependencies queued");
        let text = format!(
            "✅ Queued {} {} package(s): <code>{}</code>",
            names.len(),
            kind.label(),
            views::escape(&names.join(" "))
        );
        self.messenger.notify(chat_id, &text, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::test_support::*;
    use crate::messenger::MockMessenger;
    use crate::panel::client::MockPanelTransport;
    use crate::panel::HttpMethod;
    use serde_json::json;

    #[tokio::test]
    async fn test_invalid_input_keeps_state() {
        let transport = MockPanelTransport::new();
        let mut messenger = MockMessenger::new();
        messenger
            .expect_notify()
            .withf(|_, text, _| text.contains("name=value"))
            .times(1)
            .returning(|_, _, _| Ok(MESSAGE));
        let bot = bot(transport, messenger);
        bot.conversations().begin(7, PendingAction::AddEnv, None).await;

        bot.handle_message(text("no separator")).await;

        assert!(bot.conversations().get(7).await.is_some());
    }

    #[tokio::test]
    async fn test_downstream_failure_clears_state() {
        let mut transport = MockPanelTransport::new();
        transport
            .expect_send()
            .withf(|method, _, _, _| *method == HttpMethod::Post)
            .times(1)
            .returning(|_, _, _, _| {
                Ok(crate::panel::ApiResponse {
                    code: 400,
                    data: json!(null),
                    message: Some("duplicate".to_string()),
                })
            });
        let mut messenger = MockMessenger::new();
        messenger
            .expect_notify()
            .withf(|_, text, _| text.contains("duplicate"))
            .times(1)
            .returning(|_, _, _| Ok(MESSAGE));
        let bot = bot(transport, messenger);
        bot.conversations().begin(7, PendingAction::CreateTask, None).await;

        bot.handle_message(text("a|task a.js|0 8 * * *")).await;

        assert!(bot.conversations().get(7).await.is_none());
    }

    #[tokio::test]
    async fn test_edit_of_vanished_subscription() {
        let mut transport = MockPanelTransport::new();
        transport
            .expect_send()
            .withf(|method, _, _, _| *method == HttpMethod::Get)
            .times(1)
            .returning(|_, _, _, _| ok(json!([])));
        let mut messenger = MockMessenger::new();
        messenger
            .expect_notify()
            .withf(|_, text, _| text == "❌ Subscription not found")
            .times(1)
            .returning(|_, _, _| Ok(MESSAGE));
        let bot = bot(transport, messenger);
        bot.conversations()
            .begin(7, PendingAction::EditSubscription { sub_id: 3 }, None)
            .await;

        bot.handle_message(text("||0 6 * * *|")).await;

        assert!(bot.conversations().get(7).await.is_none());
    }

    #[tokio::test]
    async fn test_script_schedule_default() {
        let mut transport = MockPanelTransport::new();
        transport
            .expect_send()
            .withf(|method, endpoint, body, _| {
                *method == HttpMethod::Post
                    && endpoint == "/open/crons"
                    && body.as_ref()
                        == Some(&json!({
                            "name": "sign.js",
                            "command": "task jd/sign.js",
                            "schedule": "0 0 * * *"
                        }))
            })
            .times(1)
            .returning(|_, _, _, _| ok(json!({"id": 1})));
        let mut messenger = MockMessenger::new();
        messenger.expect_notify().times(1).returning(|_, _, _| Ok(MESSAGE));
        let bot = bot(transport, messenger);
        let pending = PendingAction::ScheduleScript {
            file_name: "sign.js".to_string(),
            path: "jd/sign.js".to_string(),
        };
        bot.conversations().begin(7, pending, None).await;

        bot.handle_message(text("d")).await;

        assert!(bot.conversations().get(7).await.is_none());
    }
}
