use super::views::{self, nav_row, paginate, Target, LIST_PAGE_SIZE};
use super::PanelBot;
use crate::action::{Action, EnvAction};
use crate::conversation::PendingAction;
use crate::messenger::{Button, Layout, MessageRef};
use crate::panel::ResourceClass;
use anyhow::Result;
use std::fmt::Write;
use tracing::info;

fn envs(action: EnvAction) -> Action {
    Action::Envs(action)
}

fn list(page: usize) -> Action {
    envs(EnvAction::List {
        page,
        refresh: false,
    })
}

impl PanelBot {
    pub(super) async fn env_action(
        &self,
        user_id: i64,
        origin: MessageRef,
        action: EnvAction,
    ) -> Result<()> {
        let chat_id = origin.chat_id;
        let target = Target::Replace(origin);
        match action {
            EnvAction::List { page, refresh } => {
                self.refresh(chat_id, ResourceClass::Envs, refresh).await;
                self.show_envs(target, page).await
            }
            EnvAction::Show(id) => self.show_env(target, id).await,
            EnvAction::Enable(id) | EnvAction::Disable(id) => {
                let enabled = matches!(action, EnvAction::Enable(_));
                self.api.set_env_enabled(chat_id, id, enabled).await?;
                info!(user_id, env_id = id, enabled, "Env toggled");
                self.show_env(target, id).await
            }
            EnvAction::Delete(id) => {
                self.api.delete_env(chat_id, id).await?;
                info!(user_id, env_id = id, "Env deleted");
                self.show_envs(target, 0).await
            }
            EnvAction::Edit(id) => {
                let text = "✏️ Send the new entry\n\nFormat: <code>name=value</code>";
                let pending = PendingAction::EditEnv { env_id: id };
                self.prompt(user_id, origin, pending, text, envs(EnvAction::Show(id)))
                    .await
            }
            EnvAction::Create => {
                let text = "➕ <b>New environment variable</b>\n\nFormat: <code>name=value</code>\n\n\
                    Example: <code>JD_COOKIE=pt_key=xxx;</code>";
                self.prompt(user_id, origin, PendingAction::AddEnv, text, list(0))
                    .await
            }
        }
    }

    /// Paged environment list.
    pub(super) async fn show_envs(&self, target: Target, page: usize) -> Result<()> {
        let entries = self.api.envs(target.chat_id()).await?;
        let create = Button::new("➕ New variable", envs(EnvAction::Create));

        if entries.is_empty() {
            let text = "🔑 <b>Environment variables</b>\n\nNo variables yet";
            return self.render(target, text, Some(Layout::single(create))).await;
        }

        let enabled = entries.iter().filter(|e| e.is_enabled()).count();
        let text = format!(
            "🔑 <b>Environment variables</b>\n\nTotal {} | ✅ {enabled} enabled",
            entries.len()
        );

        let page = paginate(&entries, page, LIST_PAGE_SIZE);
        let mut rows: Vec<Vec<Button>> = page
            .items
            .iter()
            .map(|entry| {
                let icon = if entry.is_enabled() { "✅" } else { "🔕" };
                let label = format!("{icon} {}", views::clip(&entry.name, 24));
                vec![Button::new(label, envs(EnvAction::Show(entry.id)))]
            })
            .collect();
        if page.total > 1 {
            rows.push(nav_row(&page, list));
        }
        rows.push(vec![
            Button::new(
                "🔄 Refresh",
                envs(EnvAction::List {
                    page: page.index,
                    refresh: true,
                }),
            ),
            create,
        ]);

        self.render(target, &text, Some(Layout::Inline(rows))).await
    }

    pub(super) async fn show_env(&self, target: Target, id: u64) -> Result<()> {
        let Some(entry) = self.api.env(target.chat_id(), id).await? else {
            let layout = views::back_layout("Back", list(0));
            return self.render(target, "❌ Variable not found", Some(layout)).await;
        };

        let state = if entry.is_enabled() {
            "✅ Enabled"
        } else {
            "🔕 Disabled"
        };
        let mut text = format!(
            "🔑 <b>{}</b>\n\nStatus: {state}\nValue: <code>{}</code>",
            views::escape(&entry.name),
            views::escape(&views::clip_marked(&entry.value, 200)),
        );
        if let Some(remarks) = entry.remarks.as_deref().filter(|r| !r.is_empty()) {
            let _ = write!(text, "\nRemarks: {}", views::escape(remarks));
        }

        let toggle = if entry.is_enabled() {
            Button::new("🔕 Disable", envs(EnvAction::Disable(id)))
        } else {
            Button::new("✅ Enable", envs(EnvAction::Enable(id)))
        };
        let rows = vec![
            vec![toggle, Button::new("✏️ Edit", envs(EnvAction::Edit(id)))],
            vec![
                Button::new("🗑️ Delete", envs(EnvAction::Delete(id))),
                Button::new("⬅️ Back", list(0)),
            ],
        ];

        self.render(target, &text, Some(Layout::Inline(rows))).await
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
    async fn test_list_pages_and_marks_state() {
        let entries: Vec<serde_json::Value> = (1..=10)
            .map(|id| json!({"id": id, "name": format!("VAR_{id}"), "value": "v", "status": id % 2}))
            .collect();
        let mut transport = MockPanelTransport::new();
        transport
            .expect_send()
            .times(1)
            .returning(move |_, _, _, _| ok(json!(entries.clone())));
        let mut messenger = MockMessenger::new();
        messenger.expect_acknowledge().returning(|_, _| Ok(()));
        messenger
            .expect_edit()
            .withf(|_, text, layout| {
                let Some(Layout::Inline(rows)) = layout else { return false };
                text.contains("Total 10 | ✅ 5 enabled")
                    && rows.len() == 4
                    && rows[0][0].text == "🔕 VAR_9"
                    && rows[1][0].text == "✅ VAR_10"
                    && rows[2][1].text == "2/2"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        bot(transport, messenger).handle_callback(callback("envs_1")).await;
    }

    #[tokio::test]
    async fn test_missing_entry_reports_not_found() {
        let mut transport = MockPanelTransport::new();
        transport
            .expect_send()
            .withf(|method, endpoint, _, _| *method == HttpMethod::Get && endpoint == "/open/envs")
            .returning(|_, _, _, _| ok(json!([])));
        let mut messenger = MockMessenger::new();
        messenger.expect_acknowledge().returning(|_, _| Ok(()));
        messenger
            .expect_edit()
            .withf(|_, text, _| text == "❌ Variable not found")
            .times(1)
            .returning(|_, _, _| Ok(()));

        bot(transport, messenger).handle_callback(callback("env_4")).await;
    }

    #[tokio::test]
    async fn test_detail_appends_escaped_remarks() {
        let mut transport = MockPanelTransport::new();
        transport.expect_send().returning(|_, _, _, _| {
            ok(json!([{"id": 4, "name": "TOKEN", "value": "abc", "status": 0, "remarks": "<main>"}]))
        });
        let mut messenger = MockMessenger::new();
        messenger.expect_acknowledge().returning(|_, _| Ok(()));
        messenger
            .expect_edit()
            .withf(|_, text, _| text.ends_with("\nRemarks: &lt;main&gt;"))
            .times(1)
            .returning(|_, _, _| Ok(()));

        bot(transport, messenger).handle_callback(callback("env_4")).await;
    }

    #[tokio::test]
    async fn test_failed_toggle_is_reported() {
        let mut transport = MockPanelTransport::new();
        transport
            .expect_send()
            .withf(|method, _, _, _| *method == HttpMethod::Put)
            .times(1)
            .returning(|_, _, _, _| {
                Err(crate::panel::PanelError::GatewayTimeout(10))
            });
        let mut messenger = MockMessenger::new();
        messenger.expect_acknowledge().returning(|_, _| Ok(()));
        messenger
            .expect_notify()
            .withf(|chat, text, _| *chat == 42 && text.starts_with("❌ Operation failed"))
            .times(1)
            .returning(|_, _, _| Ok(MESSAGE));

        bot(transport, messenger).handle_callback(callback("env_dis_3")).await;
    }
}
