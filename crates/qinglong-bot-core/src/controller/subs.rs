use super::views::{self, nav_row, paginate, Target, LIST_PAGE_SIZE};
use super::PanelBot;
use crate::action::{Action, SubAction};
use crate::conversation::PendingAction;
use crate::messenger::{Button, Layout, MessageRef};
use crate::panel::api::SubCommand;
use crate::panel::models::Subscription;
use crate::panel::ResourceClass;
use anyhow::Result;
use tracing::info;

fn subs(action: SubAction) -> Action {
    Action::Subs(action)
}

fn list(page: usize) -> Action {
    subs(SubAction::List {
        page,
        refresh: false,
    })
}

fn sub_name(sub: &Subscription) -> String {
    sub.name
        .clone()
        .unwrap_or_else(|| format!("Subscription {}", sub.id))
}

const CREATE_PROMPT: &str = "➕ <b>New subscription</b>\n\n\
    Format: <code>name|url|schedule|branch</code>\n\
    Schedule and branch are optional\n\n\
    Example: <code>scripts|https://github.com/user/repo.git|0 0 * * *|main</code>";

const EDIT_PROMPT: &str = "✏️ <b>Edit subscription</b>\n\n\
    Format: <code>name|url|schedule|branch</code>\n\
    Leave a field empty to keep it\n\n\
    Example: <code>||0 6 * * *|</code> changes only the schedule";

impl PanelBot {
    pub(super) async fn sub_action(
        &self,
        user_id: i64,
        origin: MessageRef,
        action: SubAction,
    ) -> Result<()> {
        let chat_id = origin.chat_id;
        let target = Target::Replace(origin);
        let (command, id) = match action {
            SubAction::List { page, refresh } => {
                self.refresh(chat_id, ResourceClass::Subs, refresh).await;
                return self.show_subs(target, page).await;
            }
            SubAction::Show(id) => return self.show_sub(target, id).await,
            SubAction::Delete(id) => {
                self.api.delete_subscription(chat_id, id).await?;
                info!(user_id, sub_id = id, "Subscription deleted");
                return self.show_subs(target, 0).await;
            }
            SubAction::Edit(id) => {
                let pending = PendingAction::EditSubscription { sub_id: id };
                let back = subs(SubAction::Show(id));
                return self.prompt(user_id, origin, pending, EDIT_PROMPT, back).await;
            }
            SubAction::Create => {
                let pending = PendingAction::AddSubscription;
                return self.prompt(user_id, origin, pending, CREATE_PROMPT, list(0)).await;
            }
            SubAction::Run(id) => (SubCommand::Run, id),
            SubAction::Enable(id) => (SubCommand::Enable, id),
            SubAction::Disable(id) => (SubCommand::Disable, id),
        };

        self.api.sub_command(chat_id, command, id).await?;
        info!(user_id, sub_id = id, ?command, "Subscription updated");
        self.show_sub(target, id).await
    }

    /// Paged subscription list.
    pub(super) async fn show_subs(&self, target: Target, page: usize) -> Result<()> {
        let all = self.api.subscriptions(target.chat_id()).await?;
        let create = Button::new("➕ New subscription", subs(SubAction::Create));

        if all.is_empty() {
            let text = "📦 <b>Subscriptions</b>\n\nNo subscriptions yet";
            return self.render(target, text, Some(Layout::single(create))).await;
        }

        let disabled = all.iter().filter(|s| s.is_disabled).count();
        let text = format!(
            "📦 <b>Subscriptions</b>\n\nTotal {} | 🔕 {disabled} disabled",
            all.len()
        );

        let page = paginate(&all, page, LIST_PAGE_SIZE);
        let mut rows: Vec<Vec<Button>> = page
            .items
            .iter()
            .map(|sub| {
                let icon = if sub.is_disabled { "🔕" } else { "✅" };
                let label = format!("{icon} {}", views::clip(&sub_name(sub), 24));
                vec![Button::new(label, subs(SubAction::Show(sub.id)))]
            })
            .collect();
        if page.total > 1 {
            rows.push(nav_row(&page, list));
        }
        rows.push(vec![
            Button::new(
                "🔄 Refresh",
                subs(SubAction::List {
                    page: page.index,
                    refresh: true,
                }),
            ),
            create,
        ]);

        self.render(target, &text, Some(Layout::Inline(rows))).await
    }

    /// Subscription detail view.
    pub(super) async fn show_sub(&self, target: Target, id: u64) -> Result<()> {
        let Some(sub) = self.api.subscription(target.chat_id(), id).await? else {
            let layout = views::back_layout("Back", list(0));
            return self.render(target, "❌ Subscription not found", Some(layout)).await;
        };

        let state = if sub.is_disabled {
            "🔕 Disabled"
        } else {
            "✅ Enabled"
        };
        let text = format!(
            "📦 <b>{}</b>\n\nStatus: {state}\nURL: <code>{}</code>\nSchedule: <code>{}</code>\nBranch: <code>{}</code>",
            views::escape(&sub_name(&sub)),
            views::escape(sub.url.as_deref().unwrap_or("-")),
            views::escape(sub.schedule.as_deref().unwrap_or("-")),
            views::escape(sub.branch.as_deref().filter(|b| !b.is_empty()).unwrap_or("default")),
        );

        let toggle = if sub.is_disabled {
            Button::new("✅ Enable", subs(SubAction::Enable(id)))
        } else {
            Button::new("🔕 Disable", subs(SubAction::Disable(id)))
        };
        let rows = vec![
            vec![Button::new("▶️ Pull now", subs(SubAction::Run(id))), toggle],
            vec![
                Button::new("✏️ Edit", subs(SubAction::Edit(id))),
                Button::new("🗑️ Delete", subs(SubAction::Delete(id))),
            ],
            vec![Button::new("⬅️ Back", list(0))],
        ];

        self.render(target, &text, Some(Layout::Inline(rows))).await
    }
}
