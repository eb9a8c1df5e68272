use super::views::{self, nav_row, paginate, Target, DEPS_PAGE_SIZE};
use super::PanelBot;
use crate::action::{Action, DepAction};
use crate::conversation::PendingAction;
use crate::messenger::{Button, Layout, MessageRef};
use crate::panel::models::{DependencyKind, InstallState};
use crate::panel::ResourceClass;
use anyhow::Result;
use futures_util::future::join_all;
use std::fmt::Write;
use tracing::{info, warn};

fn deps(action: DepAction) -> Action {
    Action::Deps(action)
}

fn list(kind: DependencyKind, page: usize) -> Action {
    deps(DepAction::List {
        kind,
        page,
        refresh: false,
    })
}

const fn kind_icon(kind: DependencyKind) -> &'static str {
    match kind {
        DependencyKind::Python3 => "🐍",
        DependencyKind::NodeJs => "📗",
        DependencyKind::Linux => "🐧",
    }
}

const fn state_icon(state: InstallState) -> &'static str {
    match state {
        InstallState::Installed => "✅",
        InstallState::Installing => "⏳",
        InstallState::Failed => "❌",
    }
}

impl PanelBot {
    pub(super) async fn dep_action(
        &self,
        user_id: i64,
        origin: MessageRef,
        action: DepAction,
    ) -> Result<()> {
        let chat_id = origin.chat_id;
        let target = Target::Replace(origin);
        match action {
            DepAction::Overview { refresh } => {
                self.refresh(chat_id, ResourceClass::Deps, refresh).await;
                self.show_deps_overview(target).await
            }
            DepAction::List {
                kind,
                page,
                refresh,
            } => {
                self.refresh(chat_id, ResourceClass::Deps, refresh).await;
                self.show_deps(target, kind, page).await
            }
            DepAction::Reinstall { id, kind } => {
                self.api.reinstall_dependency(chat_id, id).await?;
                info!(user_id, dep_id = id, %kind, "Dependency reinstall queued");
                self.show_deps(target, kind, 0).await
            }
            DepAction::Delete { id, kind } => {
                self.api.delete_dependency(chat_id, id).await?;
                info!(user_id, dep_id = id, %kind, "Dependency deleted");
                self.show_deps(target, kind, 0).await
            }
            DepAction::Add(kind) => {
                let text = format!(
                    "➕ <b>Add {} dependencies</b>\n\nSend package names separated by spaces or new lines",
                    kind.label()
                );
                let pending = PendingAction::AddDependencies { kind };
                self.prompt(user_id, origin, pending, &text, list(kind, 0)).await
            }
        }
    }

    /// Per-kind counts, fetched concurrently. A failed kind counts as empty.
    pub(super) async fn show_deps_overview(&self, target: Target) -> Result<()> {
        let chat_id = target.chat_id();
        let counts = join_all(
            DependencyKind::ALL
                .into_iter()
                .map(|kind| async move { (kind, self.api.dependencies(chat_id, kind).await) }),
        )
        .await;

        let mut text = "📚 <b>Dependencies</b>\n".to_string();
        let mut rows = Vec::with_capacity(DependencyKind::ALL.len() + 1);
        for (kind, result) in counts {
            let count = result.map_or_else(
                |e| {
                    warn!(%kind, error = %e, "Dependency count unavailable");
                    0
                },
                |items| items.len(),
            );
            let _ = write!(text, "\n{} {}: {count}", kind_icon(kind), kind.label());
            let label = format!("{} {} ({count})", kind_icon(kind), kind.label());
            rows.push(vec![Button::new(label, list(kind, 0))]);
        }
        rows.push(vec![Button::new(
            "🔄 Refresh",
            deps(DepAction::Overview { refresh: true }),
        )]);

        self.render(target, &text, Some(Layout::Inline(rows))).await
    }

    pub(super) async fn show_deps(&self, target: Target, kind: DependencyKind, page: usize) -> Result<()> {
        let items = self.api.dependencies(target.chat_id(), kind).await?;
        let add = Button::new("➕ Add", deps(DepAction::Add(kind)));
        let back = Button::new("⬅️ Back", deps(DepAction::Overview { refresh: false }));
        let title = format!("{} <b>{} dependencies</b>", kind_icon(kind), kind.label());

        if items.is_empty() {
            let text = format!("{title}\n\nNothing installed");
            let layout = Layout::Inline(vec![vec![add, back]]);
            return self.render(target, &text, Some(layout)).await;
        }

        let text = format!("{title}\n\nTotal {}", items.len());
        let page = paginate(&items, page, DEPS_PAGE_SIZE);
        let mut rows: Vec<Vec<Button>> = page
            .items
            .iter()
            .map(|dep| {
                let label = format!("{} {}", state_icon(dep.state()), views::clip(&dep.name, 20));
                vec![
                    Button::label(label),
                    Button::new("🔄", deps(DepAction::Reinstall { id: dep.id, kind })),
                    Button::new("🗑️", deps(DepAction::Delete { id: dep.id, kind })),
                ]
            })
            .collect();
        if page.total > 1 {
            rows.push(nav_row(&page, |p| list(kind, p)));
        }
        rows.push(vec![
            Button::new(
                "🔄 Refresh",
                deps(DepAction::List {
                    kind,
                    page: page.index,
                    refresh: true,
                }),
            ),
            add,
            back,
        ]);

        self.render(target, &text, Some(Layout::Inline(rows))).await
    }
}
