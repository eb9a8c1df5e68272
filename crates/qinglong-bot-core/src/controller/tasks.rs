use super::views::{self, nav_row, paginate, Target, LIST_PAGE_SIZE, LOG_TAIL_CHARS};
use super::PanelBot;
use crate::action::{Action, TaskAction};
use crate::conversation::PendingAction;
use crate::messenger::{Button, Layout, MessageRef};
use crate::panel::api::CronCommand;
use crate::panel::models::{list_folder, resolve_path, Cron, PathMatch};
use crate::panel::{PanelError, ResourceClass};
use anyhow::Result;
use tracing::{debug, info, warn};

fn tasks(action: TaskAction) -> Action {
    Action::Tasks(action)
}

fn list(page: usize) -> Action {
    tasks(TaskAction::List {
        page,
        refresh: false,
    })
}

fn status_icon(cron: &Cron) -> &'static str {
    if cron.is_running {
        "🏃"
    } else if cron.is_disabled {
        "🔕"
    } else {
        "✅"
    }
}

fn cron_name(cron: &Cron) -> String {
    cron.name
        .clone()
        .unwrap_or_else(|| format!("Task {}", cron.id))
}

impl PanelBot {
    pub(super) async fn task_action(
        &self,
        user_id: i64,
        origin: MessageRef,
        action: TaskAction,
    ) -> Result<()> {
        let chat_id = origin.chat_id;
        let target = Target::Replace(origin);
        let (command, id) = match action {
            TaskAction::List { page, refresh } => {
                self.refresh(chat_id, ResourceClass::Tasks, refresh).await;
                return self.show_tasks(target, page).await;
            }
            TaskAction::Show(id) => return self.show_task(target, id).await,
            TaskAction::Log(id) => return self.show_task_log(target, id).await,
            TaskAction::Delete(id) => {
                self.api.delete_cron(chat_id, id).await?;
                info!(user_id, task_id = id, "Task deleted");
                return self.show_tasks(target, 0).await;
            }
            TaskAction::EditSchedule(id) => {
                let text = "⏰ Send the new cron expression\n\nExample: <code>0 8 * * *</code>";
                let pending = PendingAction::EditTaskSchedule { task_id: id };
                let back = tasks(TaskAction::Show(id));
                return self.prompt(user_id, origin, pending, text, back).await;
            }
            TaskAction::Create => {
                let text = "➕ <b>New task</b>\n\nSend: <code>name|command|schedule</code>\n\n\
                    Example: <code>Daily sign-in|task sign.js|0 8 * * *</code>";
                return self
                    .prompt(user_id, origin, PendingAction::CreateTask, text, list(0))
                    .await;
            }
            TaskAction::ScheduleUpload(fragment) => {
                return self.ask_upload_schedule(user_id, chat_id, &fragment).await;
            }
            TaskAction::Run(id) => (CronCommand::Run, id),
            TaskAction::Stop(id) => (CronCommand::Stop, id),
            TaskAction::Enable(id) => (CronCommand::Enable, id),
            TaskAction::Disable(id) => (CronCommand::Disable, id),
        };

        self.api.cron_command(chat_id, command, id).await?;
        info!(user_id, task_id = id, ?command, "Task updated");
        self.show_task(target, id).await
    }

    /// Uploads land in the root folder; the button may carry a cut name.
    async fn ask_upload_schedule(&self, user_id: i64, chat_id: i64, fragment: &str) -> Result<()> {
        let tree = self.api.script_tree(chat_id).await?;
        let root_files = list_folder(&tree, "").map(|root| root.files).unwrap_or_default();
        let file_name = match resolve_path(&root_files, fragment) {
            PathMatch::Found(name) => name,
            PathMatch::NotFound => {
                self.messenger
                    .notify(chat_id, "❌ Uploaded script not found", None)
                    .await?;
                return Ok(());
            }
            PathMatch::Ambiguous(count) => {
                debug!(fragment, count, "Uploaded script name is ambiguous");
                let text = format!(
                    "❌ {count} scripts start with <code>{}</code>\n\nSchedule it from /scripts",
                    views::escape(fragment)
                );
                self.messenger.notify(chat_id, &text, None).await?;
                return Ok(());
            }
        };

        let text = format!(
            "⏰ Send a cron expression for <code>{}</code>\n\n\
             Example: <code>0 8 * * *</code>\n\
             Send <code>d</code> for the default ({})",
            views::escape(&file_name),
            crate::config::DEFAULT_SCHEDULE,
        );
        let layout = views::cancel_layout(list(0));
        let sent = self.messenger.notify(chat_id, &text, Some(layout)).await?;
        let pending = PendingAction::ScheduleUploadedScript { file_name };
        self.conversations.begin(user_id, pending, Some(sent)).await;
        Ok(())
    }

    /// Paged task list.
    pub(super) async fn show_tasks(&self, target: Target, page: usize) -> Result<()> {
        let crons = self.api.crons(target.chat_id()).await?;
        let create = Button::new("➕ New task", tasks(TaskAction::Create));

        if crons.is_empty() {
            let layout = Layout::single(create);
            return self
                .render(target, "📋 <b>Scheduled tasks</b>\n\nNo tasks yet", Some(layout))
                .await;
        }

        let running = crons.iter().filter(|c| c.is_running).count();
        let disabled = crons.iter().filter(|c| c.is_disabled).count();
        let text = format!(
            "📋 <b>Scheduled tasks</b>\n\nTotal {} | 🏃 {running} running | 🔕 {disabled} disabled",
            crons.len()
        );

        let page = paginate(&crons, page, LIST_PAGE_SIZE);
        let mut rows: Vec<Vec<Button>> = page
            .items
            .iter()
            .map(|cron| {
                let label = format!("{} {}", status_icon(cron), views::clip(&cron_name(cron), 24));
                vec![Button::new(label, tasks(TaskAction::Show(cron.id)))]
            })
            .collect();
        if page.total > 1 {
            rows.push(nav_row(&page, list));
        }
        rows.push(vec![
            Button::new(
                "🔄 Refresh",
                tasks(TaskAction::List {
                    page: page.index,
                    refresh: true,
                }),
            ),
            create,
        ]);

        self.render(target, &text, Some(Layout::Inline(rows))).await
    }

    pub(super) async fn show_task(&self, target: Target, id: u64) -> Result<()> {
        let Some(cron) = self.api.cron(target.chat_id(), id).await? else {
            let layout = views::back_layout("Back", list(0));
            return self.render(target, "❌ Task not found", Some(layout)).await;
        };

        let state = if cron.is_running {
            "🏃 Running"
        } else if cron.is_disabled {
            "🔕 Disabled"
        } else {
            "✅ Idle"
        };
        let text = format!(
            "📋 <b>{}</b>\n\nStatus: {state}\nSchedule: <code>{}</code>\nCommand: <code>{}</code>",
            views::escape(&cron_name(&cron)),
            views::escape(cron.schedule.as_deref().unwrap_or("-")),
            views::escape(cron.command.as_deref().unwrap_or("-")),
        );

        let run_or_stop = if cron.is_running {
            Button::new("⏹ Stop", tasks(TaskAction::Stop(id)))
        } else {
            Button::new("▶️ Run", tasks(TaskAction::Run(id)))
        };
        let toggle = if cron.is_disabled {
            Button::new("✅ Enable", tasks(TaskAction::Enable(id)))
        } else {
            Button::new("🔕 Disable", tasks(TaskAction::Disable(id)))
        };
        let rows = vec![
            vec![run_or_stop, toggle],
            vec![
                Button::new("📄 Log", tasks(TaskAction::Log(id))),
                Button::new("⏰ Schedule", tasks(TaskAction::EditSchedule(id))),
            ],
            vec![
                Button::new("🗑️ Delete", tasks(TaskAction::Delete(id))),
                Button::new("⬅️ Back", list(0)),
            ],
        ];

        self.render(target, &text, Some(Layout::Inline(rows))).await
    }

    async fn show_task_log(&self, target: Target, id: u64) -> Result<()> {
        let name = match self.api.cron(target.chat_id(), id).await {
            Ok(Some(cron)) => cron_name(&cron),
            Ok(None) | Err(_) => format!("Task {id}"),
        };

        let body = match self.api.cron_log(id).await {
            Ok(Some(log)) => format!("<pre>{}</pre>", views::escape(&views::tail(&log, LOG_TAIL_CHARS))),
            Ok(None) => "No log output yet".to_string(),
            Err(PanelError::DownstreamRejected(reason)) => {
                warn!(task_id = id, %reason, "Log fetch rejected");
                format!("❌ Failed to fetch log: {}", views::escape(&reason))
            }
            Err(e) => return Err(e.into()),
        };

        let text = format!("📄 <b>{}</b> log\n\n{body}", views::escape(&name));
        let rows = vec![vec![
            Button::new("🔄 Refresh", tasks(TaskAction::Log(id))),
            Button::new("⬅️ Back", tasks(TaskAction::Show(id))),
        ]];
        self.render(target, &text, Some(Layout::Inline(rows))).await
    }
}
