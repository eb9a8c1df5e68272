use super::views::{self, nav_row, paginate, Target, SCRIPTS_PAGE_SIZE};
use super::PanelBot;
use crate::action::{Action, ScriptAction};
use crate::config::DEFAULT_SCHEDULE;
use crate::conversation::PendingAction;
use crate::messenger::{Button, Layout, MessageRef};
use crate::panel::models::{
    file_paths, folder_paths, join_path, list_folder, resolve_path, split_path, PathMatch,
};
use crate::panel::ResourceClass;
use anyhow::Result;
use tracing::{debug, info};

fn scripts(action: ScriptAction) -> Action {
    Action::Scripts(action)
}

fn browse(folder: &str, page: usize) -> Action {
    scripts(ScriptAction::Browse {
        folder: folder.to_string(),
        page,
    })
}

/// Matches a path that may have been cut to fit a button payload.
fn resolve(candidates: &[String], fragment: &str) -> Option<String> {
    match resolve_path(candidates, fragment) {
        PathMatch::Found(path) => Some(path),
        PathMatch::NotFound => None,
        PathMatch::Ambiguous(count) => {
            debug!(fragment, count, "Truncated path is ambiguous");
            None
        }
    }
}

impl PanelBot {
    pub(super) async fn script_action(
        &self,
        user_id: i64,
        origin: MessageRef,
        action: ScriptAction,
    ) -> Result<()> {
        let chat_id = origin.chat_id;
        let target = Target::Replace(origin);
        match action {
            ScriptAction::Browse { folder, page } => self.show_scripts(target, &folder, page).await,
            ScriptAction::Refresh { folder } => {
                self.api.clear_class(chat_id, ResourceClass::Scripts).await;
                self.show_scripts(target, &folder, 0).await
            }
            ScriptAction::Schedule(fragment) => {
                let tree = self.api.script_tree(chat_id).await?;
                let Some(path) = resolve(&file_paths(&tree), &fragment) else {
                    return self.script_missing(target).await;
                };
                let file_name = split_path(&path).1.to_string();
                let text = format!(
                    "⏰ Send a cron expression to run <code>{}</code>\n\n\
                     Example: <code>0 8 * * *</code>\n\
                     Send <code>d</code> for the default ({DEFAULT_SCHEDULE})",
                    views::escape(&path)
                );
                let back = browse(split_path(&path).0, 0);
                let pending = PendingAction::ScheduleScript { file_name, path };
                self.prompt(user_id, origin, pending, &text, back).await
            }
            ScriptAction::Delete(fragment) => {
                let tree = self.api.script_tree(chat_id).await?;
                let Some(path) = resolve(&file_paths(&tree), &fragment) else {
                    return self.script_missing(target).await;
                };
                let (folder, file_name) = split_path(&path);
                self.api.delete_script(chat_id, file_name, folder).await?;
                info!(user_id, %path, "Script deleted");
                self.show_scripts(target, folder, 0).await
            }
        }
    }

    async fn script_missing(&self, target: Target) -> Result<()> {
        let layout = views::back_layout("Root", browse("", 0));
        self.render(target, "❌ Script or folder not found", Some(layout))
            .await
    }

    /// One folder of the script tree; sub-folders first, then a page of files.
    pub(super) async fn show_scripts(&self, target: Target, folder: &str, page: usize) -> Result<()> {
        let tree = self.api.script_tree(target.chat_id()).await?;
        let folder = if folder.is_empty() {
            String::new()
        } else {
            match resolve(&folder_paths(&tree), folder) {
                Some(folder) => folder,
                None => return self.script_missing(target).await,
            }
        };
        let Some(listing) = list_folder(&tree, &folder) else {
            return self.script_missing(target).await;
        };

        let heading = if folder.is_empty() {
            "/".to_string()
        } else {
            views::escape(&folder)
        };
        let text = format!(
            "📁 <b>Scripts</b> <code>{heading}</code>\n\n📂 {} folders | 📄 {} files",
            listing.folders.len(),
            listing.files.len()
        );

        let mut rows: Vec<Vec<Button>> = Vec::new();
        if !folder.is_empty() {
            rows.push(vec![Button::new("🏠 Root", browse("", 0))]);
        }
        for name in &listing.folders {
            let label = format!("📂 {}", views::clip(name, 28));
            rows.push(vec![Button::new(label, browse(&join_path(&folder, name), 0))]);
        }

        let files = paginate(&listing.files, page, SCRIPTS_PAGE_SIZE);
        for name in files.items {
            let path = join_path(&folder, name);
            rows.push(vec![
                Button::label(format!("📄 {}", views::clip(name, 20))),
                Button::new("⏰", scripts(ScriptAction::Schedule(path.clone()))),
                Button::new("🗑️", scripts(ScriptAction::Delete(path))),
            ]);
        }
        if files.total > 1 {
            rows.push(nav_row(&files, |p| browse(&folder, p)));
        }
        rows.push(vec![Button::new(
            "🔄 Refresh",
            scripts(ScriptAction::Refresh {
                folder: folder.clone(),
            }),
        )]);

        self.render(target, &text, Some(Layout::Inline(rows))).await
    }
}
