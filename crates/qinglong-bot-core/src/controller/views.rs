//! Shared rendering helpers.

use crate::action::Action;
use crate::messenger::{Button, Layout, MessageRef};

/// Tasks, entries and subscriptions per page.
pub const LIST_PAGE_SIZE: usize = 8;
/// Dependencies per page.
pub const DEPS_PAGE_SIZE: usize = 6;
/// Script files per page; folders are always listed in full.
pub const SCRIPTS_PAGE_SIZE: usize = 5;
/// Log tail shown for a task.
pub const LOG_TAIL_CHARS: usize = 3000;

/// Where a rendered view goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Send a new message to the chat
    Fresh(i64),
    /// Rewrite an existing message
    Replace(MessageRef),
}

impl Target {
    /// Conversation the view belongs to.
    #[must_use]
    pub const fn chat_id(self) -> i64 {
        match self {
            Self::Fresh(chat_id) => chat_id,
            Self::Replace(message) => message.chat_id,
        }
    }
}

/// One page of a list.
#[derive(Debug, PartialEq, Eq)]
pub struct Page<'a, T> {
    /// Items on this page
    pub items: &'a [T],
    /// Zero-based page, clamped to the last one
    pub index: usize,
    /// At least 1
    pub total: usize,
}

/// Slices `items` into pages of `size` and picks `page`, clamped.
#[must_use]
pub fn paginate<T>(items: &[T], page: usize, size: usize) -> Page<'_, T> {
    let size = size.max(1);
    let total = items.len().div_ceil(size).max(1);
    let index = page.min(total - 1);
    let start = (index * size).min(items.len());
    let end = (start + size).min(items.len());
    Page {
        items: &items[start..end],
        index,
        total,
    }
}

/// `⬅️ | n/total | ➡️` navigation row.
pub fn nav_row<T>(page: &Page<'_, T>, to: impl Fn(usize) -> Action) -> Vec<Button> {
    let mut row = Vec::with_capacity(3);
    if page.index > 0 {
        row.push(Button::new("⬅️", to(page.index - 1)));
    }
    row.push(Button::label(format!("{}/{}", page.index + 1, page.total)));
    if page.index + 1 < page.total {
        row.push(Button::new("➡️", to(page.index + 1)));
    }
    row
}

/// Escapes text for HTML-formatted messages.
#[must_use]
pub fn escape(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}

/// First `max` characters of `text`.
#[must_use]
pub fn clip(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// First `max` characters of `text`, with `..` when cut.
#[must_use]
pub fn clip_marked(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}..", clip(text, max))
    } else {
        text.to_string()
    }
}

/// Last `max` characters of `text`, marked when cut.
#[must_use]
pub fn tail(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let kept: String = text.chars().skip(count - max).collect();
    format!("...(truncated)\n{kept}")
}

/// Layout with a single cancel button leading to `back`.
#[must_use]
pub fn cancel_layout(back: Action) -> Layout {
    Layout::single(Button::new("❌ Cancel", back))
}

/// Layout with a single back button leading to `back`.
#[must_use]
pub fn back_layout(label: &str, back: Action) -> Layout {
    Layout::single(Button::new(format!("⬅️ {label}"), back))
}

/// Greeting sent by `/start`.
pub const WELCOME: &str = "🐉 <b>Qinglong Panel Bot</b>\n\n\
    • Cached panel data\n\
    • Proactive token refresh\n\
    • Parallel requests\n\n\
    Pick a section below or use a command.\n\n\
    💡 Send a script file or link to add it to the panel";

/// Text sent by `/help`.
pub const HELP: &str = "🐉 <b>Qinglong Panel Bot help</b>\n\n\
    /tasks - 📋 Scheduled tasks\n\
    /envs - 🔑 Environment variables\n\
    /subs - 📦 Subscriptions\n\
    /deps - 📚 Dependencies\n\
    /scripts - 📁 Scripts\n\
    /clearcache - 🗑️ Clear cached data\n\
    /cancel - ❌ Abort the current input\n\n\
    <b>📤 Adding scripts</b>\n\
    1. Send a .js/.py/.sh/.ts file\n\
    2. Send a GitHub/Gitee file link\n\
    3. Send a direct link ending in a script extension\n\n\
    💡 GitHub blob links are converted to raw links\n\
    ⚡ Panel data is cached for faster replies";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_clamps() {
        let items: Vec<u32> = (0..17).collect();
        let last = paginate(&items, 5, 8);
        assert_eq!(last.index, 2);
        assert_eq!(last.total, 3);
        assert_eq!(last.items, &[16]);

        let empty: Vec<u32> = Vec::new();
        let page = paginate(&empty, 3, 8);
        assert_eq!((page.index, page.total, page.items.len()), (0, 1, 0));
    }

    #[test]
    fn test_nav_row_edges() {
        let items: Vec<u32> = (0..20).collect();
        let first = nav_row(&paginate(&items, 0, 8), |_| Action::Noop);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].text, "1/3");

        let middle = nav_row(&paginate(&items, 1, 8), |_| Action::Noop);
        assert_eq!(middle.len(), 3);
    }

    #[test]
    fn test_tail_and_clip() {
        assert_eq!(tail("abcdef", 10), "abcdef");
        assert_eq!(tail("abcdef", 2), "...(truncated)\nef");
        assert_eq!(clip("日本語テキスト", 3), "日本語");
        assert_eq!(clip_marked("abcdef", 3), "abc..");
        assert_eq!(clip_marked("abc", 3), "abc");
        assert_eq!(escape("<b>&"), "&lt;b&gt;&amp;");
    }
}
