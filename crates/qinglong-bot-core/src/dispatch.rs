//! Inbound events and text routing.

use lazy_regex::lazy_regex;

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Transport file handle
    pub file_id: String,
    /// Original file name
    pub file_name: Option<String>,
    /// Size in bytes, when known
    pub size: Option<u64>,
}

/// A text or document message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    /// Sender
    pub user_id: i64,
    /// Conversation
    pub chat_id: i64,
    /// Message text or caption, possibly empty
    pub text: String,
    /// Attached document
    pub document: Option<Attachment>,
}

/// An inline button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    /// Presser
    pub user_id: i64,
    /// Conversation
    pub chat_id: i64,
    /// Message carrying the button
    pub message_id: i32,
    /// Raw button payload
    pub data: String,
    /// Id used to acknowledge the press
    pub interaction_id: String,
}

/// Slash commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelCommand {
    /// Greeting and menu keyboard
    Start,
    /// Usage help
    Help,
    /// Scheduled tasks
    Tasks,
    /// Environment entries
    Envs,
    /// Subscriptions
    Subs,
    /// Dependencies
    Deps,
    /// Script tree
    Scripts,
    /// Abandon pending input
    Cancel,
    /// Drop this chat's cache
    ClearCache,
}

impl PanelCommand {
    /// Parses `/name` or `/name@bot`, ignoring arguments.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        let name = first.strip_prefix('/')?.split('@').next()?;
        Some(match name.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "tasks" => Self::Tasks,
            "envs" => Self::Envs,
            "subs" => Self::Subs,
            "deps" => Self::Deps,
            "scripts" => Self::Scripts,
            "cancel" => Self::Cancel,
            "clearcache" => Self::ClearCache,
            _ => return None,
        })
    }
}

/// Reply-keyboard labels and the command each one stands for.
pub const MENU: &[(&str, PanelCommand)] = &[
    ("📋 Tasks", PanelCommand::Tasks),
    ("🔑 Envs", PanelCommand::Envs),
    ("📦 Subscriptions", PanelCommand::Subs),
    ("📚 Dependencies", PanelCommand::Deps),
    ("📁 Scripts", PanelCommand::Scripts),
    ("❓ Help", PanelCommand::Help),
];

/// Reply-keyboard rows, two labels per row.
#[must_use]
pub fn menu_rows() -> Vec<Vec<String>> {
    MENU.chunks(2)
        .map(|row| row.iter().map(|(label, _)| (*label).to_string()).collect())
        .collect()
}

/// How a plain (non-pending) text message is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextRoute {
    /// A slash command
    Command(PanelCommand),
    /// A reply-keyboard button
    Menu(PanelCommand),
    /// A link to a script to import
    ScriptLink,
    /// Nothing the bot understands
    Unmatched,
}

/// Whether `text` links to an importable script.
#[must_use]
pub fn is_script_link(text: &str) -> bool {
    static RE_DIRECT_SCRIPT: lazy_regex::Lazy<regex::Regex> =
        lazy_regex!(r"(?i)https?://\S*\.(js|py|sh|ts)$");

    ["github.com", "raw.githubusercontent.com", "gitee.com"]
        .iter()
        .any(|host| text.contains(host))
        || RE_DIRECT_SCRIPT.is_match(text.trim())
}

/// Routes a text message that is not answering a pending prompt.
#[must_use]
pub fn route_text(text: &str) -> TextRoute {
    let text = text.trim();
    if text.starts_with('/') {
        return PanelCommand::parse(text).map_or(TextRoute::Unmatched, TextRoute::Command);
    }
    if is_script_link(text) {
        return TextRoute::ScriptLink;
    }
    MENU.iter()
        .find(|(label, _)| {
            *label == text
                || label
                    .split_once(' ')
                    .is_some_and(|(_, word)| word.eq_ignore_ascii_case(text))
        })
        .map_or(TextRoute::Unmatched, |(_, command)| TextRoute::Menu(*command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        assert_eq!(PanelCommand::parse("/tasks"), Some(PanelCommand::Tasks));
        assert_eq!(PanelCommand::parse("/clearcache@ql_bot"), Some(PanelCommand::ClearCache));
        assert_eq!(PanelCommand::parse("/deps extra args"), Some(PanelCommand::Deps));
        assert_eq!(PanelCommand::parse("/unknown"), None);
        assert_eq!(PanelCommand::parse("tasks"), None);
    }

    #[test]
    fn test_menu_labels_route() {
        assert_eq!(route_text("📋 Tasks"), TextRoute::Menu(PanelCommand::Tasks));
        assert_eq!(route_text("scripts"), TextRoute::Menu(PanelCommand::Scripts));
        assert_eq!(route_text("❓ Help"), TextRoute::Menu(PanelCommand::Help));
        assert_eq!(route_text("hello there"), TextRoute::Unmatched);
    }

    #[test]
    fn test_script_links() {
        assert!(is_script_link("https://github.com/user/repo/blob/main/a.js"));
        assert!(is_script_link("look: https://gitee.com/u/r/blob/master/b.py"));
        assert!(is_script_link("https://example.com/scripts/c.SH"));
        assert!(!is_script_link("https://example.com/page.html"));
        assert_eq!(
            route_text("https://cdn.example.com/d.ts"),
            TextRoute::ScriptLink
        );
    }

    #[test]
    fn test_commands_take_precedence() {
        assert_eq!(route_text("/help"), TextRoute::Command(PanelCommand::Help));
        assert_eq!(route_text("/nope"), TextRoute::Unmatched);
    }

    #[test]
    fn test_menu_rows_cover_every_label() {
        let rows = menu_rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.iter().flatten().count(), MENU.len());
    }
}
