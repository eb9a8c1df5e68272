//! Messaging collaborator interface
//!
//! The core renders replies through [`Messenger`] and never touches the
//! transport directly. Texts are HTML formatted.

use crate::action::Action;
use async_trait::async_trait;
use thiserror::Error;

/// A message the bot sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    /// Conversation
    pub chat_id: i64,
    /// Message inside the conversation
    pub message_id: i32,
}

/// An inline button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Label
    pub text: String,
    /// Action sent back when pressed
    pub action: Action,
}

impl Button {
    /// Button labelled `text` that triggers `action`.
    pub fn new(text: impl Into<String>, action: Action) -> Self {
        Self {
            text: text.into(),
            action,
        }
    }

    /// Inert button, used for labels and page counters.
    pub fn label(text: impl Into<String>) -> Self {
        Self::new(text, Action::Noop)
    }
}

/// Buttons attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// Rows of inline buttons under the message
    Inline(Vec<Vec<Button>>),
    /// Rows of persistent reply-keyboard labels
    Menu(Vec<Vec<String>>),
}

impl Layout {
    /// Single-button inline layout.
    #[must_use]
    pub fn single(button: Button) -> Self {
        Self::Inline(vec![vec![button]])
    }

    /// Every inline action, row by row; empty for menus.
    #[must_use]
    pub fn actions(&self) -> Vec<&Action> {
        match self {
            Self::Inline(rows) => rows.iter().flatten().map(|b| &b.action).collect(),
            Self::Menu(_) => Vec::new(),
        }
    }
}

/// Transport failures.
#[derive(Debug, Error)]
pub enum MessengerError {
    /// Sending or editing failed
    #[error("Delivery failed: {0}")]
    Delivery(String),
    /// Fetching an attachment failed
    #[error("File download failed: {0}")]
    Download(String),
}

/// Outbound messaging capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Sends a new message.
    async fn notify(
        &self,
        chat_id: i64,
        text: &str,
        layout: Option<Layout>,
    ) -> Result<MessageRef, MessengerError>;

    /// Replaces the text and buttons of an earlier message.
    async fn edit(
        &self,
        target: MessageRef,
        text: &str,
        layout: Option<Layout>,
    ) -> Result<(), MessengerError>;

    /// Answers a button press, optionally with a short toast.
    async fn acknowledge(
        &self,
        interaction_id: &str,
        text: Option<String>,
    ) -> Result<(), MessengerError>;

    /// Downloads an attachment.
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, MessengerError>;
}
