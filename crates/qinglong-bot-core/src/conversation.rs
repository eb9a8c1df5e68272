//! Pending multi-step conversations
//!
//! A handler that needs free-text follow-up records a [`PendingAction`]
//! for the user. The next non-command message is parsed with
//! [`parse_input`] according to that action's grammar. One pending action
//! per user; starting another overwrites it. States expire after the
//! configured TTL.

use crate::config::DEFAULT_SCHEDULE;
use crate::messenger::MessageRef;
use crate::panel::models::{DependencyKind, NewSubscription, SubscriptionEdit};
use moka::future::Cache;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Keyword that abandons any pending action.
pub const CANCEL_KEYWORD: &str = "/cancel";

/// What the bot is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    /// New cron expression for a task
    EditTaskSchedule {
        /// Task being edited
        task_id: u64,
    },
    /// `name|command|schedule`
    CreateTask,
    /// Schedule for a script just uploaded to the root folder
    ScheduleUploadedScript {
        /// Uploaded file
        file_name: String,
    },
    /// `name=value`
    AddEnv,
    /// `name=value` replacing an entry
    EditEnv {
        /// Entry being edited
        env_id: u64,
    },
    /// `name|url[|schedule[|branch]]`
    AddSubscription,
    /// `name|url|schedule|branch`, blanks keep the current value
    EditSubscription {
        /// Subscription being edited
        sub_id: u64,
    },
    /// Whitespace-separated package names
    AddDependencies {
        /// Package manager
        kind: DependencyKind,
    },
    /// Schedule for running an existing script as a task
    ScheduleScript {
        /// Script file name
        file_name: String,
        /// Full path inside the script tree
        path: String,
    },
}

/// A user's in-progress interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationState {
    /// Owner
    pub user_id: i64,
    /// Expected input
    pub pending: PendingAction,
    /// Message that prompted for the input
    pub origin: Option<MessageRef>,
    /// The state is ignored from this instant on
    pub expires_at: Instant,
}

/// Per-user pending actions with bounded lifetime.
#[derive(Clone)]
pub struct ConversationStore {
    states: Cache<i64, ConversationState>,
    ttl: Duration,
}

impl ConversationStore {
    /// Store whose states live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let states = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(ttl)
            .build();
        Self { states, ttl }
    }

    /// Starts waiting for input, replacing any earlier pending action.
    pub async fn begin(&self, user_id: i64, pending: PendingAction, origin: Option<MessageRef>) {
        debug!(user_id, ?pending, "Awaiting input");
        let state = ConversationState {
            user_id,
            pending,
            origin,
            expires_at: Instant::now() + self.ttl,
        };
        self.states.insert(user_id, state).await;
    }

    /// The user's live pending state.
    pub async fn get(&self, user_id: i64) -> Option<ConversationState> {
        let state = self.states.get(&user_id).await?;
        if Instant::now() >= state.expires_at {
            debug!(user_id, "Pending input expired");
            self.states.invalidate(&user_id).await;
            return None;
        }
        Some(state)
    }

    /// Forgets the user's pending state; returns whether one was live.
    pub async fn clear(&self, user_id: i64) -> bool {
        let live = self.get(user_id).await.is_some();
        self.states.invalidate(&user_id).await;
        live
    }
}

/// Rejected follow-up input. The pending state is kept for a retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Not a usable cron expression
    #[error("Invalid cron expression `{0}`: expected 5 or 6 fields, e.g. 0 8 * * *")]
    Schedule(String),
    /// Wrong task format
    #[error("Invalid format, use: name|command|schedule")]
    TaskFormat,
    /// Task field left blank
    #[error("Name, command and schedule must not be empty")]
    TaskFieldsEmpty,
    /// Wrong entry format
    #[error("Invalid format, use: name=value")]
    EnvFormat,
    /// Entry field left blank
    #[error("Name and value must not be empty")]
    EnvFieldsEmpty,
    /// Wrong subscription format
    #[error("Invalid format, use: name|url|schedule|branch")]
    SubscriptionFormat,
    /// Subscription name or URL left blank
    #[error("Name and URL must not be empty")]
    SubscriptionFieldsEmpty,
    /// Nothing to install
    #[error("Enter at least one dependency name")]
    NoDependencies,
}

/// Parsed follow-up input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// A cron expression
    Schedule(String),
    /// A complete task
    NewTask {
        /// Display name
        name: String,
        /// Command line
        command: String,
        /// Cron expression
        schedule: String,
    },
    /// `name=value`
    EnvEntry {
        /// Variable name
        name: String,
        /// Variable value
        value: String,
    },
    /// A complete subscription
    NewSubscription(NewSubscription),
    /// Overrides for an existing subscription
    SubscriptionEdit(SubscriptionEdit),
    /// Package names
    Dependencies(Vec<String>),
}

/// Parses `text` according to what `pending` expects.
///
/// # Errors
///
/// Returns a [`ValidationError`] describing the expected format.
pub fn parse_input(pending: &PendingAction, text: &str) -> Result<Submission, ValidationError> {
    let text = text.trim();
    match pending {
        PendingAction::EditTaskSchedule { .. } => validate_schedule(text).map(Submission::Schedule),
        PendingAction::ScheduleUploadedScript { .. } | PendingAction::ScheduleScript { .. } => {
            schedule_or_default(text).map(Submission::Schedule)
        }
        PendingAction::CreateTask => parse_task(text),
        PendingAction::AddEnv | PendingAction::EditEnv { .. } => parse_env(text),
        PendingAction::AddSubscription => parse_subscription(text),
        PendingAction::EditSubscription { .. } => parse_subscription_edit(text),
        PendingAction::AddDependencies { .. } => {
            let names: Vec<String> = text.split_whitespace().map(str::to_string).collect();
            if names.is_empty() {
                Err(ValidationError::NoDependencies)
            } else {
                Ok(Submission::Dependencies(names))
            }
        }
    }
}

/// Accepts a 5 or 6 field cron expression.
///
/// # Errors
///
/// Returns [`ValidationError::Schedule`] otherwise.
pub fn validate_schedule(text: &str) -> Result<String, ValidationError> {
    let fields: Vec<&str> = text.split_whitespace().collect();
    if (5..=6).contains(&fields.len()) {
        Ok(fields.join(" "))
    } else {
        Err(ValidationError::Schedule(text.to_string()))
    }
}

fn schedule_or_default(text: &str) -> Result<String, ValidationError> {
    if text.eq_ignore_ascii_case("d") || text.eq_ignore_ascii_case("default") {
        Ok(DEFAULT_SCHEDULE.to_string())
    } else {
        validate_schedule(text)
    }
}

fn parse_task(text: &str) -> Result<Submission, ValidationError> {
    let parts: Vec<&str> = text.split('|').map(str::trim).collect();
    let [name, command, schedule, ..] = parts.as_slice() else {
        return Err(ValidationError::TaskFormat);
    };
    if name.is_empty() || command.is_empty() || schedule.is_empty() {
        return Err(ValidationError::TaskFieldsEmpty);
    }
    Ok(Submission::NewTask {
        name: (*name).to_string(),
        command: (*command).to_string(),
        schedule: validate_schedule(schedule)?,
    })
}

fn parse_env(text: &str) -> Result<Submission, ValidationError> {
    let (name, value) = text.split_once('=').ok_or(ValidationError::EnvFormat)?;
    let (name, value) = (name.trim(), value.trim());
    if name.is_empty() || value.is_empty() {
        return Err(ValidationError::EnvFieldsEmpty);
    }
    Ok(Submission::EnvEntry {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn non_blank(part: Option<&&str>) -> Option<String> {
    part.map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

fn parse_subscription(text: &str) -> Result<Submission, ValidationError> {
    let parts: Vec<&str> = text.split('|').collect();
    if parts.len() < 2 {
        return Err(ValidationError::SubscriptionFormat);
    }
    let (Some(name), Some(url)) = (non_blank(parts.first()), non_blank(parts.get(1))) else {
        return Err(ValidationError::SubscriptionFieldsEmpty);
    };
    let schedule = match non_blank(parts.get(2)) {
        Some(schedule) => validate_schedule(&schedule)?,
        None => DEFAULT_SCHEDULE.to_string(),
    };
    Ok(Submission::NewSubscription(NewSubscription {
        name,
        url,
        schedule,
        kind: "public-repo",
        branch: non_blank(parts.get(3)),
    }))
}

fn parse_subscription_edit(text: &str) -> Result<Submission, ValidationError> {
    let parts: Vec<&str> = text.split('|').collect();
    let edit = SubscriptionEdit {
        name: non_blank(parts.first()),
        url: non_blank(parts.get(1)),
        schedule: non_blank(parts.get(2))
            .map(|s| validate_schedule(&s))
            .transpose()?,
        branch: non_blank(parts.get(3)),
    };
    if edit == SubscriptionEdit::default() {
        return Err(ValidationError::SubscriptionFormat);
    }
    Ok(Submission::SubscriptionEdit(edit))
}

/// Whether `text` is the cancel keyword, with or without a bot mention.
#[must_use]
pub fn is_cancel(text: &str) -> bool {
    let command = text.split_whitespace().next().unwrap_or_default();
    command.split('@').next() == Some(CANCEL_KEYWORD)
}
