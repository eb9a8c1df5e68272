//! Cache key namespace.
//!
//! Keys look like `<class>[:<qualifier>]`; the class is the unit of
//! invalidation, so a write to any resource of a class drops its list and
//! detail keys together.

use super::models::DependencyKind;
use crate::config::PanelSettings;
use std::time::Duration;

/// Separator between the resource class and its qualifier.
pub const KEY_SEPARATOR: char = ':';

/// Resource families the panel exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    /// Scheduled tasks
    Tasks,
    /// Environment entries
    Envs,
    /// Git-backed subscriptions
    Subs,
    /// Package dependencies
    Deps,
    /// Script files
    Scripts,
}

impl ResourceClass {
    /// Key prefix shared by every entry of the class.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Tasks => "tasks",
            Self::Envs => "envs",
            Self::Subs => "subs",
            Self::Deps => "deps",
            Self::Scripts => "scripts",
        }
    }

    /// Configured lifetime of cached reads.
    #[must_use]
    pub const fn ttl(self, settings: &PanelSettings) -> Duration {
        Duration::from_secs(match self {
            Self::Tasks => settings.cache_ttl_tasks_secs,
            Self::Envs => settings.cache_ttl_envs_secs,
            Self::Subs => settings.cache_ttl_subs_secs,
            Self::Deps => settings.cache_ttl_deps_secs,
            Self::Scripts => settings.cache_ttl_scripts_secs,
        })
    }

    /// Key of the class-wide list.
    #[must_use]
    pub fn list_key(self) -> String {
        format!("{}{KEY_SEPARATOR}list", self.prefix())
    }
}

/// Resource-class portion of a cache key (everything before the first separator).
#[must_use]
pub fn class_prefix(cache_key: &str) -> &str {
    cache_key
        .split_once(KEY_SEPARATOR)
        .map_or(cache_key, |(prefix, _)| prefix)
}

/// Key of a single task's detail.
#[must_use]
pub fn task_detail_key(id: u64) -> String {
    format!("tasks{KEY_SEPARATOR}detail{KEY_SEPARATOR}{id}")
}

/// Key of one dependency type's list.
#[must_use]
pub fn deps_key(kind: DependencyKind) -> String {
    format!("deps{KEY_SEPARATOR}{}", kind.as_str())
}

/// Key of the script tree.
#[must_use]
pub fn scripts_tree_key() -> String {
    format!("scripts{KEY_SEPARATOR}tree")
}
