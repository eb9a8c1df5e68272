//! Panel resource models
//!
//! Only the fields the bot reads are modelled; unknown fields are ignored.
//! The panel is loose with flag types (`0`/`1`, booleans, `null`), so flags
//! go through [`truthy`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => false,
        Value::Bool(flag) => flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A scheduled task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Cron {
    /// Panel id
    pub id: u64,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Shell command the task runs
    #[serde(default)]
    pub command: Option<String>,
    /// Cron expression
    #[serde(default)]
    pub schedule: Option<String>,
    /// Disabled tasks never fire
    #[serde(default, rename = "isDisabled", deserialize_with = "truthy")]
    pub is_disabled: bool,
    /// Currently executing
    #[serde(default, rename = "isRunning", deserialize_with = "truthy")]
    pub is_running: bool,
}

/// An environment entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EnvVar {
    /// Panel id
    pub id: u64,
    /// Variable name
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Variable value
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: String,
    /// `0` means enabled
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: i64,
    /// Free-form note
    #[serde(default)]
    pub remarks: Option<String>,
}

impl EnvVar {
    /// Whether the panel exports the variable.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.status == 0
    }
}

/// A git-backed subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Subscription {
    /// Panel id
    pub id: u64,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Repository URL
    #[serde(default)]
    pub url: Option<String>,
    /// Pull schedule
    #[serde(default)]
    pub schedule: Option<String>,
    /// Branch, when not the default one
    #[serde(default)]
    pub branch: Option<String>,
    /// Disabled subscriptions never pull
    #[serde(default, deserialize_with = "truthy")]
    pub is_disabled: bool,
}

/// Body for creating a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewSubscription {
    /// Display name
    pub name: String,
    /// Repository URL
    pub url: String,
    /// Pull schedule
    pub schedule: String,
    /// Subscription kind; always `public-repo`
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Branch, omitted when empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// Field overrides for editing a subscription; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionEdit {
    /// New name
    pub name: Option<String>,
    /// New URL
    pub url: Option<String>,
    /// New schedule
    pub schedule: Option<String>,
    /// New branch
    pub branch: Option<String>,
}

impl SubscriptionEdit {
    /// Applies the overrides to the panel's full subscription object.
    ///
    /// Every other field is sent back unchanged, since the panel replaces
    /// the whole record on update.
    pub fn apply_to(&self, current: &mut serde_json::Map<String, Value>) {
        let fields = [
            ("name", &self.name),
            ("url", &self.url),
            ("schedule", &self.schedule),
            ("branch", &self.branch),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                current.insert(key.to_string(), Value::String(value.clone()));
            }
        }
    }
}

/// Package manager a dependency belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// pip packages
    Python3,
    /// npm packages
    NodeJs,
    /// System packages
    Linux,
}

impl DependencyKind {
    /// Every kind, in display order.
    pub const ALL: [Self; 3] = [Self::Python3, Self::NodeJs, Self::Linux];

    /// Name used in query strings, cache keys and button payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Python3 => "python3",
            Self::NodeJs => "nodejs",
            Self::Linux => "linux",
        }
    }

    /// Numeric type the panel expects when creating dependencies.
    #[must_use]
    pub const fn type_code(self) -> u8 {
        match self {
            Self::Python3 => 0,
            Self::NodeJs => 1,
            Self::Linux => 2,
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Python3 => "Python",
            Self::NodeJs => "Node.js",
            Self::Linux => "Linux",
        }
    }

    /// Parses the payload name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == raw)
    }
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An installed or pending dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Dependency {
    /// Panel id
    pub id: u64,
    /// Package name
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// `0` installed, `1` installing, anything else failed
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: i64,
}

/// Install state of a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    /// Ready to use
    Installed,
    /// Installation running
    Installing,
    /// Installation failed
    Failed,
}

impl Dependency {
    /// Interprets the panel status code.
    #[must_use]
    pub const fn state(&self) -> InstallState {
        match self.status {
            0 => InstallState::Installed,
            1 => InstallState::Installing,
            _ => InstallState::Failed,
        }
    }
}

/// Body entry for creating a dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewDependency {
    /// Package name
    pub name: String,
    /// Numeric kind, see [`DependencyKind::type_code`]
    #[serde(rename = "type")]
    pub kind: u8,
}

/// A node of the panel's script tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ScriptNode {
    /// File or folder name
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    /// Folder contents; empty for files
    #[serde(default, deserialize_with = "null_as_default")]
    pub children: Vec<ScriptNode>,
}

impl ScriptNode {
    /// Nodes with children are folders.
    #[must_use]
    pub fn is_folder(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Contents of one folder of the script tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderListing {
    /// Sub-folder names
    pub folders: Vec<String>,
    /// File names
    pub files: Vec<String>,
}

/// Lists the folder at `path` (`/`-separated, `""` for the root).
///
/// Returns `None` when the path does not name a folder.
#[must_use]
pub fn list_folder(roots: &[ScriptNode], path: &str) -> Option<FolderListing> {
    let mut level = roots;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        let node = level
            .iter()
            .find(|node| node.is_folder() && node.title == segment)?;
        level = &node.children;
    }

    let mut listing = FolderListing::default();
    for node in level {
        if node.is_folder() {
            listing.folders.push(node.title.clone());
        } else if !node.title.is_empty() {
            listing.files.push(node.title.clone());
        }
    }
    Some(listing)
}

/// Every folder path in the tree.
#[must_use]
pub fn folder_paths(roots: &[ScriptNode]) -> Vec<String> {
    let mut paths = Vec::new();
    collect_paths(roots, "", true, &mut paths);
    paths
}

/// Every file path in the tree.
#[must_use]
pub fn file_paths(roots: &[ScriptNode]) -> Vec<String> {
    let mut paths = Vec::new();
    collect_paths(roots, "", false, &mut paths);
    paths
}

fn collect_paths(nodes: &[ScriptNode], parent: &str, folders: bool, out: &mut Vec<String>) {
    for node in nodes {
        if node.title.is_empty() {
            continue;
        }
        let path = join_path(parent, &node.title);
        if node.is_folder() {
            if folders {
                out.push(path.clone());
            }
            collect_paths(&node.children, &path, folders, out);
        } else if !folders {
            out.push(path);
        }
    }
}

/// Joins a folder path and a name.
#[must_use]
pub fn join_path(folder: &str, name: &str) -> String {
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

/// Splits a script path into `(folder, file name)`.
#[must_use]
pub fn split_path(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or(("", path))
}

/// Outcome of matching a possibly truncated path against known paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathMatch {
    /// Exactly one path fits
    Found(String),
    /// Nothing fits
    NotFound,
    /// Several paths share the fragment
    Ambiguous(usize),
}

/// Resolves `fragment` against `candidates`: exact match first, then a
/// unique prefix match.
#[must_use]
pub fn resolve_path(candidates: &[String], fragment: &str) -> PathMatch {
    if candidates.iter().any(|c| c == fragment) {
        return PathMatch::Found(fragment.to_string());
    }
    let matches: Vec<&String> = candidates
        .iter()
        .filter(|c| c.starts_with(fragment))
        .collect();
    match matches.as_slice() {
        [] => PathMatch::NotFound,
        [only] => PathMatch::Found((*only).clone()),
        many => PathMatch::Ambiguous(many.len()),
    }
}
