//! Compact callback action encoding.
//!
//! Inline buttons carry at most [`CALLBACK_DATA_MAX_BYTES`] of payload. An
//! [`Action`] encodes to a short tag followed by `_`-joined fields; folder
//! and file paths are percent-encoded and cut, one character at a time,
//! until the payload fits. Decoding never fails: anything unrecognised
//! becomes [`Action::Noop`].

use crate::config::CALLBACK_DATA_MAX_BYTES;
use crate::panel::models::DependencyKind;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters `encodeURIComponent` leaves alone stay readable in payloads.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A decoded button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Inert button (page indicators, labels)
    Noop,
    /// Scheduled tasks
    Tasks(TaskAction),
    /// Environment entries
    Envs(EnvAction),
    /// Subscriptions
    Subs(SubAction),
    /// Dependencies
    Deps(DepAction),
    /// Script files
    Scripts(ScriptAction),
}

/// Scheduled task actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskAction {
    /// Show a page of the list, optionally dropping cached data first
    List {
        /// Zero-based page
        page: usize,
        /// Invalidate before listing
        refresh: bool,
    },
    /// Detail view
    Show(u64),
    /// Start a run
    Run(u64),
    /// Stop a run
    Stop(u64),
    /// Enable scheduling
    Enable(u64),
    /// Disable scheduling
    Disable(u64),
    /// Delete the task
    Delete(u64),
    /// Ask for a new schedule
    EditSchedule(u64),
    /// Show the latest log
    Log(u64),
    /// Ask for `name|command|schedule`
    Create,
    /// Ask for a schedule for a freshly uploaded root script
    ScheduleUpload(String),
}

/// Environment entry actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvAction {
    /// Show a page of the list
    List {
        /// Zero-based page
        page: usize,
        /// Invalidate before listing
        refresh: bool,
    },
    /// Detail view
    Show(u64),
    /// Enable the entry
    Enable(u64),
    /// Disable the entry
    Disable(u64),
    /// Delete the entry
    Delete(u64),
    /// Ask for `name=value`
    Edit(u64),
    /// Ask for `name=value` of a new entry
    Create,
}

/// Subscription actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubAction {
    /// Show a page of the list
    List {
        /// Zero-based page
        page: usize,
        /// Invalidate before listing
        refresh: bool,
    },
    /// Detail view
    Show(u64),
    /// Pull now
    Run(u64),
    /// Enable scheduled pulls
    Enable(u64),
    /// Disable scheduled pulls
    Disable(u64),
    /// Delete the subscription
    Delete(u64),
    /// Ask for field overrides
    Edit(u64),
    /// Ask for a new subscription
    Create,
}

/// Dependency actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepAction {
    /// Per-kind counts
    Overview {
        /// Invalidate before counting
        refresh: bool,
    },
    /// A page of one kind's list
    List {
        /// Package manager
        kind: DependencyKind,
        /// Zero-based page
        page: usize,
        /// Invalidate before listing
        refresh: bool,
    },
    /// Reinstall a package
    Reinstall {
        /// Panel id
        id: u64,
        /// List to return to
        kind: DependencyKind,
    },
    /// Remove a package
    Delete {
        /// Panel id
        id: u64,
        /// List to return to
        kind: DependencyKind,
    },
    /// Ask for package names
    Add(DependencyKind),
}

/// Script tree actions. Paths may arrive truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptAction {
    /// Show a folder (`""` is the root) at a file page
    Browse {
        /// Folder path
        folder: String,
        /// Zero-based file page
        page: usize,
    },
    /// Drop the cached tree and show a folder
    Refresh {
        /// Folder path
        folder: String,
    },
    /// Ask for a schedule to run the script as a task
    Schedule(String),
    /// Delete the script
    Delete(String),
}

impl Action {
    /// Resource family, for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::Tasks(_) => "tasks",
            Self::Envs(_) => "envs",
            Self::Subs(_) => "subs",
            Self::Deps(_) => "deps",
            Self::Scripts(_) => "scripts",
        }
    }

    /// Encodes the action into a button payload of at most 64 bytes.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Noop => "noop".to_string(),
            Self::Tasks(action) => encode_task(action),
            Self::Envs(action) => encode_env(action),
            Self::Subs(action) => encode_sub(action),
            Self::Deps(action) => encode_dep(action),
            Self::Scripts(action) => encode_script(action),
        }
    }

    /// Decodes a button payload; unknown or malformed input is `Noop`.
    #[must_use]
    pub fn decode(raw: &str) -> Self {
        for (matcher, decode) in ROUTES {
            if let Some(rest) = matcher.strip(raw) {
                return decode(rest);
            }
        }
        Self::Noop
    }
}

fn list_payload(tag: &str, page: usize, refresh: bool) -> String {
    if refresh {
        format!("{tag}_refresh_{page}")
    } else {
        format!("{tag}_{page}")
    }
}

fn encode_task(action: &TaskAction) -> String {
    match action {
        TaskAction::List { page, refresh } => list_payload("tasks", *page, *refresh),
        TaskAction::Show(id) => format!("cron_{id}"),
        TaskAction::Run(id) => format!("cron_run_{id}"),
        TaskAction::Stop(id) => format!("cron_stop_{id}"),
        TaskAction::Enable(id) => format!("cron_en_{id}"),
        TaskAction::Disable(id) => format!("cron_dis_{id}"),
        TaskAction::Delete(id) => format!("cron_del_{id}"),
        TaskAction::EditSchedule(id) => format!("cron_edit_{id}"),
        TaskAction::Log(id) => format!("cron_log_{id}"),
        TaskAction::Create => "task_new".to_string(),
        TaskAction::ScheduleUpload(file) => with_path("newcron_", file, ""),
    }
}

fn encode_env(action: &EnvAction) -> String {
    match action {
        EnvAction::List { page, refresh } => list_payload("envs", *page, *refresh),
        EnvAction::Show(id) => format!("env_{id}"),
        EnvAction::Enable(id) => format!("env_en_{id}"),
        EnvAction::Disable(id) => format!("env_dis_{id}"),
        EnvAction::Delete(id) => format!("env_del_{id}"),
        EnvAction::Edit(id) => format!("env_edit_{id}"),
        EnvAction::Create => "env_add".to_string(),
    }
}

fn encode_sub(action: &SubAction) -> String {
    match action {
        SubAction::List { page, refresh } => list_payload("subs", *page, *refresh),
        SubAction::Show(id) => format!("sub_{id}"),
        SubAction::Run(id) => format!("sub_run_{id}"),
        SubAction::Enable(id) => format!("sub_en_{id}"),
        SubAction::Disable(id) => format!("sub_dis_{id}"),
        SubAction::Delete(id) => format!("sub_del_{id}"),
        SubAction::Edit(id) => format!("sub_edit_{id}"),
        SubAction::Create => "sub_add".to_string(),
    }
}

fn encode_dep(action: &DepAction) -> String {
    match action {
        DepAction::Overview { refresh: false } => "deps_main".to_string(),
        DepAction::Overview { refresh: true } => "deps_refresh".to_string(),
        DepAction::List {
            kind,
            page,
            refresh: true,
        } => {
            if *page == 0 {
                format!("dep_refresh_{kind}")
            } else {
                format!("dep_refresh_{kind}_{page}")
            }
        }
        DepAction::List {
            kind,
            page: 0,
            refresh: false,
        } => format!("dep_list_{kind}"),
        DepAction::List { kind, page, .. } => format!("dep_page_{kind}_{page}"),
        DepAction::Reinstall { id, kind } => format!("dep_reinstall_{id}_{kind}"),
        DepAction::Delete { id, kind } => format!("dep_del_{id}_{kind}"),
        DepAction::Add(kind) => format!("dep_add_{kind}"),
    }
}

fn encode_script(action: &ScriptAction) -> String {
    match action {
        ScriptAction::Browse { folder, page } if folder.is_empty() => {
            format!("scripts_root_{page}")
        }
        ScriptAction::Browse { folder, page: 0 } => with_path("sdir_", folder, ""),
        ScriptAction::Browse { folder, page } => with_path("scrp_", folder, &format!("_{page}")),
        ScriptAction::Refresh { folder } => with_path("scr_refresh_", folder, ""),
        ScriptAction::Schedule(path) => with_path("scrrun_", path, ""),
        ScriptAction::Delete(path) => with_path("scrdel_", path, ""),
    }
}

/// `tag` + encoded `path` + `suffix`, with the path cut to fit the ceiling.
fn with_path(tag: &str, path: &str, suffix: &str) -> String {
    let budget = CALLBACK_DATA_MAX_BYTES.saturating_sub(tag.len() + suffix.len());
    format!("{tag}{}{suffix}", encode_fitting(path, budget))
}

/// Percent-encodes `raw`, dropping trailing characters whose encoding
/// would exceed `budget` bytes. Escapes are never split.
fn encode_fitting(raw: &str, budget: usize) -> String {
    let mut out = String::new();
    let mut buf = [0u8; 4];
    for ch in raw.chars() {
        let piece = utf8_percent_encode(ch.encode_utf8(&mut buf), COMPONENT).to_string();
        if out.len() + piece.len() > budget {
            break;
        }
        out.push_str(&piece);
    }
    out
}

fn decode_path(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

fn page(raw: &str) -> usize {
    raw.parse().unwrap_or(0)
}

fn id_then(raw: &str, build: impl FnOnce(u64) -> Action) -> Action {
    raw.parse().map_or(Action::Noop, build)
}

fn kind_then(raw: &str, build: impl FnOnce(DependencyKind) -> Action) -> Action {
    DependencyKind::parse(raw).map_or(Action::Noop, build)
}

/// `{id}_{kind}`
fn id_kind_then(raw: &str, build: impl FnOnce(u64, DependencyKind) -> Action) -> Action {
    let Some((id, kind)) = raw.split_once('_') else {
        return Action::Noop;
    };
    match (id.parse(), DependencyKind::parse(kind)) {
        (Ok(id), Some(kind)) => build(id, kind),
        _ => Action::Noop,
    }
}

/// `{kind}` or `{kind}_{page}`
fn kind_page(raw: &str) -> Option<(DependencyKind, usize)> {
    match raw.split_once('_') {
        Some((kind, p)) => DependencyKind::parse(kind).map(|kind| (kind, page(p))),
        None => DependencyKind::parse(raw).map(|kind| (kind, 0)),
    }
}

#[derive(Debug, Clone, Copy)]
enum Matcher {
    Exact(&'static str),
    Prefix(&'static str),
}

impl Matcher {
    fn strip<'a>(self, raw: &'a str) -> Option<&'a str> {
        match self {
            Self::Exact(tag) => (raw == tag).then_some(""),
            Self::Prefix(tag) => raw.strip_prefix(tag),
        }
    }

    #[cfg(test)]
    const fn literal(self) -> &'static str {
        match self {
            Self::Exact(tag) | Self::Prefix(tag) => tag,
        }
    }
}

type Decoder = fn(&str) -> Action;

/// First match wins. A prefix must come after every entry it would shadow.
const ROUTES: &[(Matcher, Decoder)] = &[
    (Matcher::Exact("noop"), |_| Action::Noop),
    // Refresh variants precede the plain listings they extend
    (Matcher::Prefix("tasks_refresh_"), |r| {
        Action::Tasks(TaskAction::List { page: page(r), refresh: true })
    }),
    (Matcher::Prefix("envs_refresh_"), |r| {
        Action::Envs(EnvAction::List { page: page(r), refresh: true })
    }),
    (Matcher::Prefix("subs_refresh_"), |r| {
        Action::Subs(SubAction::List { page: page(r), refresh: true })
    }),
    (Matcher::Exact("deps_refresh"), |_| {
        Action::Deps(DepAction::Overview { refresh: true })
    }),
    (Matcher::Prefix("dep_refresh_"), |r| match kind_page(r) {
        Some((kind, page)) => Action::Deps(DepAction::List { kind, page, refresh: true }),
        None => Action::Noop,
    }),
    (Matcher::Prefix("scr_refresh_"), |r| {
        Action::Scripts(ScriptAction::Refresh { folder: decode_path(r) })
    }),
    // Tasks
    (Matcher::Prefix("tasks_"), |r| {
        Action::Tasks(TaskAction::List { page: page(r), refresh: false })
    }),
    (Matcher::Prefix("cron_run_"), |r| id_then(r, |id| Action::Tasks(TaskAction::Run(id)))),
    (Matcher::Prefix("cron_stop_"), |r| id_then(r, |id| Action::Tasks(TaskAction::Stop(id)))),
    (Matcher::Prefix("cron_en_"), |r| id_then(r, |id| Action::Tasks(TaskAction::Enable(id)))),
    (Matcher::Prefix("cron_dis_"), |r| id_then(r, |id| Action::Tasks(TaskAction::Disable(id)))),
    (Matcher::Prefix("cron_del_"), |r| id_then(r, |id| Action::Tasks(TaskAction::Delete(id)))),
    (Matcher::Prefix("cron_edit_"), |r| {
        id_then(r, |id| Action::Tasks(TaskAction::EditSchedule(id)))
    }),
    (Matcher::Prefix("cron_log_"), |r| id_then(r, |id| Action::Tasks(TaskAction::Log(id)))),
    (Matcher::Exact("task_new"), |_| Action::Tasks(TaskAction::Create)),
    (Matcher::Prefix("cron_"), |r| id_then(r, |id| Action::Tasks(TaskAction::Show(id)))),
    (Matcher::Prefix("newcron_"), |r| {
        Action::Tasks(TaskAction::ScheduleUpload(decode_path(r)))
    }),
    // Environment entries
    (Matcher::Prefix("envs_"), |r| {
        Action::Envs(EnvAction::List { page: page(r), refresh: false })
    }),
    (Matcher::Prefix("env_en_"), |r| id_then(r, |id| Action::Envs(EnvAction::Enable(id)))),
    (Matcher::Prefix("env_dis_"), |r| id_then(r, |id| Action::Envs(EnvAction::Disable(id)))),
    (Matcher::Prefix("env_del_"), |r| id_then(r, |id| Action::Envs(EnvAction::Delete(id)))),
    (Matcher::Exact("env_add"), |_| Action::Envs(EnvAction::Create)),
    (Matcher::Prefix("env_edit_"), |r| id_then(r, |id| Action::Envs(EnvAction::Edit(id)))),
    (Matcher::Prefix("env_"), |r| id_then(r, |id| Action::Envs(EnvAction::Show(id)))),
    // Subscriptions
    (Matcher::Prefix("subs_"), |r| {
        Action::Subs(SubAction::List { page: page(r), refresh: false })
    }),
    (Matcher::Prefix("sub_run_"), |r| id_then(r, |id| Action::Subs(SubAction::Run(id)))),
    (Matcher::Prefix("sub_en_"), |r| id_then(r, |id| Action::Subs(SubAction::Enable(id)))),
    (Matcher::Prefix("sub_dis_"), |r| id_then(r, |id| Action::Subs(SubAction::Disable(id)))),
    (Matcher::Prefix("sub_del_"), |r| id_then(r, |id| Action::Subs(SubAction::Delete(id)))),
    (Matcher::Exact("sub_add"), |_| Action::Subs(SubAction::Create)),
    (Matcher::Prefix("sub_edit_"), |r| id_then(r, |id| Action::Subs(SubAction::Edit(id)))),
    (Matcher::Prefix("sub_"), |r| id_then(r, |id| Action::Subs(SubAction::Show(id)))),
    // Dependencies
    (Matcher::Exact("deps_main"), |_| {
        Action::Deps(DepAction::Overview { refresh: false })
    }),
    (Matcher::Prefix("dep_list_"), |r| {
        kind_then(r, |kind| Action::Deps(DepAction::List { kind, page: 0, refresh: false }))
    }),
    (Matcher::Prefix("dep_page_"), |r| match r.split_once('_') {
        Some((kind, p)) => kind_then(kind, |kind| {
            Action::Deps(DepAction::List { kind, page: page(p), refresh: false })
        }),
        None => Action::Noop,
    }),
    (Matcher::Prefix("dep_reinstall_"), |r| {
        id_kind_then(r, |id, kind| Action::Deps(DepAction::Reinstall { id, kind }))
    }),
    (Matcher::Prefix("dep_del_"), |r| {
        id_kind_then(r, |id, kind| Action::Deps(DepAction::Delete { id, kind }))
    }),
    (Matcher::Prefix("dep_add_"), |r| kind_then(r, |kind| Action::Deps(DepAction::Add(kind)))),
    // Scripts
    (Matcher::Prefix("scripts_root_"), |r| {
        Action::Scripts(ScriptAction::Browse { folder: String::new(), page: page(r) })
    }),
    (Matcher::Prefix("sdir_"), |r| {
        Action::Scripts(ScriptAction::Browse { folder: decode_path(r), page: 0 })
    }),
    // Folder may contain `_`; the page follows the last one
    (Matcher::Prefix("scrp_"), |r| match r.rsplit_once('_') {
        Some((folder, p)) => Action::Scripts(ScriptAction::Browse {
            folder: decode_path(folder),
            page: page(p),
        }),
        None => Action::Noop,
    }),
    (Matcher::Prefix("scrrun_"), |r| Action::Scripts(ScriptAction::Schedule(decode_path(r)))),
    (Matcher::Prefix("scrdel_"), |r| Action::Scripts(ScriptAction::Delete(decode_path(r)))),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_route_is_shadowed() {
        for (i, (earlier, _)) in ROUTES.iter().enumerate() {
            let Matcher::Prefix(prefix) = earlier else {
                continue;
            };
            for (later, _) in &ROUTES[i + 1..] {
                assert!(
                    !later.literal().starts_with(prefix),
                    "`{prefix}` shadows later route `{}`",
                    later.literal()
                );
            }
        }
    }

    #[test]
    fn test_refresh_routes_before_listing() {
        assert_eq!(
            Action::decode("tasks_refresh_2"),
            Action::Tasks(TaskAction::List { page: 2, refresh: true })
        );
        assert_eq!(
            Action::decode("tasks_3"),
            Action::Tasks(TaskAction::List { page: 3, refresh: false })
        );
        assert_eq!(
            Action::decode("envs_refresh_0"),
            Action::Envs(EnvAction::List { page: 0, refresh: true })
        );
    }

    #[test]
    fn test_specific_cron_verbs_win_over_detail() {
        assert_eq!(Action::decode("cron_run_5"), Action::Tasks(TaskAction::Run(5)));
        assert_eq!(Action::decode("cron_5"), Action::Tasks(TaskAction::Show(5)));
        assert_eq!(Action::decode("cron_log_9"), Action::Tasks(TaskAction::Log(9)));
        assert_eq!(Action::decode("task_new"), Action::Tasks(TaskAction::Create));
    }

    #[test]
    fn test_malformed_payloads_are_noop() {
        for raw in [
            "",
            "noop",
            "bogus",
            "cron_abc",
            "cron_run_",
            "env_edit_x",
            "dep_list_ruby",
            "dep_reinstall_3",
            "dep_del_x_linux",
            "scrp_",
            "task_new_extra",
        ] {
            assert_eq!(Action::decode(raw), Action::Noop, "payload `{raw}`");
        }
    }

    #[test]
    fn test_bad_page_falls_back_to_first() {
        assert_eq!(
            Action::decode("subs_x"),
            Action::Subs(SubAction::List { page: 0, refresh: false })
        );
    }

    #[test]
    fn test_source_payloads_decode() {
        assert_eq!(
            Action::decode("dep_page_nodejs_2"),
            Action::Deps(DepAction::List {
                kind: DependencyKind::NodeJs,
                page: 2,
                refresh: false
            })
        );
        assert_eq!(
            Action::decode("dep_reinstall_12_linux"),
            Action::Deps(DepAction::Reinstall {
                id: 12,
                kind: DependencyKind::Linux
            })
        );
        assert_eq!(
            Action::decode("scrp_my_folder_3"),
            Action::Scripts(ScriptAction::Browse {
                folder: "my_folder".to_string(),
                page: 3
            })
        );
        assert_eq!(
            Action::decode("sdir_jd%2Futils"),
            Action::Scripts(ScriptAction::Browse {
                folder: "jd/utils".to_string(),
                page: 0
            })
        );
    }

    #[test]
    fn test_dep_list_encodings() {
        let kind = DependencyKind::Python3;
        let cases = [
            (DepAction::List { kind, page: 0, refresh: false }, "dep_list_python3"),
            (DepAction::List { kind, page: 2, refresh: false }, "dep_page_python3_2"),
            (DepAction::List { kind, page: 0, refresh: true }, "dep_refresh_python3"),
            (DepAction::List { kind, page: 4, refresh: true }, "dep_refresh_python3_4"),
        ];
        for (action, expected) in cases {
            let action = Action::Deps(action);
            assert_eq!(action.encode(), expected);
            assert_eq!(Action::decode(expected), action);
        }
    }

    #[test]
    fn test_long_path_is_truncated_on_char_boundary() {
        let path = format!("{}/{}.js", "目录".repeat(10), "x".repeat(40));
        let encoded = Action::Scripts(ScriptAction::Delete(path.clone())).encode();
        assert!(encoded.len() <= CALLBACK_DATA_MAX_BYTES);

        let Action::Scripts(ScriptAction::Delete(fragment)) = Action::decode(&encoded) else {
            panic!("truncated payload should still decode to a delete");
        };
        assert!(!fragment.is_empty());
        assert!(path.starts_with(&fragment));
        assert!(!fragment.contains('\u{FFFD}'));
    }

    #[test]
    fn test_paged_folder_keeps_page_when_truncated() {
        let folder = "a".repeat(100);
        let encoded = Action::Scripts(ScriptAction::Browse {
            folder: folder.clone(),
            page: 12,
        })
        .encode();
        assert_eq!(encoded.len(), CALLBACK_DATA_MAX_BYTES);
        assert!(encoded.ends_with("_12"));
        assert_eq!(
            Action::decode(&encoded),
            Action::Scripts(ScriptAction::Browse {
                folder: folder[..56].to_string(),
                page: 12
            })
        );
    }
}
