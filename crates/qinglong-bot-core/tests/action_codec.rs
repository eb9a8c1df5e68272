use proptest::prelude::*;
use qinglong_bot_core::action::{
    Action, DepAction, EnvAction, ScriptAction, SubAction, TaskAction,
};
use qinglong_bot_core::config::CALLBACK_DATA_MAX_BYTES;
use qinglong_bot_core::panel::models::DependencyKind;

fn id_actions(id: u64) -> Vec<Action> {
    vec![
        Action::Tasks(TaskAction::Show(id)),
        Action::Tasks(TaskAction::Run(id)),
        Action::Tasks(TaskAction::Stop(id)),
        Action::Tasks(TaskAction::Enable(id)),
        Action::Tasks(TaskAction::Disable(id)),
        Action::Tasks(TaskAction::Delete(id)),
        Action::Tasks(TaskAction::EditSchedule(id)),
        Action::Tasks(TaskAction::Log(id)),
        Action::Envs(EnvAction::Show(id)),
        Action::Envs(EnvAction::Enable(id)),
        Action::Envs(EnvAction::Disable(id)),
        Action::Envs(EnvAction::Delete(id)),
        Action::Envs(EnvAction::Edit(id)),
        Action::Subs(SubAction::Show(id)),
        Action::Subs(SubAction::Run(id)),
        Action::Subs(SubAction::Enable(id)),
        Action::Subs(SubAction::Disable(id)),
        Action::Subs(SubAction::Delete(id)),
        Action::Subs(SubAction::Edit(id)),
    ]
}

fn kind() -> impl Strategy<Value = DependencyKind> {
    prop::sample::select(DependencyKind::ALL.to_vec())
}

proptest! {
    /// Every id-bearing action survives encoding.
    #[test]
    fn id_actions_round_trip(id in any::<u64>()) {
        for action in id_actions(id) {
            let encoded = action.encode();
            prop_assert!(encoded.len() <= CALLBACK_DATA_MAX_BYTES);
            prop_assert_eq!(Action::decode(&encoded), action);
        }
    }

    /// Listings keep their page and refresh flag.
    #[test]
    fn listings_round_trip(page in 0usize..10_000, refresh in any::<bool>(), kind in kind()) {
        let actions = [
            Action::Tasks(TaskAction::List { page, refresh }),
            Action::Envs(EnvAction::List { page, refresh }),
            Action::Subs(SubAction::List { page, refresh }),
            Action::Deps(DepAction::List { kind, page, refresh }),
        ];
        for action in actions {
            prop_assert_eq!(Action::decode(&action.encode()), action);
        }
    }

    /// Dependency mutations carry both id and kind.
    #[test]
    fn dependency_mutations_round_trip(id in any::<u64>(), kind in kind()) {
        for action in [
            Action::Deps(DepAction::Reinstall { id, kind }),
            Action::Deps(DepAction::Delete { id, kind }),
            Action::Deps(DepAction::Add(kind)),
        ] {
            prop_assert_eq!(Action::decode(&action.encode()), action);
        }
    }

    /// Short script names come back unchanged.
    #[test]
    fn short_paths_round_trip(name in "[a-zA-Z0-9_.-]{1,50}") {
        for action in [
            Action::Scripts(ScriptAction::Delete(name.clone())),
            Action::Scripts(ScriptAction::Schedule(name.clone())),
            Action::Tasks(TaskAction::ScheduleUpload(name.clone())),
        ] {
            prop_assert_eq!(Action::decode(&action.encode()), action);
        }
    }

    /// Folders with a page keep the page even when the folder contains `_`.
    #[test]
    fn paged_folders_round_trip(folder in "[a-z_]{1,30}", page in 0usize..1_000) {
        let action = Action::Scripts(ScriptAction::Browse { folder, page });
        prop_assert_eq!(Action::decode(&action.encode()), action);
    }

    /// Any path fits the ceiling and decodes to a prefix of itself.
    #[test]
    fn long_paths_are_cut_to_a_prefix(path in "\\PC{1,120}") {
        let encoded = Action::Scripts(ScriptAction::Schedule(path.clone())).encode();
        prop_assert!(encoded.len() <= CALLBACK_DATA_MAX_BYTES);

        let decoded = Action::decode(&encoded);
        let Action::Scripts(ScriptAction::Schedule(fragment)) = decoded else {
            return Err(TestCaseError::fail("schedule payload lost its route"));
        };
        prop_assert!(path.starts_with(&fragment), "{} is not a prefix of {}", fragment, path);
    }

    /// Decoding arbitrary input never panics.
    #[test]
    fn decode_is_total(raw in "\\PC{0,80}") {
        let _ = Action::decode(&raw);
    }
}

#[test]
fn overview_payloads_are_fixed() {
    assert_eq!(Action::Deps(DepAction::Overview { refresh: false }).encode(), "deps_main");
    assert_eq!(Action::Deps(DepAction::Overview { refresh: true }).encode(), "deps_refresh");
    assert_eq!(Action::Noop.encode(), "noop");
    assert_eq!(Action::decode("scr_refresh_"), Action::Scripts(ScriptAction::Refresh {
        folder: String::new()
    }));
}
