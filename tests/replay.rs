// tests/replay.rs

//! Replay tests: serialization round trips, version gate, tolerance flags,
//! reason preservation, groups and reverting stored transactions.

mod common;

use common::{FakeBuilder, FakeComps, FakePackages, action, pkg, setup_history, store_transaction};
use reprise::db::PackageSnapshot;
use reprise::history::{
    ActionKind, CompsGroup, GroupAction, PackageTypes, Reason, SYSTEM_REPO,
    TransactionRecord,
};
use reprise::replay::{
    DocumentError, PlanningBuilder, ProblemKind, ReplayContext, ReplayDocument, ReplayOptions,
    RpmEntry, TransactionBuilder, TransactionItem, TransactionReplay, deserialize,
    revert_document, serialize,
};
use reprise::{Error, TransactionView};

fn entry(kind: ActionKind, nevra: &str, reason: Reason, repo: &str) -> RpmEntry {
    RpmEntry {
        action: kind,
        nevra: nevra.to_string(),
        reason,
        repo_id: Some(repo.to_string()),
    }
}

fn document(rpms: Vec<RpmEntry>) -> ReplayDocument {
    ReplayDocument {
        rpms,
        ..ReplayDocument::default()
    }
}

fn problem_kinds(err: &Error) -> Vec<ProblemKind> {
    match err {
        Error::Replay(e) => e.problems.iter().map(|p| p.kind).collect(),
        other => panic!("expected a replay error, got {other}"),
    }
}

/// Run a replay and its post-transaction check against the fakes
fn replay(
    doc: ReplayDocument,
    options: ReplayOptions,
    packages: &FakePackages,
    builder: &mut FakeBuilder,
    comps: &mut FakeComps,
) -> (TransactionReplay, reprise::Result<Vec<TransactionItem>>) {
    let mut replay = TransactionReplay::new("test.json", doc, options);
    let result = {
        let mut ctx = ReplayContext::new(packages, &mut *builder, &mut *comps);
        replay.run(&mut ctx)
    };
    if let Err(e) = result {
        return (replay, Err(e));
    }
    let result = builder.resolve().and_then(|mut items| {
        replay.post_transaction(&mut items)?;
        Ok(items)
    });
    (replay, result)
}

#[test]
fn test_round_trip_preserves_order_reasons_and_repos() {
    let mut record = TransactionRecord::begin("1:abc", "install foo bar");
    record
        .add_action(action(ActionKind::Install, "foo-1.0-1.x86_64", Reason::User, "fedora"))
        .unwrap();
    record
        .add_action(action(ActionKind::Install, "libfoo-1.0-1.x86_64", Reason::Dependency, "updates"))
        .unwrap();
    record
        .add_action(action(ActionKind::Erase, "bar-2:3.1-4.noarch", Reason::Clean, SYSTEM_REPO))
        .unwrap();

    let doc = serialize(&record).unwrap();
    let text = doc.to_json_pretty().unwrap();
    let parsed = deserialize(&text).unwrap();
    assert_eq!(parsed, doc);

    let nevras: Vec<&str> = parsed.rpms.iter().map(|e| e.nevra.as_str()).collect();
    assert_eq!(nevras, vec!["foo-1.0-1.x86_64", "libfoo-1.0-1.x86_64", "bar-2:3.1-4.noarch"]);
    assert_eq!(parsed.rpms[1].reason, Reason::Dependency);
    assert_eq!(parsed.rpms[1].repo_id.as_deref(), Some("updates"));
    assert_eq!(parsed.rpms[2].repo_id.as_deref(), Some(SYSTEM_REPO));
    assert_eq!(parsed.version(), "0.0");
}

#[test]
fn test_stored_record_serializes_like_live_record() {
    let (_dir, history) = setup_history();
    let actions = vec![
        action(ActionKind::Upgrade, "foo-2.0-1.x86_64", Reason::User, "updates"),
        action(ActionKind::Upgraded, "foo-1.0-1.x86_64", Reason::User, SYSTEM_REPO),
    ];
    let id = store_transaction(&history, 1, "1:a", "1:b", actions.clone());

    let stored = history.find_by_id(id).unwrap().unwrap();
    let mut live = TransactionRecord::begin("1:a", "upgrade foo");
    for a in actions {
        live.add_action(a).unwrap();
    }
    assert_eq!(serialize(&stored).unwrap(), serialize(&live).unwrap());
}

#[test]
fn test_incompatible_major_version_is_rejected() {
    let text = r#"{"version": "1.0", "rpms": []}"#;
    assert_eq!(
        deserialize(text).unwrap_err(),
        DocumentError::IncompatibleVersion {
            found: 1,
            supported: 0
        }
    );

    // Minor differences are fine
    let doc = deserialize(r#"{"version": "0.7"}"#).unwrap();
    assert_eq!(doc.minor, 7);
    assert!(doc.is_empty());
}

#[test]
fn test_schema_errors_name_key_and_container() {
    let text = r#"{"version": "0.0", "rpms": [{"action": "Install", "reason": "user", "repo_id": ""}]}"#;
    assert_eq!(
        deserialize(text).unwrap_err(),
        DocumentError::MissingKey {
            key: "nevra",
            container: "rpm"
        }
    );

    let text = r#"{"version": "0.0", "rpms": [{"action": "Frobnicate", "nevra": "foo-1-1.noarch", "reason": "user", "repo_id": ""}]}"#;
    assert!(matches!(
        deserialize(text).unwrap_err(),
        DocumentError::UnknownValue { field: "action", .. }
    ));
}

#[test]
fn test_extras_fail_without_ignore_extras() {
    let packages = FakePackages::with(&[("foo-1.0-1.x86_64", "fedora"), ("bar-1.0-1.x86_64", "fedora")]);
    let doc = document(vec![entry(ActionKind::Install, "foo-1.0-1.x86_64", Reason::User, "fedora")]);

    let mut builder = FakeBuilder::new(Reason::Dependency);
    builder.extras.push(TransactionItem {
        package: pkg("bar-1.0-1.x86_64", "fedora"),
        action: ActionKind::DepInstall,
        reason: Reason::Dependency,
    });

    let (_, result) = replay(
        doc.clone(),
        ReplayOptions::default(),
        &packages,
        &mut builder,
        &mut FakeComps::default(),
    );
    let err = result.unwrap_err();
    assert_eq!(problem_kinds(&err), vec![ProblemKind::UnexpectedExtra]);
    assert!(err.to_string().contains("bar-1.0-1.x86_64"));

    let mut builder = FakeBuilder::new(Reason::Dependency);
    builder.extras.push(TransactionItem {
        package: pkg("bar-1.0-1.x86_64", "fedora"),
        action: ActionKind::DepInstall,
        reason: Reason::Dependency,
    });
    let options = ReplayOptions {
        ignore_extras: true,
        ..ReplayOptions::default()
    };
    let (replay, result) = replay(doc, options, &packages, &mut builder, &mut FakeComps::default());
    assert_eq!(result.unwrap().len(), 2);
    assert_eq!(replay.warnings().len(), 1);
}

#[test]
fn test_unavailable_package_with_and_without_skip() {
    let packages = FakePackages::with(&[("foo-1.0-1.x86_64", "fedora")]);
    let doc = document(vec![
        entry(ActionKind::Install, "foo-1.0-1.x86_64", Reason::User, "fedora"),
        entry(ActionKind::Install, "ghost-1.0-1.x86_64", Reason::User, "fedora"),
    ]);

    let (_, result) = replay(
        doc.clone(),
        ReplayOptions::default(),
        &packages,
        &mut FakeBuilder::new(Reason::Unknown),
        &mut FakeComps::default(),
    );
    assert_eq!(
        problem_kinds(&result.unwrap_err()),
        vec![ProblemKind::UnavailablePackage]
    );

    let options = ReplayOptions {
        skip_unavailable: true,
        ..ReplayOptions::default()
    };
    let mut builder = FakeBuilder::new(Reason::Unknown);
    let (replay, result) = replay(doc, options, &packages, &mut builder, &mut FakeComps::default());
    let items = result.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].package.nevra.name, "foo");
    assert_eq!(replay.warnings().len(), 1);
    assert!(replay.warnings()[0].contains("ghost-1.0-1.x86_64"));
}

#[test]
fn test_problems_are_collected_over_the_whole_document() {
    let packages = FakePackages::with(&[]);
    let doc = document(vec![
        entry(ActionKind::Install, "a-1-1.x86_64", Reason::User, "fedora"),
        entry(ActionKind::Erase, "b-1-1.x86_64", Reason::User, SYSTEM_REPO),
        entry(ActionKind::Install, "not a nevra", Reason::User, "fedora"),
    ]);
    let (_, result) = replay(
        doc,
        ReplayOptions::default(),
        &packages,
        &mut FakeBuilder::new(Reason::Unknown),
        &mut FakeComps::default(),
    );
    assert_eq!(
        problem_kinds(&result.unwrap_err()),
        vec![
            ProblemKind::UnavailablePackage,
            ProblemKind::UnavailablePackage,
            ProblemKind::UnparsableNevra,
        ]
    );
}

#[test]
fn test_recorded_reason_overrides_resolver_default() {
    let packages = FakePackages::with(&[("foo-1.0-1.x86_64", "fedora")]);
    let doc = document(vec![entry(ActionKind::Install, "foo-1.0-1.x86_64", Reason::User, "fedora")]);

    let mut builder = FakeBuilder::new(Reason::Dependency);
    let (_, result) = replay(
        doc,
        ReplayOptions::default(),
        &packages,
        &mut builder,
        &mut FakeComps::default(),
    );
    let items = result.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].reason, Reason::User);
}

#[test]
fn test_already_installed_with_ignore_installed() {
    let packages = FakePackages::with(&[
        ("foo-1.0-1.x86_64", "fedora"),
        ("foo-0.9-1.x86_64", SYSTEM_REPO),
    ]);
    let doc = document(vec![entry(ActionKind::Install, "foo-1.0-1.x86_64", Reason::User, "fedora")]);

    let (_, result) = replay(
        doc.clone(),
        ReplayOptions::default(),
        &packages,
        &mut FakeBuilder::new(Reason::Unknown),
        &mut FakeComps::default(),
    );
    assert_eq!(
        problem_kinds(&result.unwrap_err()),
        vec![ProblemKind::AlreadyInstalled]
    );

    let options = ReplayOptions {
        ignore_installed: true,
        ..ReplayOptions::default()
    };
    let mut builder = FakeBuilder::new(Reason::Unknown);
    let (replay, result) = replay(doc, options, &packages, &mut builder, &mut FakeComps::default());
    assert_eq!(result.unwrap().len(), 1);
    assert_eq!(replay.warnings().len(), 1);
}

#[test]
fn test_group_install_and_missing_group_removal() {
    let mut packages = FakePackages::default();
    packages.groups.insert("core".to_string());

    let mut core = CompsGroup::new("core", PackageTypes::MANDATORY);
    core.add_package("bash", true, PackageTypes::MANDATORY);
    let doc = ReplayDocument {
        groups: vec![
            GroupAction {
                action: ActionKind::Install,
                group: core.clone(),
            },
            GroupAction {
                action: ActionKind::Erase,
                group: CompsGroup::new("legacy", PackageTypes::DEFAULT),
            },
        ],
        ..ReplayDocument::default()
    };

    let mut comps = FakeComps::default();
    let (_, result) = replay(
        doc.clone(),
        ReplayOptions::default(),
        &packages,
        &mut FakeBuilder::new(Reason::Unknown),
        &mut comps,
    );
    assert_eq!(
        problem_kinds(&result.unwrap_err()),
        vec![ProblemKind::GroupNotInstalled]
    );

    let options = ReplayOptions {
        ignore_installed: true,
        ..ReplayOptions::default()
    };
    let mut comps = FakeComps::default();
    let (replay, result) = replay(
        doc,
        options,
        &packages,
        &mut FakeBuilder::new(Reason::Unknown),
        &mut comps,
    );
    assert!(result.unwrap().is_empty());
    assert_eq!(replay.warnings().len(), 1);
    assert_eq!(comps.groups.get("core"), Some(&core));
}

#[test]
fn test_planned_upgrade_keeps_recorded_reason() {
    let conn = std::rc::Rc::new(reprise::db::open_in_memory().unwrap());
    let snapshot = PackageSnapshot::new(conn, Vec::new());
    snapshot.add_package(&pkg("foo-1.0-1.x86_64", SYSTEM_REPO)).unwrap();
    snapshot.add_package(&pkg("foo-1.0-1.x86_64", "fedora")).unwrap();
    snapshot.add_package(&pkg("foo-2.0-1.x86_64", "updates")).unwrap();

    let doc = document(vec![
        entry(ActionKind::Upgrade, "foo-2.0-1.x86_64", Reason::User, "updates"),
        entry(ActionKind::Upgraded, "foo-1.0-1.x86_64", Reason::User, SYSTEM_REPO),
    ]);

    let mut builder = PlanningBuilder::new(&snapshot);
    let mut comps = FakeComps::default();
    let mut replay = TransactionReplay::new("test.json", doc, ReplayOptions::default());
    {
        let mut ctx = ReplayContext::new(&snapshot, &mut builder, &mut comps);
        replay.run(&mut ctx).unwrap();
    }
    let mut items = builder.resolve().unwrap();
    replay.post_transaction(&mut items).unwrap();

    let summary: Vec<(ActionKind, String, Reason)> = items
        .iter()
        .map(|i| (i.action, i.package.to_string(), i.reason))
        .collect();
    assert_eq!(
        summary,
        vec![
            (ActionKind::Upgrade, "foo-2.0-1.x86_64 (updates)".to_string(), Reason::User),
            (ActionKind::Upgraded, "foo-1.0-1.x86_64 (@System)".to_string(), Reason::Unknown),
        ]
    );
}

#[test]
fn test_undo_inverts_actions_and_restores_reason() {
    let (_dir, history) = setup_history();
    store_transaction(
        &history,
        1,
        "0:e3b0",
        "1:aaaa",
        vec![action(ActionKind::Install, "foo-1.0-1.x86_64", Reason::User, "fedora")],
    );
    let id = store_transaction(
        &history,
        2,
        "1:aaaa",
        "2:bbbb",
        vec![
            action(ActionKind::ReasonChange, "foo-1.0-1.x86_64", Reason::Dependency, SYSTEM_REPO),
            action(ActionKind::Install, "bar-1.0-1.noarch", Reason::Clean, "fedora"),
            action(ActionKind::Upgrade, "baz-2.0-1.x86_64", Reason::User, "updates"),
            action(ActionKind::Upgraded, "baz-1.0-1.x86_64", Reason::User, SYSTEM_REPO),
        ],
    );

    let record = history.find_by_id(id).unwrap().unwrap();
    assert_eq!(record.ids(), vec![id]);
    let doc = serialize(&record).unwrap();
    let reverted = revert_document(&doc, &history, id).unwrap();

    let summary: Vec<(ActionKind, &str, Reason, Option<&str>)> = reverted
        .rpms
        .iter()
        .map(|e| (e.action, e.nevra.as_str(), e.reason, e.repo_id.as_deref()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (ActionKind::ReasonChange, "foo-1.0-1.x86_64", Reason::User, None),
            (ActionKind::Erase, "bar-1.0-1.noarch", Reason::Clean, Some("fedora")),
            (ActionKind::Downgraded, "baz-2.0-1.x86_64", Reason::User, Some("updates")),
            (ActionKind::Downgrade, "baz-1.0-1.x86_64", Reason::User, None),
        ]
    );
}

#[test]
fn test_undo_of_removal_reinstalls_clean_packages_as_dependencies() {
    let (_dir, history) = setup_history();
    let id = store_transaction(
        &history,
        1,
        "1:a",
        "0:b",
        vec![action(ActionKind::Erase, "libold-1-1.x86_64", Reason::Clean, SYSTEM_REPO)],
    );
    let doc = serialize(&history.find_by_id(id).unwrap().unwrap()).unwrap();
    let reverted = revert_document(&doc, &history, id).unwrap();
    assert_eq!(reverted.rpms[0].action, ActionKind::Install);
    assert_eq!(reverted.rpms[0].reason, Reason::Dependency);
}

#[test]
fn test_reinstall_uses_available_builds_only() {
    let packages = FakePackages::with(&[
        ("foo-1.0-1.x86_64", SYSTEM_REPO),
        ("foo-1.0-1.x86_64", "fedora"),
    ]);
    let doc = document(vec![entry(ActionKind::Reinstall, "foo-1.0-1.x86_64", Reason::User, "")]);
    let mut builder = FakeBuilder::new(Reason::User);
    let (_, result) = replay(
        doc.clone(),
        ReplayOptions::default(),
        &packages,
        &mut builder,
        &mut FakeComps::default(),
    );
    let items = result.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].package.repo_id, "fedora");

    // Nothing to reinstall from when only the installed build is known
    let packages = FakePackages::with(&[("foo-1.0-1.x86_64", SYSTEM_REPO)]);
    let (_, result) = replay(
        doc.clone(),
        ReplayOptions::default(),
        &packages,
        &mut FakeBuilder::new(Reason::User),
        &mut FakeComps::default(),
    );
    assert_eq!(
        problem_kinds(&result.unwrap_err()),
        vec![ProblemKind::UnavailablePackage]
    );

    let options = ReplayOptions {
        skip_unavailable: true,
        ..ReplayOptions::default()
    };
    let mut builder = FakeBuilder::new(Reason::User);
    let (replay, result) = replay(doc, options, &packages, &mut builder, &mut FakeComps::default());
    assert!(result.unwrap().is_empty());
    assert_eq!(replay.warnings().len(), 1);
}

#[test]
fn test_skip_unavailable_leaves_replaced_halves_to_the_resolver() {
    let packages = FakePackages::with(&[
        ("foo-1.0-1.x86_64", SYSTEM_REPO),
        ("bar-1.0-1.x86_64", SYSTEM_REPO),
        ("baz-1.0-1.x86_64", SYSTEM_REPO),
    ]);
    let doc = document(vec![
        entry(ActionKind::Upgraded, "foo-1.0-1.x86_64", Reason::User, SYSTEM_REPO),
        entry(ActionKind::Obsoleted, "bar-1.0-1.x86_64", Reason::User, SYSTEM_REPO),
        entry(ActionKind::Erase, "baz-1.0-1.x86_64", Reason::User, SYSTEM_REPO),
    ]);

    let options = ReplayOptions {
        skip_unavailable: true,
        ..ReplayOptions::default()
    };
    let mut builder = FakeBuilder::new(Reason::User);
    let (replayed, result) = replay(doc.clone(), options, &packages, &mut builder, &mut FakeComps::default());
    let items = result.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].action, ActionKind::Erase);
    assert_eq!(items[0].package.nevra.name, "baz");
    assert!(replayed.warnings().is_empty());

    // Without skip_unavailable every replaced half is erased directly
    let mut builder = FakeBuilder::new(Reason::User);
    let (_, result) = replay(
        doc,
        ReplayOptions::default(),
        &packages,
        &mut builder,
        &mut FakeComps::default(),
    );
    let names: Vec<String> = result
        .unwrap()
        .iter()
        .map(|i| i.package.nevra.name.clone())
        .collect();
    assert_eq!(names, vec!["foo", "bar", "baz"]);
}

#[test]
fn test_removal_of_package_that_is_not_installed() {
    let packages = FakePackages::with(&[("foo-1.0-1.x86_64", "fedora")]);
    let doc = document(vec![entry(ActionKind::Erase, "foo-1.0-1.x86_64", Reason::User, SYSTEM_REPO)]);

    let (_, result) = replay(
        doc.clone(),
        ReplayOptions::default(),
        &packages,
        &mut FakeBuilder::new(Reason::User),
        &mut FakeComps::default(),
    );
    let err = result.unwrap_err();
    assert_eq!(problem_kinds(&err), vec![ProblemKind::NotInstalled]);
    assert!(err.to_string().contains("foo-1.0-1.x86_64"));

    let options = ReplayOptions {
        ignore_installed: true,
        ..ReplayOptions::default()
    };
    let mut builder = FakeBuilder::new(Reason::User);
    let (replay, result) = replay(doc, options, &packages, &mut builder, &mut FakeComps::default());
    assert!(result.unwrap().is_empty());
    assert_eq!(replay.warnings().len(), 1);
    assert!(replay.warnings()[0].contains("foo-1.0-1.x86_64"));
}

#[test]
fn test_reason_change_only_sets_reason() {
    let packages = FakePackages::with(&[("foo-1.0-1.x86_64", SYSTEM_REPO)]);
    let doc = document(vec![entry(
        ActionKind::ReasonChange,
        "foo-1.0-1.x86_64",
        Reason::User,
        SYSTEM_REPO,
    )]);

    let mut builder = FakeBuilder::new(Reason::Dependency);
    let (_, result) = replay(
        doc.clone(),
        ReplayOptions::default(),
        &packages,
        &mut builder,
        &mut FakeComps::default(),
    );
    let items = result.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].action, ActionKind::ReasonChange);
    assert_eq!(items[0].reason, Reason::User);

    // A reason change does not account for the package being installed
    let mut builder = FakeBuilder::new(Reason::Dependency);
    builder.extras.push(TransactionItem {
        package: pkg("foo-1.0-1.x86_64", "fedora"),
        action: ActionKind::Reinstall,
        reason: Reason::Dependency,
    });
    let (_, result) = replay(
        doc,
        ReplayOptions::default(),
        &packages,
        &mut builder,
        &mut FakeComps::default(),
    );
    assert_eq!(
        problem_kinds(&result.unwrap_err()),
        vec![ProblemKind::UnexpectedExtra]
    );
}

#[test]
fn test_replaced_extras_are_accepted_with_ignore_installed() {
    let packages = FakePackages::with(&[("foo-2.0-1.x86_64", "fedora")]);
    let doc = document(vec![entry(ActionKind::Upgrade, "foo-2.0-1.x86_64", Reason::User, "fedora")]);
    let with_side_effects = || {
        let mut builder = FakeBuilder::new(Reason::User);
        for (kind, nevra) in [
            (ActionKind::Upgraded, "foo-1.0-1.x86_64"),
            (ActionKind::Downgraded, "bar-2.0-1.x86_64"),
            (ActionKind::Reinstalled, "baz-1.0-1.x86_64"),
        ] {
            builder.extras.push(TransactionItem {
                package: pkg(nevra, SYSTEM_REPO),
                action: kind,
                reason: Reason::User,
            });
        }
        builder
    };

    let options = ReplayOptions {
        ignore_installed: true,
        ..ReplayOptions::default()
    };
    let mut builder = with_side_effects();
    let (replayed, result) = replay(doc.clone(), options, &packages, &mut builder, &mut FakeComps::default());
    assert_eq!(result.unwrap().len(), 4);
    assert!(replayed.warnings().is_empty());

    let mut builder = with_side_effects();
    let (_, result) = replay(
        doc,
        ReplayOptions::default(),
        &packages,
        &mut builder,
        &mut FakeComps::default(),
    );
    assert_eq!(
        problem_kinds(&result.unwrap_err()),
        vec![ProblemKind::UnexpectedExtra; 3]
    );
}

#[test]
fn test_recorded_repo_is_preferred_when_available() {
    let packages = FakePackages::with(&[
        ("foo-1.0-1.x86_64", "fedora"),
        ("foo-1.0-1.x86_64", "updates"),
    ]);

    let doc = document(vec![entry(ActionKind::Install, "foo-1.0-1.x86_64", Reason::User, "updates")]);
    let mut builder = FakeBuilder::new(Reason::User);
    let (_, result) = replay(doc, ReplayOptions::default(), &packages, &mut builder, &mut FakeComps::default());
    assert_eq!(result.unwrap()[0].package.repo_id, "updates");

    // A repo that no longer carries the build does not filter anything out
    let doc = document(vec![entry(ActionKind::Install, "foo-1.0-1.x86_64", Reason::User, "copr")]);
    let mut builder = FakeBuilder::new(Reason::User);
    let (_, result) = replay(doc, ReplayOptions::default(), &packages, &mut builder, &mut FakeComps::default());
    assert_eq!(result.unwrap()[0].package.repo_id, "fedora");
}
