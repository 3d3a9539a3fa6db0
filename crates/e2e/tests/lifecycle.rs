//! Fixture lifecycle and teardown against the fake engine

#![cfg(unix)]

mod common;

use machine_verify_e2e::{FixtureKind, FixtureState, HarnessError, TestContext};

#[test]
fn removing_a_machine_twice_reports_not_found() {
    let root = tempfile::tempdir().unwrap();
    let mut ctx = TestContext::new(&common::fake_config(root.path())).unwrap();

    let (name, init) = ctx.init_machine().unwrap();
    assert!(init.success(), "{}", init.error_to_string());

    let first = ctx.remove_machine(&name).unwrap();
    assert!(first.success());

    match ctx.remove_machine(&name) {
        Err(HarnessError::FixtureNotFound { kind, name: missing }) => {
            assert_eq!(kind, "machine");
            assert_eq!(missing, name);
        }
        other => panic!("expected FixtureNotFound, got {:?}", other),
    }

    let report = ctx.run_cleanup();
    assert!(report.is_clean(), "{:?}", report.failures);
}

#[test]
fn state_follows_the_engine() {
    let root = tempfile::tempdir().unwrap();
    let mut ctx = TestContext::new(&common::fake_config(root.path())).unwrap();

    let (name, _) = ctx.init_machine().unwrap();
    assert_eq!(
        ctx.query_state(FixtureKind::Machine, &name).unwrap(),
        FixtureState::Running
    );

    assert!(ctx.stop_machine(&name).unwrap().success());
    assert_eq!(
        ctx.query_state(FixtureKind::Machine, &name).unwrap(),
        FixtureState::Stopped
    );

    assert!(ctx.start_machine(&name).unwrap().success());
    assert_eq!(
        ctx.fixture(FixtureKind::Machine, &name).unwrap().state,
        FixtureState::Running
    );

    ctx.remove_machine(&name).unwrap();
    assert_eq!(
        ctx.query_state(FixtureKind::Machine, &name).unwrap(),
        FixtureState::Absent
    );
    assert_eq!(
        ctx.fixture(FixtureKind::Machine, &name).unwrap().state,
        FixtureState::Removed
    );

    assert!(ctx.run_cleanup().is_clean());
}

#[test]
fn stopping_an_unknown_machine_is_not_found() {
    let root = tempfile::tempdir().unwrap();
    let mut ctx = TestContext::new(&common::fake_config(root.path())).unwrap();

    let err = ctx.stop_machine("verify-00000000").unwrap_err();
    assert!(matches!(err, HarnessError::FixtureNotFound { .. }));
    assert!(ctx.run_cleanup().is_clean());
}

#[test]
fn containers_are_removed_before_the_machine() {
    let root = tempfile::tempdir().unwrap();
    let mut ctx = TestContext::new(&common::fake_config(root.path())).unwrap();

    let (machine, _) = ctx.init_machine().unwrap();
    let (container, run) = ctx
        .run_container(["-d", "quay.io/libpod/testimage:20241011", "top"])
        .unwrap();
    assert!(run.success(), "{}", run.error_to_string());
    assert_eq!(
        ctx.query_state(FixtureKind::Container, &container).unwrap(),
        FixtureState::Running
    );

    let work_dir = ctx.work_dir().to_path_buf();
    let report = ctx.run_cleanup();
    assert!(report.is_clean(), "{:?}", report.failures);
    assert_eq!(
        report.executed,
        vec![
            format!("remove container {}", container),
            format!("remove machine {}", machine),
            "machine reset".to_string(),
            format!("remove dir {}", work_dir.display()),
        ]
    );

    let log = common::engine_log(root.path());
    let tail: Vec<&str> = log.iter().rev().take(3).rev().map(String::as_str).collect();
    assert_eq!(
        tail,
        vec![
            format!("rm -f {}", container).as_str(),
            format!("machine rm -f {}", machine).as_str(),
            "machine reset -f",
        ]
    );
}

#[test]
fn failed_teardown_is_reported_and_directories_still_go() {
    let root = tempfile::tempdir().unwrap();
    let mut config = common::fake_config(root.path());
    config
        .env
        .insert("FAKE_ENGINE_FAIL".to_string(), "machine rm".to_string());
    let mut ctx = TestContext::new(&config).unwrap();

    let (name, _) = ctx.init_machine().unwrap();
    let work_dir = ctx.work_dir().to_path_buf();

    let report = ctx.run_cleanup();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].action, format!("remove machine {}", name));
    assert!(report.failures[0].reason.contains("injected failure"));
    // Reset and directory removal still ran
    assert_eq!(report.executed.len(), 3);
    assert!(!work_dir.exists());
}

#[test]
fn missing_provider_binary_is_not_mistaken_for_a_removed_machine() {
    let root = tempfile::tempdir().unwrap();
    let mut config = common::fake_config(root.path());
    config
        .env
        .insert("FAKE_ENGINE_FAIL".to_string(), "machine rm".to_string());
    config.env.insert(
        "FAKE_ENGINE_FAIL_MESSAGE".to_string(),
        r#"Error: exec: "vfkit": executable file not found in $PATH"#.to_string(),
    );
    let mut ctx = TestContext::new(&config).unwrap();

    let (name, _) = ctx.init_machine().unwrap();
    match ctx.remove_machine(&name) {
        Ok(result) => assert_eq!(result.exit_code, 125),
        Err(e) => panic!("expected a failed removal result, got {:?}", e),
    }
    assert_eq!(
        ctx.fixture(FixtureKind::Machine, &name).unwrap().state,
        FixtureState::Running
    );

    let report = ctx.run_cleanup();
    assert!(!report.is_clean());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].action, format!("remove machine {}", name));
    assert!(report.failures[0].reason.contains("executable file not found"));
}

#[test]
fn concurrent_contexts_do_not_share_machines() {
    let root = tempfile::tempdir().unwrap();
    let config = common::fake_config(root.path());

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let config = config.clone();
            std::thread::spawn(move || {
                let mut ctx = TestContext::new(&config).unwrap();
                let (name, init) = ctx.init_machine().unwrap();
                assert!(init.success());
                let listed = ctx.run(["machine", "inspect", "--format", "{{.State}}", name.as_str()]).unwrap();
                assert_eq!(listed.output_to_string(), "running");
                (ctx, name)
            })
        })
        .collect();

    let mut contexts: Vec<(TestContext, String)> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_ne!(contexts[0].1, contexts[1].1);
    assert_ne!(contexts[0].0.home_dir(), contexts[1].0.home_dir());

    // Each home only knows its own machine
    let other = contexts[1].1.clone();
    let (ctx, _) = &mut contexts[0];
    assert_eq!(
        ctx.query_state(FixtureKind::Machine, &other).unwrap(),
        FixtureState::Absent
    );

    for (mut ctx, _) in contexts {
        assert!(ctx.run_cleanup().is_clean());
    }
    assert!(common::leftover_work_dirs(root.path()).is_empty());
}
