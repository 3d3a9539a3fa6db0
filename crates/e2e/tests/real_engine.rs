//! Built-in suite against a real engine and machine provider
//!
//! These boot real VMs and take minutes each. Run with:
//! PODMAN_VERSION=5.4.0 cargo test --package machine-verify-e2e --test real_engine -- --ignored

use machine_verify_e2e::{HarnessConfig, RunnerConfig, SuiteRunner};

fn runner() -> SuiteRunner {
    let harness = HarnessConfig::default()
        .apply_env()
        .expect("valid harness environment");
    SuiteRunner::new(RunnerConfig {
        harness,
        scenarios_dir: None,
        output_dir: std::env::temp_dir().join("machine-verify-results"),
    })
}

#[test]
#[ignore = "boots a real machine"]
fn basic_ops_on_real_engine() {
    let report = runner().run_named("basic-ops").unwrap();
    assert!(report.success, "{:#?}", report);
}

#[test]
#[ignore = "boots a real machine"]
fn image_checks_on_real_engine() {
    let report = runner().run_named("image-checks").unwrap();
    assert!(report.success, "{:#?}", report);
}

#[test]
#[ignore = "boots a real machine"]
fn full_suite_on_real_engine() {
    let runner = runner();
    let report = runner.run_all().unwrap();
    runner.write_results(&report).unwrap();
    assert!(report.all_passed(), "{:#?}", report.results);
}
