//! Shared setup for tests that drive the fake engine

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use machine_verify_e2e::HarnessConfig;

pub fn fake_engine() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("fake-engine.sh")
}

/// Harness config running the fake engine through `/bin/sh`, logging every
/// invocation to `<root>/engine.log`.
pub fn fake_config(root: &Path) -> HarnessConfig {
    let mut config = HarnessConfig {
        binary: PathBuf::from("/bin/sh"),
        global_args: vec![fake_engine().display().to_string()],
        work_root: Some(root.to_path_buf()),
        step_timeout_secs: Some(60),
        ..Default::default()
    };
    config.env.insert(
        "FAKE_ENGINE_LOG".to_string(),
        log_path(root).display().to_string(),
    );
    config
}

pub fn log_path(root: &Path) -> PathBuf {
    root.join("engine.log")
}

/// Every engine invocation so far, one line each
pub fn engine_log(root: &Path) -> Vec<String> {
    std::fs::read_to_string(log_path(root))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Per-test working directories still present under `root`
pub fn leftover_work_dirs(root: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(root)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_dir()
                && p.file_name()
                    .map(|n| n.to_string_lossy().starts_with("machine-verify-"))
                    .unwrap_or(false)
        })
        .collect()
}
