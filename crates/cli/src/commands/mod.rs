//! CLI Commands

pub mod config;
pub mod list;
pub mod run;

use std::path::Path;

use anyhow::Context;
use machine_verify_e2e::HarnessConfig;

/// Config file, then environment overrides
pub fn load_config(path: &Path) -> anyhow::Result<HarnessConfig> {
    let config = HarnessConfig::load(path)
        .with_context(|| format!("loading {}", path.display()))?
        .apply_env()
        .context("applying environment overrides")?;
    Ok(config)
}
