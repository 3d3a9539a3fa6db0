//! Harness configuration

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

/// Engine binary override
pub const ENV_BINARY: &str = "MACHINE_VERIFY_BINARY";
/// Disk image passed to `machine init --image`
pub const ENV_MACHINE_IMAGE: &str = "MACHINE_IMAGE_PATH";
/// Per-step timeout in seconds, `0` for unbounded
pub const ENV_TIMEOUT: &str = "MACHINE_VERIFY_TIMEOUT";
/// Engine version installed in the image, set by the packaging pipeline
pub const ENV_PODMAN_VERSION: &str = "PODMAN_VERSION";

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Engine binary (path or name on `PATH`)
    pub binary: PathBuf,

    /// Flags placed before every subcommand
    pub global_args: Vec<String>,

    /// Bound on a single command; `None` or `0` waits forever
    pub step_timeout_secs: Option<u64>,

    /// Image for `machine init --image`
    pub machine_image: Option<String>,

    /// Extra flags for `machine init`
    pub machine_init_args: Vec<String>,

    /// Prefix for generated fixture names
    pub name_prefix: String,

    /// Parent of the per-test working directories (system temp dir if unset)
    pub work_root: Option<PathBuf>,

    /// Container image used by the scenarios
    pub test_image: String,

    /// Engine version expected inside the machine image
    pub podman_version: Option<String>,

    /// Environment overrides for every invocation
    pub env: BTreeMap<String, String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("podman"),
            global_args: Vec::new(),
            step_timeout_secs: Some(900),
            machine_image: None,
            machine_init_args: Vec::new(),
            name_prefix: "verify".to_string(),
            work_root: None,
            test_image: "quay.io/libpod/testimage:20241011".to_string(),
            podman_version: None,
            env: BTreeMap::new(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file; a missing file yields defaults.
    pub fn load(path: &Path) -> HarnessResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Overlay values from the process environment.
    pub fn apply_env(self) -> HarnessResult<Self> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary lookup. Empty values are ignored.
    pub fn apply_env_from<F>(mut self, lookup: F) -> HarnessResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(binary) = get(ENV_BINARY) {
            self.binary = PathBuf::from(binary);
        }
        if let Some(image) = get(ENV_MACHINE_IMAGE) {
            self.machine_image = Some(image);
        }
        if let Some(timeout) = get(ENV_TIMEOUT) {
            let secs = timeout.parse::<u64>().map_err(|_| {
                HarnessError::Config(format!("{} must be a number of seconds, got '{}'", ENV_TIMEOUT, timeout))
            })?;
            self.step_timeout_secs = Some(secs);
        }
        if let Some(version) = get(ENV_PODMAN_VERSION) {
            self.podman_version = Some(version);
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.binary.as_os_str().is_empty() {
            return Err(HarnessError::Config("binary must not be empty".to_string()));
        }
        if self.name_prefix.is_empty()
            || !self
                .name_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(HarnessError::Config(format!(
                "name_prefix must be non-empty and contain only [A-Za-z0-9-], got '{}'",
                self.name_prefix
            )));
        }
        Ok(())
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        match self.step_timeout_secs {
            Some(0) | None => None,
            Some(secs) => Some(Duration::from_secs(secs)),
        }
    }

    pub fn work_root(&self) -> PathBuf {
        self.work_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}
