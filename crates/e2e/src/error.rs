//! Error types for the verification harness

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command timed out after {seconds}s: {command}")]
    Timeout { command: String, seconds: u64 },

    #[error("Assertion failed: {0}")]
    Assertion(#[from] AssertionFailure),

    #[error("Fixture not found: {kind} {name}")]
    FixtureNotFound { kind: String, name: String },

    #[error("Fixture error: {0}")]
    Fixture(String),

    #[error("Unsupported architecture: {0}")]
    UnsupportedArch(String),

    #[error("Scenario parse error: {0}")]
    ScenarioParse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;

/// A captured result did not match what the step expected.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{step}: expected {expected}, got {actual}")]
pub struct AssertionFailure {
    pub step: String,
    pub expected: String,
    pub actual: String,
}

impl AssertionFailure {
    pub fn new(
        step: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            step: step.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// A teardown action failed. Recorded, never fatal to the rest of teardown.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("cleanup '{action}' failed: {reason}")]
pub struct CleanupFailure {
    pub action: String,
    pub reason: String,
}
