//! Declarative YAML scenarios

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AssertionFailure, HarnessError, HarnessResult};
use crate::process::RunResult;

static VARIABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("variable pattern is valid")
});

const BUILTIN: &[(&str, &str)] = &[
    ("basic-ops.yaml", include_str!("../scenarios/basic-ops.yaml")),
    ("image-checks.yaml", include_str!("../scenarios/image-checks.yaml")),
    (
        "machine-stop-start.yaml",
        include_str!("../scenarios/machine-stop-start.yaml"),
    ),
];

/// A named, ordered sequence of command steps with expectations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Unique name for this scenario
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Tags for filtering
    #[serde(default)]
    pub tags: Vec<String>,

    /// Variables that must be defined, otherwise the scenario is skipped
    #[serde(default)]
    pub requires: Vec<String>,

    /// Create a machine with `machine init --now` before the steps run;
    /// its name is available as `${machine}`
    #[serde(default)]
    pub machine: bool,

    /// Scenario-local variables
    #[serde(default)]
    pub vars: BTreeMap<String, String>,

    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioStep {
    pub name: String,

    #[serde(default)]
    pub action: StepAction,

    /// Engine arguments for `command` steps; `${var}` is substituted
    #[serde(default)]
    pub args: Vec<String>,

    /// Skip the step unless this variable is defined
    #[serde(default)]
    pub when: Option<String>,

    #[serde(default)]
    pub expect: Expect,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Run `args` against the engine
    #[default]
    Command,
    /// Stop the scenario's machine
    StopMachine,
    /// Start the scenario's machine
    StartMachine,
    /// Remove the scenario's machine through the lifecycle manager
    RemoveMachine,
}

/// What a step's result must look like
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Expect {
    /// Exit code
    #[serde(default)]
    pub exit: i32,

    /// Trimmed stdout must equal this
    #[serde(default)]
    pub output: Option<String>,

    /// Trimmed stdout must contain each of these
    #[serde(default)]
    pub contains: Vec<String>,

    /// Number of non-empty stdout lines
    #[serde(default)]
    pub lines: Option<usize>,

    /// One stdout line must equal this exactly
    #[serde(default)]
    pub has_line: Option<String>,
}

impl Default for Expect {
    fn default() -> Self {
        Self {
            exit: 0,
            output: None,
            contains: Vec::new(),
            lines: None,
            has_line: None,
        }
    }
}

impl Expect {
    /// Check `result` against every expectation, first mismatch wins.
    pub fn check(
        &self,
        step: &str,
        result: &RunResult,
        vars: &Variables,
    ) -> HarnessResult<Result<(), AssertionFailure>> {
        if result.exit_code != self.exit {
            return Ok(Err(AssertionFailure::new(
                step,
                format!("exit code {}", self.exit),
                format!(
                    "exit code {} (stderr: {})",
                    result.exit_code,
                    result.error_to_string()
                ),
            )));
        }

        let output = result.output_to_string();
        if let Some(expected) = &self.output {
            let expected = vars.substitute(expected)?;
            if output != expected {
                return Ok(Err(AssertionFailure::new(
                    step,
                    format!("output {:?}", expected),
                    format!("{:?}", output),
                )));
            }
        }

        for needle in &self.contains {
            let needle = vars.substitute(needle)?;
            if !output.contains(&needle) {
                return Ok(Err(AssertionFailure::new(
                    step,
                    format!("output containing {:?}", needle),
                    format!("{:?}", output),
                )));
            }
        }

        let lines = result.output_lines();
        if let Some(count) = self.lines {
            if lines.len() != count {
                return Ok(Err(AssertionFailure::new(
                    step,
                    format!("{} line(s)", count),
                    format!("{} line(s): {:?}", lines.len(), lines),
                )));
            }
        }

        if let Some(line) = &self.has_line {
            let line = vars.substitute(line)?;
            if !lines.iter().any(|l| *l == line) {
                return Ok(Err(AssertionFailure::new(
                    step,
                    format!("a line equal to {:?}", line),
                    format!("{:?}", lines),
                )));
            }
        }

        Ok(Ok(()))
    }
}

/// Named values substituted into `${name}` placeholders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables(BTreeMap<String, String>);

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Replace every `${name}`. An undefined name is an error, never an
    /// empty string.
    pub fn substitute(&self, input: &str) -> HarnessResult<String> {
        if let Some(missing) = VARIABLE
            .captures_iter(input)
            .map(|c| c[1].to_string())
            .find(|name| !self.is_defined(name))
        {
            return Err(HarnessError::ScenarioParse(format!(
                "undefined variable '{}' in {:?}",
                missing, input
            )));
        }
        Ok(VARIABLE
            .replace_all(input, |c: &regex::Captures<'_>| {
                self.0.get(&c[1]).cloned().unwrap_or_default()
            })
            .into_owned())
    }
}

impl Scenario {
    /// Parse a scenario from YAML string
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| HarnessError::ScenarioParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios from a directory, sorted by name
    pub fn load_all(dir: &Path) -> HarnessResult<Vec<Self>> {
        let mut scenarios = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            scenarios.push(Self::from_file(entry.path())?);
        }

        Ok(scenarios)
    }

    /// The scenarios shipped with the harness
    pub fn builtin() -> HarnessResult<Vec<Self>> {
        BUILTIN
            .iter()
            .map(|(file, yaml)| {
                Self::from_yaml(yaml)
                    .map_err(|e| HarnessError::ScenarioParse(format!("{}: {}", file, e)))
            })
            .collect()
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(scenarios: &'a [Self], tag: &str) -> Vec<&'a Self> {
        scenarios
            .iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }

    fn validate(&self) -> HarnessResult<()> {
        if self.name.trim().is_empty() {
            return Err(HarnessError::ScenarioParse(
                "scenario name must not be empty".to_string(),
            ));
        }
        for step in &self.steps {
            match step.action {
                StepAction::Command if step.args.is_empty() => {
                    return Err(HarnessError::ScenarioParse(format!(
                        "{}: step '{}' has no args",
                        self.name, step.name
                    )));
                }
                StepAction::StopMachine | StepAction::StartMachine | StepAction::RemoveMachine
                    if !self.machine =>
                {
                    return Err(HarnessError::ScenarioParse(format!(
                        "{}: step '{}' needs `machine: true`",
                        self.name, step.name
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}
